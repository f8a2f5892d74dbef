use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use shared_config::AppConfig;
use shared_database::InMemoryRepository;
use shared_models::{
    Appointment, AppointmentStatus, DoctorSchedule, Patient, Reminder, ReminderChannel,
    ReminderStatus, Specialty, User, UserRole, Weekday,
};

use crate::time::{parse_appointment_time, FixedClock};

pub struct TestConfig {
    pub clinic_name: String,
    pub reminder_lead_hours: i64,
    pub reminder_channels: Vec<String>,
    pub reminder_retry_backoff_minutes: i64,
    pub notifier_timeout_seconds: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            clinic_name: "Test Clinic".to_string(),
            reminder_lead_hours: 24,
            reminder_channels: vec!["EMAIL".to_string(), "SMS".to_string()],
            reminder_retry_backoff_minutes: 15,
            notifier_timeout_seconds: 1,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            clinic_name: self.clinic_name.clone(),
            reminder_lead_hours: self.reminder_lead_hours,
            reminder_channels: self.reminder_channels.clone(),
            reminder_retry_backoff_minutes: self.reminder_retry_backoff_minutes,
            notifier_timeout_seconds: self.notifier_timeout_seconds,
            ..AppConfig::default()
        }
    }
}

/// Parses a `yyyy-MM-dd HH:mm` literal.
pub fn at(raw: &str) -> NaiveDateTime {
    parse_appointment_time(raw).expect("test timestamp must parse")
}

/// The clock used by seeded tests; every 2099 slot is in its future.
pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(at("2030-01-01 08:00")))
}

pub struct TestUser;

impl TestUser {
    pub fn new(id: i64, role: UserRole, is_active: bool) -> User {
        User {
            id,
            first_name: format!("{}", role).to_lowercase(),
            last_name: format!("#{}", id),
            email: Some(format!("user{}@clinic.test", id)),
            phone: Some(format!("+51 900 000 {:03}", id)),
            role,
            is_active,
        }
    }

    pub fn doctor(id: i64, first_name: &str, last_name: &str) -> User {
        User {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Self::new(id, UserRole::Doctor, true)
        }
    }

    pub fn receptionist(id: i64) -> User {
        Self::new(id, UserRole::Receptionist, true)
    }
}

pub fn test_patient(id: i64, email: Option<&str>, phone: Option<&str>) -> Patient {
    Patient {
        id,
        first_name: "Ana".to_string(),
        last_name: "Quispe".to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        is_active: true,
    }
}

pub fn test_schedule(id: i64, doctor_id: i64, day: Weekday, start: &str, end: &str) -> DoctorSchedule {
    DoctorSchedule {
        id,
        doctor_id,
        day_of_week: day,
        start_time: NaiveTime::parse_from_str(start, "%H:%M").expect("schedule start"),
        end_time: NaiveTime::parse_from_str(end, "%H:%M").expect("schedule end"),
        is_active: true,
    }
}

pub fn test_appointment(id: i64, doctor_id: i64, scheduled_at: NaiveDateTime, status: AppointmentStatus) -> Appointment {
    let created_at = NaiveDate::from_ymd_opt(2030, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("fixture date");
    Appointment {
        id,
        patient_id: TestClinic::PATIENT_ID,
        doctor_id,
        scheduled_at,
        duration_minutes: 30,
        status,
        reason: Some("Control".to_string()),
        notes: None,
        created_by: TestClinic::RECEPTIONIST_ID,
        cancelled_by: None,
        cancellation_reason: None,
        cancelled_at: None,
        rescheduled_from: None,
        rescheduled_by: None,
        reschedule_reason: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn test_reminder(
    id: i64,
    appointment_id: i64,
    channel: ReminderChannel,
    status: ReminderStatus,
    attempt_count: i32,
    scheduled_send_at: NaiveDateTime,
) -> Reminder {
    Reminder {
        id,
        appointment_id,
        channel,
        message: "Appointment reminder".to_string(),
        scheduled_send_at,
        status,
        attempt_count,
        last_error: None,
        sent_at: None,
        next_attempt_at: None,
        created_at: scheduled_send_at,
        version: 0,
    }
}

/// A small clinic seeded into an [`InMemoryRepository`].
///
/// Doctor 2 works Monday and Tuesday 08:00-18:00 with a 30 minute specialty,
/// doctor 3 works Tuesday 09:00-13:00 without a specialty row.
pub struct TestClinic {
    pub repository: Arc<InMemoryRepository>,
}

impl TestClinic {
    pub const PATIENT_ID: i64 = 1;
    pub const DOCTOR_ID: i64 = 2;
    pub const SECOND_DOCTOR_ID: i64 = 3;
    pub const INACTIVE_DOCTOR_ID: i64 = 4;
    pub const RECEPTIONIST_ID: i64 = 10;
    pub const INACTIVE_RECEPTIONIST_ID: i64 = 11;
    pub const PATIENT_USER_ID: i64 = 12;
    pub const INACTIVE_PATIENT_ID: i64 = 20;
    pub const NO_EMAIL_PATIENT_ID: i64 = 21;

    pub async fn seed() -> Self {
        let repository = Arc::new(InMemoryRepository::new());

        repository
            .upsert_patient(test_patient(
                Self::PATIENT_ID,
                Some("ana.quispe@mail.test"),
                Some("+51 987 654 321"),
            ))
            .await;
        repository
            .upsert_patient(Patient {
                is_active: false,
                ..test_patient(Self::INACTIVE_PATIENT_ID, Some("old@mail.test"), None)
            })
            .await;
        repository
            .upsert_patient(test_patient(Self::NO_EMAIL_PATIENT_ID, Some(""), None))
            .await;

        repository
            .upsert_user(TestUser::doctor(Self::DOCTOR_ID, "Luis", "Ramos"))
            .await;
        repository
            .upsert_user(TestUser::doctor(Self::SECOND_DOCTOR_ID, "Carla", "Vega"))
            .await;
        repository
            .upsert_user(User {
                is_active: false,
                ..TestUser::doctor(Self::INACTIVE_DOCTOR_ID, "Jorge", "Salas")
            })
            .await;
        repository
            .upsert_user(TestUser::receptionist(Self::RECEPTIONIST_ID))
            .await;
        repository
            .upsert_user(TestUser::new(Self::INACTIVE_RECEPTIONIST_ID, UserRole::Receptionist, false))
            .await;
        repository
            .upsert_user(TestUser::new(Self::PATIENT_USER_ID, UserRole::Patient, true))
            .await;

        repository
            .upsert_specialty(Specialty {
                doctor_id: Self::DOCTOR_ID,
                name: "Cardiology".to_string(),
                consultation_minutes: 30,
            })
            .await;

        repository
            .add_schedule(test_schedule(1, Self::DOCTOR_ID, Weekday::Monday, "08:00", "18:00"))
            .await;
        repository
            .add_schedule(test_schedule(2, Self::DOCTOR_ID, Weekday::Tuesday, "08:00", "18:00"))
            .await;
        repository
            .add_schedule(test_schedule(3, Self::SECOND_DOCTOR_ID, Weekday::Tuesday, "09:00", "13:00"))
            .await;
        repository
            .add_schedule(DoctorSchedule {
                is_active: false,
                ..test_schedule(4, Self::SECOND_DOCTOR_ID, Weekday::Wednesday, "09:00", "13:00")
            })
            .await;

        Self { repository }
    }
}
