use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// USERS AND PATIENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Patient,
    Doctor,
    Receptionist,
    Admin,
}

impl UserRole {
    /// Roles allowed to create appointments on behalf of a patient.
    pub fn can_book(&self) -> bool {
        matches!(self, UserRole::Receptionist | UserRole::Doctor)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Patient => write!(f, "PATIENT"),
            UserRole::Doctor => write!(f, "DOCTOR"),
            UserRole::Receptionist => write!(f, "RECEPTIONIST"),
            UserRole::Admin => write!(f, "ADMIN"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active_doctor(&self) -> bool {
        self.is_active && self.role == UserRole::Doctor
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Specialty configuration of a doctor, used for the default consultation length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialty {
    pub doctor_id: i64,
    pub name: String,
    pub consultation_minutes: i32,
}

// ==============================================================================
// WEEKLY SCHEDULES
// ==============================================================================

/// Day of week as stored in doctor schedules.
///
/// The serialized form is the clinic's canonical day code, so the mapping never
/// depends on a runtime or database locale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Weekday {
    #[serde(rename = "LUNES")]
    Monday,
    #[serde(rename = "MARTES")]
    Tuesday,
    #[serde(rename = "MIERCOLES")]
    Wednesday,
    #[serde(rename = "JUEVES")]
    Thursday,
    #[serde(rename = "VIERNES")]
    Friday,
    #[serde(rename = "SABADO")]
    Saturday,
    #[serde(rename = "DOMINGO")]
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Weekday::Monday => "LUNES",
            Weekday::Tuesday => "MARTES",
            Weekday::Wednesday => "MIERCOLES",
            Weekday::Thursday => "JUEVES",
            Weekday::Friday => "VIERNES",
            Weekday::Saturday => "SABADO",
            Weekday::Sunday => "DOMINGO",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|day| day.code().eq_ignore_ascii_case(code))
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub id: i64,
    pub doctor_id: i64,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

impl DoctorSchedule {
    /// Half-open `[start_time, end_time)` membership, inactive rows never match.
    pub fn covers(&self, time: NaiveTime) -> bool {
        self.is_active && self.start_time <= time && time < self.end_time
    }
}
