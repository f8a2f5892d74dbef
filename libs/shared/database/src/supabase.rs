use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::{
    Appointment, Cancellation, DoctorSchedule, NewAppointment, NewReminder, Patient, Reminder,
    Reschedule, Specialty, User, Weekday, MAX_DELIVERY_ATTEMPTS,
};

use crate::repository::{Repository, RepositoryError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Non-success answer from the REST API, kept typed inside the `anyhow` chain.
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {body}")]
pub struct ApiStatusError {
    pub status: StatusCode,
    pub body: String,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, prefer: Option<&'static str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.anon_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer));
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let prefer = if method == Method::PATCH || method == Method::POST {
            Some("return=representation")
        } else {
            None
        };

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.get_headers(prefer)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(anyhow!(ApiStatusError {
                status,
                body: error_text,
            }));
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }
}

/// Repository backed by PostgREST.
///
/// Multi-row writes go through the `book_appointment`, `cancel_appointment` and
/// `reschedule_appointment` database functions, which run in one transaction and
/// answer 409 when a slot or status guard fails. The cancel and reschedule
/// functions bump `version` on every reminder row they change.
pub struct SupabaseRepository {
    client: SupabaseClient,
}

impl SupabaseRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: SupabaseClient::new(config),
        }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, RepositoryError> {
        self.client
            .request::<Vec<T>>(Method::GET, path, None)
            .await
            .map_err(|e| map_error(e, path))
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, RepositoryError> {
        Ok(self.select::<T>(path).await?.into_iter().next())
    }

    async fn rpc<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<T, RepositoryError> {
        let path = format!("/rest/v1/rpc/{}", function);
        self.client
            .request::<T>(Method::POST, &path, Some(args))
            .await
            .map_err(|e| map_error(e, &path))
    }
}

fn ts(when: NaiveDateTime) -> String {
    when.format(TIMESTAMP_FORMAT).to_string()
}

fn map_error(err: anyhow::Error, context: &str) -> RepositoryError {
    match err.downcast_ref::<ApiStatusError>() {
        Some(api) if api.status == StatusCode::NOT_FOUND => {
            RepositoryError::NotFound(format!("{}: {}", context, api.body))
        }
        Some(api) if api.status == StatusCode::CONFLICT => {
            RepositoryError::Conflict(format!("{}: {}", context, api.body))
        }
        Some(api) if api.status == StatusCode::PRECONDITION_FAILED => {
            RepositoryError::StaleWrite(format!("{}: {}", context, api.body))
        }
        _ => RepositoryError::Backend(format!("{}: {}", context, err)),
    }
}

#[async_trait]
impl Repository for SupabaseRepository {
    async fn find_appointment(&self, id: i64) -> Result<Option<Appointment>, RepositoryError> {
        self.select_one(&format!("/rest/v1/appointments?id=eq.{}&limit=1", id))
            .await
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        reminders: Vec<NewReminder>,
    ) -> Result<Appointment, RepositoryError> {
        self.rpc(
            "book_appointment",
            json!({
                "appointment": appointment,
                "reminders": reminders,
            }),
        )
        .await
    }

    async fn cancel_appointment(
        &self,
        id: i64,
        cancellation: Cancellation,
    ) -> Result<Appointment, RepositoryError> {
        self.rpc(
            "cancel_appointment",
            json!({
                "appointment_id": id,
                "cancellation": cancellation,
            }),
        )
        .await
    }

    async fn reschedule_appointment(
        &self,
        id: i64,
        change: Reschedule,
        reminders: Vec<NewReminder>,
    ) -> Result<Appointment, RepositoryError> {
        self.rpc(
            "reschedule_appointment",
            json!({
                "appointment_id": id,
                "change": change,
                "reminders": reminders,
            }),
        )
        .await
    }

    async fn find_doctor_schedule(
        &self,
        doctor_id: i64,
        day: Weekday,
    ) -> Result<Vec<DoctorSchedule>, RepositoryError> {
        self.select(&format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id,
            day.code()
        ))
        .await
    }

    async fn count_conflicts(
        &self,
        doctor_id: i64,
        when: NaiveDateTime,
        exclude_appointment_id: Option<i64>,
    ) -> Result<u64, RepositoryError> {
        let mut path = format!(
            "/rest/v1/appointments?select=id&doctor_id=eq.{}&scheduled_at=eq.{}&status=in.(SCHEDULED,CONFIRMED)",
            doctor_id,
            ts(when)
        );
        if let Some(exclude) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude));
        }

        let rows: Vec<Value> = self.select(&path).await?;
        Ok(rows.len() as u64)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        self.select_one(&format!("/rest/v1/users?id=eq.{}&limit=1", id))
            .await
    }

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, RepositoryError> {
        self.select_one(&format!("/rest/v1/patients?id=eq.{}&limit=1", id))
            .await
    }

    async fn find_specialty(&self, doctor_id: i64) -> Result<Option<Specialty>, RepositoryError> {
        self.select_one(&format!(
            "/rest/v1/doctor_specialties?doctor_id=eq.{}&limit=1",
            doctor_id
        ))
        .await
    }

    async fn find_reminder(&self, id: i64) -> Result<Option<Reminder>, RepositoryError> {
        self.select_one(&format!("/rest/v1/reminders?id=eq.{}&limit=1", id))
            .await
    }

    async fn list_reminders_for_appointment(
        &self,
        appointment_id: i64,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        self.select(&format!(
            "/rest/v1/reminders?appointment_id=eq.{}&order=id.asc",
            appointment_id
        ))
        .await
    }

    async fn list_pending_due_reminders(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        self.select(&format!(
            "/rest/v1/reminders?select=*,appointments!inner(status)&status=eq.PENDING&scheduled_send_at=lte.{}&appointments.status=in.(SCHEDULED,CONFIRMED)&order=scheduled_send_at.asc,id.asc",
            ts(now)
        ))
        .await
    }

    async fn list_retryable_reminders(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, RepositoryError> {
        self.select(&format!(
            "/rest/v1/reminders?select=*,appointments!inner(status)&status=eq.FAILED&attempt_count=lt.{}&next_attempt_at=lte.{}&appointments.status=in.(SCHEDULED,CONFIRMED)&order=next_attempt_at.asc,id.asc",
            MAX_DELIVERY_ATTEMPTS,
            ts(now)
        ))
        .await
    }

    async fn update_reminder(
        &self,
        outcome: &Reminder,
        expected_version: i32,
    ) -> Result<Reminder, RepositoryError> {
        let path = format!(
            "/rest/v1/reminders?id=eq.{}&version=eq.{}",
            outcome.id, expected_version
        );

        let body = json!({
            "status": outcome.status,
            "attempt_count": outcome.attempt_count,
            "last_error": outcome.last_error,
            "sent_at": outcome.sent_at,
            "next_attempt_at": outcome.next_attempt_at,
            "version": expected_version + 1,
        });

        let updated: Vec<Reminder> = self
            .client
            .request(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| map_error(e, &path))?;

        updated.into_iter().next().ok_or_else(|| {
            RepositoryError::StaleWrite(format!(
                "reminder {} is no longer at version {}",
                outcome.id, expected_version
            ))
        })
    }
}
