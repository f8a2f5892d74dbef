use std::env;
use std::str::FromStr;
use tracing::warn;

/// Longest accepted reminder lead time (one year).
pub const MAX_REMINDER_LEAD_HOURS: i64 = 24 * 366;
/// Longest accepted base retry backoff (one week).
pub const MAX_RETRY_BACKOFF_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub server_port: u16,
    pub clinic_name: String,
    pub clinic_open_hour: u32,
    pub clinic_close_hour: u32,
    pub default_appointment_minutes: i32,
    pub reminder_lead_hours: i64,
    /// Channel codes, e.g. `EMAIL`, `SMS`. Parsed by the reminder cell.
    pub reminder_channels: Vec<String>,
    pub reminder_retry_backoff_minutes: i64,
    pub reminder_scan_interval_seconds: u64,
    pub reminder_max_concurrent: usize,
    pub notifier_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            server_port: 3000,
            clinic_name: "Salud y Vida Clinic".to_string(),
            clinic_open_hour: 7,
            clinic_close_hour: 19,
            default_appointment_minutes: 30,
            reminder_lead_hours: 24,
            reminder_channels: vec!["EMAIL".to_string(), "SMS".to_string()],
            reminder_retry_backoff_minutes: 15,
            reminder_scan_interval_seconds: 60,
            reminder_max_concurrent: 4,
            notifier_timeout_seconds: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using in-memory repository");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            server_port: parsed_var("SERVER_PORT", defaults.server_port),
            clinic_name: env::var("CLINIC_NAME").unwrap_or(defaults.clinic_name),
            clinic_open_hour: parsed_var("CLINIC_OPEN_HOUR", defaults.clinic_open_hour),
            clinic_close_hour: parsed_var("CLINIC_CLOSE_HOUR", defaults.clinic_close_hour),
            default_appointment_minutes: parsed_var(
                "DEFAULT_APPOINTMENT_MINUTES",
                defaults.default_appointment_minutes,
            ),
            reminder_lead_hours: bounded(
                "REMINDER_LEAD_HOURS",
                parsed_var("REMINDER_LEAD_HOURS", defaults.reminder_lead_hours),
                0,
                MAX_REMINDER_LEAD_HOURS,
            ),
            reminder_channels: env::var("REMINDER_CHANNELS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.reminder_channels),
            reminder_retry_backoff_minutes: bounded(
                "REMINDER_RETRY_BACKOFF_MINUTES",
                parsed_var(
                    "REMINDER_RETRY_BACKOFF_MINUTES",
                    defaults.reminder_retry_backoff_minutes,
                ),
                0,
                MAX_RETRY_BACKOFF_MINUTES,
            ),
            reminder_scan_interval_seconds: parsed_var(
                "REMINDER_SCAN_INTERVAL_SECONDS",
                defaults.reminder_scan_interval_seconds,
            ),
            reminder_max_concurrent: parsed_var(
                "REMINDER_MAX_CONCURRENT",
                defaults.reminder_max_concurrent,
            ),
            notifier_timeout_seconds: parsed_var(
                "NOTIFIER_TIMEOUT_SECONDS",
                defaults.notifier_timeout_seconds,
            ),
        };

        if config.clinic_open_hour >= config.clinic_close_hour {
            warn!(
                "Clinic window {}:00-{}:00 is empty, no appointment can be booked",
                config.clinic_open_hour, config.clinic_close_hour
            );
        }

        config
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn bounded(name: &str, value: i64, min: i64, max: i64) -> i64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!("{} = {} is out of range, using {}", name, value, clamped);
    }
    clamped
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_uppercase())
        .filter(|item| !item.is_empty())
        .collect()
}
