//! Server configuration read from the environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use ponder_core::window::{Granularity, WindowClock};
use ponder_generation::openai::OpenAiConfig;
use ponder_rotation::application::coordinator::CoordinatorConfig;

use crate::error::AppError;

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Window arithmetic in the reference zone.
    pub window_clock: WindowClock,
    /// Whether a next item is staged ahead of each boundary.
    pub stage_next: bool,
    /// Timeout for every store and generator call.
    pub call_timeout: Duration,
    /// How long a completed coordinator operation stays joinable.
    pub grace: Duration,
    /// How close to the boundary pre-generation starts.
    pub pregenerate_lead: TimeDelta,
    /// Maximum pooled database connections.
    pub db_max_connections: u32,
    /// Text-completion endpoint settings.
    pub openai: OpenAiConfig,
    /// OTLP collector endpoint; spans are only exported when set.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::Config("DATABASE_URL environment variable must be set".into()))?;

        let zone = lookup("PONDER_TIMEZONE").unwrap_or_else(|| "UTC".to_string());
        let granularity: Granularity = parsed(&lookup, "PONDER_GRANULARITY", Granularity::Day)?;
        let window_clock = WindowClock::from_zone_name(&zone, granularity)
            .map_err(|e| AppError::Config(format!("PONDER_TIMEZONE: {e}")))?;

        let call_timeout = Duration::from_secs(parsed(
            &lookup,
            "PONDER_CALL_TIMEOUT_SECS",
            CoordinatorConfig::DEFAULT_CALL_TIMEOUT.as_secs(),
        )?);
        let grace_ms = u64::try_from(CoordinatorConfig::DEFAULT_GRACE.as_millis()).unwrap_or(250);
        let grace = Duration::from_millis(parsed(&lookup, "PONDER_GRACE_MS", grace_ms)?);
        let lead_minutes: i64 = parsed(
            &lookup,
            "PONDER_PREGENERATE_LEAD_MINUTES",
            CoordinatorConfig::DEFAULT_PREGENERATE_LEAD_MINUTES,
        )?;
        if lead_minutes < 0 {
            return Err(AppError::Config(
                "PONDER_PREGENERATE_LEAD_MINUTES must not be negative".into(),
            ));
        }

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 3000)?,
            window_clock,
            stage_next: flag(&lookup, "PONDER_STAGE_NEXT", true)?,
            call_timeout,
            grace,
            pregenerate_lead: TimeDelta::minutes(lead_minutes),
            db_max_connections: parsed(&lookup, "PONDER_DB_MAX_CONNECTIONS", 10)?,
            openai: OpenAiConfig::from_lookup(&lookup).with_timeout(call_timeout),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|e| !e.trim().is_empty()),
        })
    }

    /// The coordinator settings implied by this configuration.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(self.window_clock)
            .with_stage_next(self.stage_next)
            .with_call_timeout(self.call_timeout)
            .with_grace(self.grace)
            .with_pregenerate_lead(self.pregenerate_lead)
    }
}

fn parsed<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn flag(lookup: impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, AppError> {
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!("{key} must be true or false, got '{raw}'"))),
        },
    }
}
