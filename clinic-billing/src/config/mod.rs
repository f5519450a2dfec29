//! Configuration module for clinic-billing.

use crate::models::BillingMode;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClinicBillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub clinic_api: ClinicApiConfig,
    /// Mode of sessions opened without an explicit one.
    pub default_mode: BillingMode,
    /// Sessions unused for this long are closed.
    pub session_idle: Duration,
}

#[derive(Debug, Clone)]
pub struct ClinicApiConfig {
    pub url: String,
    pub token: Option<Secret<String>>,
    pub timeout_secs: u64,
}

impl ClinicBillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let timeout_secs = seconds_from_env("CLINIC_API_TIMEOUT_SECS", 10)?;
        let session_idle_secs = seconds_from_env("SESSION_IDLE_TIMEOUT_SECS", 1800)?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "clinic-billing".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            clinic_api: ClinicApiConfig {
                url: env::var("CLINIC_API_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("CLINIC_API_URL is required"))
                })?,
                token: env::var("CLINIC_API_TOKEN")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
                timeout_secs,
            },
            default_mode: env::var("DEFAULT_BILLING_MODE")
                .map(|s| BillingMode::from_string(&s))
                .unwrap_or_default(),
            session_idle: Duration::from_secs(session_idle_secs),
        })
    }
}

fn seconds_from_env(name: &str, default: u64) -> Result<u64, AppError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!(
                "{} must be a whole number of seconds",
                name
            ))
        }),
        Err(_) => Ok(default),
    }
}
