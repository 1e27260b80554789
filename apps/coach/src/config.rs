use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const MAX_QUESTION_SERVICE_RETRIES: u32 = 10;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub question_service_url: String,
    pub question_service_timeout: Duration,
    pub question_service_max_retries: u32,
    /// Profiles go to Redis when set, to JSON files under `profile_dir` otherwise.
    pub redis_url: Option<String>,
    pub profile_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            question_service_url: require_env("QUESTION_SERVICE_URL")?,
            question_service_timeout: Duration::from_secs(parse_env(
                "QUESTION_SERVICE_TIMEOUT_SECS",
                15,
            )?),
            question_service_max_retries: parse_retries(parse_env(
                "QUESTION_SERVICE_MAX_RETRIES",
                2,
            )?)?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            profile_dir: std::env::var("PROFILE_DIR")
                .unwrap_or_else(|_| "data/profiles".to_string())
                .into(),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_retries(retries: u32) -> Result<u32> {
    if retries > MAX_QUESTION_SERVICE_RETRIES {
        bail!("QUESTION_SERVICE_MAX_RETRIES must be at most {MAX_QUESTION_SERVICE_RETRIES}, got {retries}");
    }
    Ok(retries)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
