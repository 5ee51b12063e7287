//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use chrono::NaiveTime;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): SQLite connection string, defaults to `sqlite://database.db`
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8000
/// - `UPLOAD_DIR` / `OUTPUT_DIR` (optional): scratch directories for conversions
/// - `FFMPEG_PATH` (optional): transcoder executable, defaults to `ffmpeg`
/// - `MAX_UPLOAD_BYTES` (optional): request body limit for `/convert`, defaults to 100 MiB
/// - `USAGE_RETENTION_DAYS` (optional): days of usage rows kept, defaults to 7
/// - `SWEEP_HOUR` / `SWEEP_MINUTE` (optional): local time of the daily purge, defaults to 02:00
/// - `UNIFY_AUTH_ERRORS` (optional): report revoked keys as invalid keys
/// - `BOOTSTRAP_ADMIN_KEY` (optional): raw key provisioned with `convert,admin` at startup
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_retention_days")]
    pub usage_retention_days: u32,

    #[serde(default = "default_sweep_hour")]
    pub sweep_hour: u32,

    #[serde(default)]
    pub sweep_minute: u32,

    #[serde(default)]
    pub unify_auth_errors: bool,

    #[serde(default)]
    pub bootstrap_admin_key: Option<String>,
}

fn default_database_url() -> String {
    "sqlite://database.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8000
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_output_dir() -> String {
    "converted".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_retention_days() -> u32 {
    7
}

fn default_sweep_hour() -> u32 {
    2
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variable values cannot be parsed into expected types.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Local time of day at which the retention sweep fires.
    ///
    /// Out-of-range hour/minute values fall back to 02:00.
    pub fn sweep_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.sweep_hour, self.sweep_minute, 0)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            server_port: default_port(),
            upload_dir: std::env::temp_dir().join("mcg-uploads").display().to_string(),
            output_dir: std::env::temp_dir().join("mcg-converted").display().to_string(),
            ffmpeg_path: default_ffmpeg_path(),
            max_upload_bytes: default_max_upload_bytes(),
            usage_retention_days: default_retention_days(),
            sweep_hour: default_sweep_hour(),
            sweep_minute: 0,
            unify_auth_errors: false,
            bootstrap_admin_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_time_uses_configured_hour_and_minute() {
        let config = Config {
            sweep_hour: 3,
            sweep_minute: 30,
            ..Config::default()
        };
        assert_eq!(config.sweep_time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
    }

    #[test]
    fn sweep_time_falls_back_on_invalid_values() {
        let config = Config {
            sweep_hour: 25,
            ..Config::default()
        };
        assert_eq!(config.sweep_time(), NaiveTime::from_hms_opt(2, 0, 0).unwrap());
    }
}
