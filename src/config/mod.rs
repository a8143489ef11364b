//! Typed configuration.
//!
//! Process-level settings (telemetry, log level) come from plain environment
//! variables via [`Config::from_env`]. Everything a source, the controller or
//! the executor needs goes through [`Settings`], which layers
//! `WORKPULL_*` environment variables over command-line flags.

pub mod settings;

pub use settings::{ENV_PREFIX, Settings, parse_pair};

use crate::error::Result;

#[derive(Debug)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
