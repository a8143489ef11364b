//! Two-layer settings: environment over flags.
//!
//! A setting is addressed by a kebab-case key such as `database-url`. Its
//! environment variable is `WORKPULL_DATABASE_URL`. A set, non-empty variable
//! wins; otherwise the flag value (`-o database-url=...`) is used.

use crate::error::{Error, Result};
use crate::template::{Template, stringify};
use secrecy::SecretString;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Prefix of every environment variable read through [`Settings`].
pub const ENV_PREFIX: &str = "WORKPULL_";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    env: HashMap<String, String>,
    flags: HashMap<String, String>,
}

impl Settings {
    /// Build from an explicit environment snapshot and flag pairs.
    pub fn new(
        env: impl IntoIterator<Item = (String, String)>,
        flags: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            env: env
                .into_iter()
                .filter(|(name, _)| name.starts_with(ENV_PREFIX))
                .collect(),
            flags: flags
                .into_iter()
                .map(|(key, value)| (normalize_key(&key), value))
                .collect(),
        }
    }

    /// Build from the current process environment.
    pub fn from_process_env(flags: impl IntoIterator<Item = (String, String)>) -> Self {
        Self::new(std::env::vars(), flags)
    }

    /// Environment variable consulted for `key`.
    pub fn env_var_name(key: &str) -> String {
        format!("{ENV_PREFIX}{}", normalize_key(key).replace('-', "_").to_uppercase())
    }

    /// Resolved value: environment first, then flags.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env
            .get(&Self::env_var_name(key))
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.flags.get(&normalize_key(key)))
            .map(String::as_str)
    }

    pub fn required(&self, key: &str) -> Result<String> {
        self.get(key).map(str::to_string).ok_or_else(|| {
            Error::Config(format!(
                "{key} is required (flag -o {key}=... or {})",
                Self::env_var_name(key)
            ))
        })
    }

    pub fn secret(&self, key: &str) -> Result<SecretString> {
        self.required(key).map(SecretString::from)
    }

    /// Parse `key` with `FromStr`, or return `default` when unset.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid value for {key} ({raw:?}): {e}"))),
            None => Ok(default),
        }
    }

    /// Boolean switch. Accepts true/false, 1/0, yes/no, on/off.
    pub fn switch(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::Config(format!("invalid value for {key} ({v:?}): expected a boolean"))),
            },
        }
    }

    /// A list setting, written either as a JSON array or comma-separated.
    /// Unset means empty.
    pub fn list(&self, key: &str) -> Result<Vec<String>> {
        let Some(raw) = self.get(key).map(str::trim) else {
            return Ok(Vec::new());
        };
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        if raw.starts_with('[') {
            let values: Vec<serde_json::Value> = serde_json::from_str(raw)
                .map_err(|e| Error::Config(format!("invalid JSON list for {key}: {e}")))?;
            return Ok(values.iter().map(stringify).collect());
        }
        Ok(raw.split(',').map(|s| s.trim().to_string()).collect())
    }

    /// A template from a text key and an optional parameter-list key.
    pub fn template(&self, text_key: &str, params_key: &str) -> Result<Option<Template>> {
        match self.get(text_key) {
            Some(text) if !text.trim().is_empty() => Ok(Some(
                Template::new(text).with_params(self.list(params_key)?),
            )),
            _ => Ok(None),
        }
    }
}

/// Parse a `key=value` pair. Used for `-o` and `--env` flags.
pub fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('_', "-")
}
