use std::time::Duration;

use anyhow::{Context, Result};

use crate::gemini::DEMO_KEY;
use crate::stages::DEFAULT_STAGE_TIMEOUT;

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    /// Upper bound for every individual model call.
    pub stage_timeout: Duration,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: DEMO_KEY.to_string(),
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            port: 8080,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let stage_timeout = match lookup("STAGE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.trim().parse().with_context(|| format!("STAGE_TIMEOUT_SECS must be whole seconds, got `{v}`"))?,
            ),
            None => defaults.stage_timeout,
        };
        let port = match lookup("PORT") {
            Some(v) => v.trim().parse().with_context(|| format!("PORT must be a port number, got `{v}`"))?,
            None => defaults.port,
        };
        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").unwrap_or(defaults.gemini_api_key),
            gemini_api_base: lookup("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            stage_timeout,
            port,
        })
    }
}
