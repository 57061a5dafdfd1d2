use std::{fmt::Display, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-3.5-turbo".to_owned(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub session_idle_minutes: i64,
    pub ai: AiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            database_url: "sqlite://studyhall.db".to_owned(),
            database_max_connections: 8,
            session_idle_minutes: 30,
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    /// Reads the environment (and `.env`, if present) on top of the defaults.
    pub fn load() -> anyhow::Result<Self> {
        if dotenv::dotenv().is_err() {
            info!("no .env file, using the process environment only");
        }

        let defaults = Config::default();
        Ok(Self {
            port: try_load("PORT", defaults.port)?,
            database_url: try_load("DATABASE_URL", defaults.database_url)?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            session_idle_minutes: try_load("SESSION_IDLE_MINUTES", defaults.session_idle_minutes)?,
            ai: AiConfig {
                api_key: var("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
                base_url: try_load("OPENAI_BASE_URL", defaults.ai.base_url)?,
                model: try_load("AI_MODEL", defaults.ai.model)?,
                timeout_secs: try_load("AI_TIMEOUT_SECS", defaults.ai.timeout_secs)?,
            },
        })
    }
}

fn var(key: &str) -> Option<String> {
    dotenv::var(key).ok()
}

fn try_load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| {
                warn!("Invalid {key} value: {e}");
                e
            })
            .with_context(|| format!("{key}={raw:?} could not be parsed")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
