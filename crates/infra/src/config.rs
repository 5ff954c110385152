//! Configuration loading and representation.
//!
//! Everything comes from environment variables. [`AppConfig::from_lookup`]
//! takes any lookup function so tests never touch the process environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use partnerlens_ai::{AnalysisSettings, FallbackMode};

use crate::jobs::{JobRunnerConfig, RetentionPolicy};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_FALLBACK_DELAY_MS: u64 = 1500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} is required{context}")]
    Missing { var: &'static str, context: &'static str },

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where scenarios and jobs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// Process-local; lost on restart.
    InMemory,
    Postgres { database_url: String },
}

/// External model access.
#[derive(Clone, PartialEq)]
pub struct AiConfig {
    /// `None` runs fallback-only.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    pub mode: FallbackMode,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    /// `0` disables retention.
    pub retention_days: u32,
    pub retention_sweep_every: Duration,
}

#[derive(Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// True when `JWT_SECRET` was absent and the dev secret is in use.
    pub jwt_secret_is_default: bool,
    pub persistence: Persistence,
    pub ai: AiConfig,
    pub fallback: FallbackConfig,
    pub jobs: JobsConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_secret_is_default", &self.jwt_secret_is_default)
            .field("persistence", &self.persistence)
            .field("ai", &self.ai)
            .field("fallback", &self.fallback)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let analysis = AnalysisSettings::default();

        let bind_addr = env
            .parsed::<SocketAddr>("BIND_ADDR")?
            .unwrap_or(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let (jwt_secret, jwt_secret_is_default) = match env.get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEV_JWT_SECRET.to_string(), true),
        };

        let persistence = if env.flag("USE_PERSISTENT_STORES")?.unwrap_or(false) {
            let database_url = env.get("DATABASE_URL").ok_or(ConfigError::Missing {
                var: "DATABASE_URL",
                context: " when USE_PERSISTENT_STORES=true",
            })?;
            Persistence::Postgres { database_url }
        } else {
            Persistence::InMemory
        };

        let ai = AiConfig {
            api_key: env.get("AI_API_KEY").or_else(|| env.get("OPENAI_API_KEY")),
            base_url: env.get("AI_BASE_URL"),
            model: env.get("AI_MODEL").unwrap_or(analysis.model),
            timeout: Duration::from_secs(
                env.parsed("AI_TIMEOUT_SECS")?
                    .unwrap_or(analysis.call_timeout.as_secs()),
            ),
            temperature: env.parsed("AI_TEMPERATURE")?.unwrap_or(analysis.temperature),
            max_tokens: env.parsed("AI_MAX_TOKENS")?.unwrap_or(analysis.max_tokens),
        };
        if !(0.0..=2.0).contains(&ai.temperature) {
            return Err(invalid("AI_TEMPERATURE", ai.temperature, "expected 0.0..=2.0"));
        }

        let mode = match env.get("FALLBACK_MODE") {
            Some(raw) => raw
                .parse::<FallbackMode>()
                .map_err(|e| invalid("FALLBACK_MODE", &raw, e))?,
            None => FallbackMode::default(),
        };
        let fallback = FallbackConfig {
            mode,
            delay: Duration::from_millis(
                env.parsed("FALLBACK_DELAY_MS")?
                    .unwrap_or(DEFAULT_FALLBACK_DELAY_MS),
            ),
        };

        let runner = JobRunnerConfig::default();
        let jobs = JobsConfig {
            max_concurrent: env.positive("JOB_MAX_CONCURRENT")?.unwrap_or(runner.max_concurrent),
            queue_capacity: env.positive("JOB_QUEUE_CAPACITY")?.unwrap_or(runner.queue_capacity),
            retention_days: env.parsed("JOB_RETENTION_DAYS")?.unwrap_or(7),
            retention_sweep_every: Duration::from_secs(
                env.positive("JOB_RETENTION_SWEEP_SECS")?
                    .map_or(3600, |secs: usize| secs as u64),
            ),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            jwt_secret_is_default,
            persistence,
            ai,
            fallback,
            jobs,
        })
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            model: self.ai.model.clone(),
            temperature: self.ai.temperature,
            max_tokens: self.ai.max_tokens,
            call_timeout: self.ai.timeout,
            ..AnalysisSettings::default()
        }
    }

    pub fn runner_config(&self) -> JobRunnerConfig {
        JobRunnerConfig::default()
            .with_max_concurrent(self.jobs.max_concurrent)
            .with_queue_capacity(self.jobs.queue_capacity)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::days(self.jobs.retention_days, self.jobs.retention_sweep_every)
    }
}

fn invalid(var: &'static str, value: impl ToString, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(var)
            .map(|raw| raw.parse::<T>().map_err(|e| invalid(var, &raw, e)))
            .transpose()
    }

    fn positive(&self, var: &'static str) -> Result<Option<usize>, ConfigError> {
        match self.parsed::<usize>(var)? {
            Some(0) => Err(invalid(var, 0, "must be greater than zero")),
            other => Ok(other),
        }
    }

    fn flag(&self, var: &'static str) -> Result<Option<bool>, ConfigError> {
        self.get(var)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(invalid(var, &raw, "expected true or false")),
            })
            .transpose()
    }
}
