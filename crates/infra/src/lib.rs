//! Infrastructure layer: persistence, background jobs, configuration.

pub mod config;
pub mod jobs;
pub mod scenarios;
pub mod schema;

pub use config::{AppConfig, ConfigError, Persistence};
pub use schema::ensure_schema;
