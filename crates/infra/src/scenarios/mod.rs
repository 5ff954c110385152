//! Scenario persistence: in-memory for dev/tests, Postgres when durable.

pub mod postgres;
pub mod store;

pub use postgres::PgScenarioStore;
pub use store::{InMemoryScenarioStore, ScenarioStore, ScenarioStoreError};
