//! `partnerlens-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod scenario;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, ScenarioId, UserId};
pub use scenario::{NewScenario, Scenario, ScenarioStatus};
