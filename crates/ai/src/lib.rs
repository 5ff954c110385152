//! `partnerlens-ai`
//!
//! **Responsibility:** partnership analysis, external or local.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It reads scenarios but never mutates them.
//! - It emits **analysis results**, not domain state changes.
//! - Storage and scheduling belong to `partnerlens-infra`.

pub mod engine;
pub mod fallback;
pub mod models;
pub mod parse;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod result;
mod seed;

pub use engine::{AnalysisEngine, AnalysisSettings, Analyzer, PartnerSuggestions};
pub use fallback::{FallbackEngine, FallbackMode};
pub use provider::{AiProvider, Completion, CompletionRequest, ProviderError};
pub use providers::OpenAiProvider;
pub use result::{
    AiError, AnalysisOutcome, AnalysisResult, MarketInsights, Provenance, ResponseFormat, RiskLevel,
};
