//! Asynchronous analysis jobs.
//!
//! ## Design
//!
//! - One job per analysis run; a scenario accumulates jobs as history
//! - At most one pending/processing job per scenario
//! - Progress is recorded at fixed checkpoints and never goes back
//! - Terminal states (`completed`, `failed`) are final
//!
//! ## Components
//!
//! - `Job`: state machine shared by every store
//! - `JobStore`: persistence (in-memory or Postgres)
//! - `JobRunner`: bounded queue + worker pool running the pipeline
//! - `recover_interrupted`: startup cleanup of jobs a previous process left unfinished
//! - `RetentionSweeper`: periodic cleanup of old finished jobs

pub mod postgres;
pub mod retention;
pub mod runner;
pub mod store;
pub mod types;

pub use postgres::PgJobStore;
pub use retention::{RetentionPolicy, RetentionSweeper};
pub use runner::{INTERRUPTED, JobRunner, JobRunnerConfig, SubmitError, Submission, recover_interrupted};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{
    CreateOutcome, Job, JobStatus, JobStatusView, StoredAnalysis, TransitionError, checkpoint,
};
