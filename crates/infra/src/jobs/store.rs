//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use partnerlens_ai::AnalysisOutcome;
use partnerlens_core::{JobId, ScenarioId};

use super::types::{CreateOutcome, Job, StoredAnalysis, TransitionError};

/// Job store abstraction.
///
/// Each state change is atomic for readers: a concurrent `get` sees either the
/// state before or after it, never a half-applied one.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert `job` unless the scenario already has a non-terminal job, in which
    /// case that job is returned instead.
    async fn create_unless_active(&self, job: Job) -> Result<CreateOutcome, JobStoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Jobs for one scenario, newest first.
    async fn list_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Job>, JobStoreError>;


    async fn mark_processing(
        &self,
        job_id: JobId,
        progress: u8,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError>;

    async fn advance_progress(&self, job_id: JobId, progress: u8) -> Result<Job, JobStoreError>;

    /// Mark completed and persist the result in one step.
    async fn complete(
        &self,
        job_id: JobId,
        outcome: AnalysisOutcome,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError>;

    async fn fail(&self, job_id: JobId, error: &str, now: DateTime<Utc>) -> Result<Job, JobStoreError>;

    async fn result(&self, job_id: JobId) -> Result<Option<StoredAnalysis>, JobStoreError>;

    /// Delete terminal jobs (and their results) completed before `cutoff`.
    /// Returns the number of jobs removed.
    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JobStoreError>;

    /// Fail every pending or processing job in one step, keeping its progress.
    /// Returns the jobs that were failed.
    async fn fail_interrupted(&self, error: &str, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    results: HashMap<JobId, StoredAnalysis>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T, JobStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        Ok(f(&inner))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        f(&mut inner)
    }

    /// Apply a transition to a copy and only write it back if it succeeded.
    fn transition(
        &self,
        job_id: JobId,
        apply: impl FnOnce(&mut Job) -> Result<(), TransitionError>,
    ) -> Result<Job, JobStoreError> {
        self.write(|inner| {
            let stored = inner.jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
            let mut next = stored.clone();
            apply(&mut next)?;
            *stored = next.clone();
            Ok(next)
        })
    }
}

fn newest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.as_uuid().cmp(&a.id.as_uuid())));
    jobs
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_unless_active(&self, job: Job) -> Result<CreateOutcome, JobStoreError> {
        self.write(|inner| {
            let active = inner
                .jobs
                .values()
                .filter(|j| j.scenario_id == job.scenario_id && !j.status.is_terminal())
                .max_by_key(|j| j.created_at);
            if let Some(existing) = active {
                return Ok(CreateOutcome::AlreadyActive(existing.clone()));
            }
            inner.jobs.insert(job.id, job.clone());
            Ok(CreateOutcome::Created(job))
        })
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.read(|inner| inner.jobs.get(&job_id).cloned())
    }

    async fn list_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read(|inner| {
            inner
                .jobs
                .values()
                .filter(|j| j.scenario_id == scenario_id)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(jobs))
    }

    async fn mark_processing(
        &self,
        job_id: JobId,
        progress: u8,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        self.transition(job_id, |job| job.mark_processing(progress, now))
    }

    async fn advance_progress(&self, job_id: JobId, progress: u8) -> Result<Job, JobStoreError> {
        self.transition(job_id, |job| job.advance(progress))
    }

    async fn complete(
        &self,
        job_id: JobId,
        outcome: AnalysisOutcome,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        self.write(|inner| {
            let stored = inner.jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
            let mut next = stored.clone();
            next.mark_completed(now)?;
            *stored = next.clone();
            inner.results.insert(
                job_id,
                StoredAnalysis {
                    job_id,
                    scenario_id: next.scenario_id,
                    outcome,
                    created_at: now,
                },
            );
            Ok(next)
        })
    }

    async fn fail(&self, job_id: JobId, error: &str, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.transition(job_id, |job| job.mark_failed(error, now))
    }

    async fn result(&self, job_id: JobId) -> Result<Option<StoredAnalysis>, JobStoreError> {
        self.read(|inner| inner.results.get(&job_id).cloned())
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JobStoreError> {
        self.write(|inner| {
            let expired: Vec<JobId> = inner
                .jobs
                .values()
                .filter(|j| j.status.is_terminal() && j.completed_at.is_some_and(|at| at < cutoff))
                .map(|j| j.id)
                .collect();
            for id in &expired {
                inner.jobs.remove(id);
                inner.results.remove(id);
            }
            Ok(expired.len() as u64)
        })
    }

    async fn fail_interrupted(&self, error: &str, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        self.write(|inner| {
            let mut failed = Vec::new();
            for job in inner.jobs.values_mut().filter(|j| !j.status.is_terminal()) {
                job.mark_failed(error, now)?;
                failed.push(job.clone());
            }
            Ok(newest_first(failed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{JobStatus, checkpoint};
    use chrono::Duration;
    use partnerlens_ai::{AnalysisResult, FallbackEngine};
    use partnerlens_core::{NewScenario, UserId};

    fn outcome() -> AnalysisOutcome {
        let scenario = NewScenario {
            brand_a: Some("Gucci".into()),
            brand_b: Some("Kith".into()),
            partnership_type: Some("collaboration".into()),
            ..Default::default()
        }
        .into_scenario(UserId::new(), Utc::now())
        .unwrap();
        let result: AnalysisResult = FallbackEngine::new().generate(&scenario);
        AnalysisOutcome::fallback(result, "no API credential configured")
    }

    fn pending(scenario_id: ScenarioId) -> Job {
        Job::new(scenario_id, UserId::new(), Utc::now())
    }

    #[tokio::test]
    async fn second_create_returns_the_active_job() {
        let store = InMemoryJobStore::new();
        let scenario = ScenarioId::new();

        let first = match store.create_unless_active(pending(scenario)).await.unwrap() {
            CreateOutcome::Created(job) => job,
            other => panic!("expected Created, got {other:?}"),
        };
        let again = store.create_unless_active(pending(scenario)).await.unwrap();

        assert_eq!(again, CreateOutcome::AlreadyActive(first.clone()));
        assert_eq!(store.list_by_scenario(scenario).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_jobs_do_not_block_a_new_one() {
        let store = InMemoryJobStore::new();
        let scenario = ScenarioId::new();
        let job = pending(scenario);
        let first_id = job.id;
        store.create_unless_active(job).await.unwrap();
        store.fail(first_id, "boom", Utc::now()).await.unwrap();

        let next = store.create_unless_active(pending(scenario)).await.unwrap();
        assert!(matches!(next, CreateOutcome::Created(ref j) if j.id != first_id));
        assert_eq!(store.list_by_scenario(scenario).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn completion_stores_exactly_one_result() {
        let store = InMemoryJobStore::new();
        let job = pending(ScenarioId::new());
        let id = job.id;
        store.create_unless_active(job).await.unwrap();

        assert!(store.result(id).await.unwrap().is_none());
        store.mark_processing(id, checkpoint::STARTED, Utc::now()).await.unwrap();
        store.advance_progress(id, checkpoint::RESULT_READY).await.unwrap();
        let done = store.complete(id, outcome(), Utc::now()).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(store.result(id).await.unwrap().unwrap().job_id, id);

        let err = store.complete(id, outcome(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, JobStoreError::Transition(TransitionError::Terminal { .. })));
    }

    #[tokio::test]
    async fn rejected_transition_leaves_job_untouched() {
        let store = InMemoryJobStore::new();
        let job = pending(ScenarioId::new());
        let id = job.id;
        store.create_unless_active(job).await.unwrap();
        store.mark_processing(id, checkpoint::STARTED, Utc::now()).await.unwrap();
        store.advance_progress(id, checkpoint::RESULT_READY).await.unwrap();

        assert!(store.advance_progress(id, checkpoint::ENGINE_INVOKED).await.is_err());
        assert_eq!(store.get(id).await.unwrap().unwrap().progress, checkpoint::RESULT_READY);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        assert!(store.get(id).await.unwrap().is_none());
        assert!(matches!(
            store.fail(id, "x", Utc::now()).await,
            Err(JobStoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_jobs() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let old = pending(ScenarioId::new());
        let old_id = old.id;
        store.create_unless_active(old).await.unwrap();
        store.fail(old_id, "boom", now - Duration::days(10)).await.unwrap();

        let active = pending(ScenarioId::new());
        let active_id = active.id;
        store.create_unless_active(active).await.unwrap();

        let removed = store.purge_terminal_before(now - Duration::days(7)).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(old_id).await.unwrap().is_none());
        assert!(store.get(active_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn interrupted_jobs_fail_and_free_their_scenario() {
        let store = InMemoryJobStore::new();
        let scenario = ScenarioId::new();

        let running = pending(scenario);
        let running_id = running.id;
        store.create_unless_active(running).await.unwrap();
        store.mark_processing(running_id, checkpoint::STARTED, Utc::now()).await.unwrap();

        let queued = pending(ScenarioId::new());
        let queued_id = queued.id;
        store.create_unless_active(queued).await.unwrap();

        let finished = pending(ScenarioId::new());
        let finished_id = finished.id;
        store.create_unless_active(finished).await.unwrap();
        store.fail(finished_id, "boom", Utc::now()).await.unwrap();

        let failed = store.fail_interrupted("interrupted", Utc::now()).await.unwrap();

        let mut ids: Vec<JobId> = failed.iter().map(|j| j.id).collect();
        ids.sort_by_key(|id| *id.as_uuid());
        let mut expected = vec![running_id, queued_id];
        expected.sort_by_key(|id| *id.as_uuid());
        assert_eq!(ids, expected);

        let running = store.get(running_id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Failed);
        assert_eq!(running.error.as_deref(), Some("interrupted"));
        assert_eq!(running.progress, checkpoint::STARTED);
        assert!(running.completed_at.is_some());
        assert_eq!(store.get(finished_id).await.unwrap().unwrap().error.as_deref(), Some("boom"));

        let next = store.create_unless_active(pending(scenario)).await.unwrap();
        assert!(matches!(next, CreateOutcome::Created(ref j) if j.id != running_id));
    }
}
