//! Background analysis runner.
//!
//! ## Flow
//!
//! - `submit` reserves a slot in a bounded queue, creates the pending job and
//!   hands its id to the dispatcher. It never waits for the analysis.
//! - The dispatcher takes a concurrency permit, then the next queued id, and
//!   spawns the pipeline for it. With every permit taken, ids wait in the
//!   queue; with the queue full, `submit` fails with [`SubmitError::Saturated`].
//! - The pipeline runs in its own task so a panic surfaces as a `JoinError`
//!   and the job still ends `failed`.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use partnerlens_ai::{AiError, Analyzer};
use partnerlens_core::{JobId, Scenario, ScenarioId, ScenarioStatus};

use super::store::{JobStore, JobStoreError};
use super::types::{CreateOutcome, Job, JobStatus, JobStatusView, checkpoint};
use crate::scenarios::ScenarioStore;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Name for logging
    pub name: String,
    /// Jobs analysed at the same time
    pub max_concurrent: usize,
    /// Accepted jobs waiting for a permit
    pub queue_capacity: usize,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            name: "analysis-runner".to_string(),
            max_concurrent: 4,
            queue_capacity: 64,
        }
    }
}

impl JobRunnerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job: Job,
    /// The scenario already had a pending or processing job; `job` is that job.
    pub already_in_progress: bool,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("job queue is full")]
    Saturated,
    #[error("job runner is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Accepts analysis jobs and runs them in the background.
pub struct JobRunner {
    pipeline: Arc<Pipeline>,
    queue: Mutex<Option<mpsc::Sender<JobId>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    queue_capacity: usize,
}

impl JobRunner {
    /// Start the dispatcher on the current Tokio runtime.
    pub fn spawn(
        jobs: Arc<dyn JobStore>,
        scenarios: Arc<dyn ScenarioStore>,
        analyzer: Arc<dyn Analyzer>,
        config: JobRunnerConfig,
    ) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let max_concurrent = config.max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(queue_capacity);

        let pipeline = Arc::new(Pipeline {
            jobs,
            scenarios,
            analyzer,
            name: config.name,
        });
        let dispatcher = tokio::spawn(dispatch(
            rx,
            pipeline.clone(),
            Arc::new(Semaphore::new(max_concurrent)),
        ));

        info!(
            runner = %pipeline.name,
            max_concurrent,
            queue_capacity,
            "job runner started"
        );

        Self {
            pipeline,
            queue: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            queue_capacity,
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<JobId>, SubmitError> {
        self.queue
            .lock()
            .ok()
            .and_then(|queue| queue.clone())
            .ok_or(SubmitError::ShuttingDown)
    }

    /// Create (or reuse) the analysis job for `scenario` and queue it.
    ///
    /// A scenario with a pending or processing job always gets that job back.
    /// Nothing is written when the queue is full.
    pub async fn submit(&self, scenario: &Scenario) -> Result<Submission, SubmitError> {
        let sender = self.sender()?;
        let slot = sender.try_reserve().map_err(|err| match err {
            mpsc::error::TrySendError::Full(()) => SubmitError::Saturated,
            mpsc::error::TrySendError::Closed(()) => SubmitError::ShuttingDown,
        })?;

        let now = Utc::now();
        let candidate = Job::new(scenario.id, scenario.owner_id, now);

        match self.pipeline.jobs.create_unless_active(candidate).await? {
            CreateOutcome::Created(job) => {
                self.pipeline
                    .set_scenario_status(scenario.id, ScenarioStatus::Analyzing)
                    .await;
                slot.send(job.id);
                info!(
                    runner = %self.pipeline.name,
                    job_id = %job.id,
                    scenario_id = %scenario.id,
                    "analysis job queued"
                );
                Ok(Submission {
                    job,
                    already_in_progress: false,
                })
            }
            CreateOutcome::AlreadyActive(job) => {
                drop(slot);
                debug!(
                    job_id = %job.id,
                    scenario_id = %scenario.id,
                    status = %job.status,
                    "analysis already in progress"
                );
                Ok(Submission {
                    job,
                    already_in_progress: true,
                })
            }
        }
    }

    /// Snapshot of a job plus its result once completed.
    pub async fn status(&self, job_id: JobId) -> Result<Option<JobStatusView>, JobStoreError> {
        match self.pipeline.jobs.get(job_id).await? {
            Some(job) => self.pipeline.view(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Every job of a scenario, newest first.
    pub async fn jobs_for_scenario(
        &self,
        scenario_id: ScenarioId,
    ) -> Result<Vec<JobStatusView>, JobStoreError> {
        let jobs = self.pipeline.jobs.list_by_scenario(scenario_id).await?;
        let mut views = Vec::with_capacity(jobs.len());
        for job in jobs {
            views.push(self.pipeline.view(job).await?);
        }
        Ok(views)
    }

    /// Ids accepted but not yet picked up by the dispatcher.
    pub fn queued(&self) -> usize {
        match self.sender() {
            Ok(sender) => self.queue_capacity - sender.capacity(),
            Err(_) => 0,
        }
    }

    /// Stop accepting, run what is already queued, wait for in-flight jobs.
    pub async fn shutdown(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(dispatcher) = dispatcher {
            if let Err(err) = dispatcher.await {
                error!(runner = %self.pipeline.name, error = %err, "job dispatcher aborted");
            }
        }
        info!(runner = %self.pipeline.name, "job runner stopped");
    }
}

/// Error recorded on jobs a previous process left unfinished.
pub const INTERRUPTED: &str = "interrupted";

/// Fail every job left pending or processing by a previous process.
///
/// Call once at startup, before the runner accepts submissions: a live
/// runner's in-flight jobs would be failed too.
pub async fn recover_interrupted(
    jobs: &dyn JobStore,
    scenarios: &dyn ScenarioStore,
) -> Result<usize, JobStoreError> {
    let failed = jobs.fail_interrupted(INTERRUPTED, Utc::now()).await?;
    for job in &failed {
        warn!(job_id = %job.id, scenario_id = %job.scenario_id, progress = job.progress, "interrupted job failed");
        if let Err(err) = scenarios
            .set_status(job.scenario_id, ScenarioStatus::Failed, Utc::now())
            .await
        {
            warn!(scenario_id = %job.scenario_id, error = %err, "scenario status not updated");
        }
    }
    if !failed.is_empty() {
        info!(count = failed.len(), "recovered interrupted jobs");
    }
    Ok(failed.len())
}

async fn dispatch(mut rx: mpsc::Receiver<JobId>, pipeline: Arc<Pipeline>, permits: Arc<Semaphore>) {
    let mut in_flight = JoinSet::new();

    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let Some(job_id) = rx.recv().await else {
            break;
        };

        let pipeline = pipeline.clone();
        in_flight.spawn(async move {
            pipeline.run(job_id).await;
            drop(permit);
        });

        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}

struct Pipeline {
    jobs: Arc<dyn JobStore>,
    scenarios: Arc<dyn ScenarioStore>,
    analyzer: Arc<dyn Analyzer>,
    name: String,
}

impl Pipeline {
    async fn view(&self, job: Job) -> Result<JobStatusView, JobStoreError> {
        let analysis = if job.status == JobStatus::Completed {
            self.jobs.result(job.id).await?
        } else {
            None
        };
        Ok(JobStatusView { job, analysis })
    }

    async fn run(self: Arc<Self>, job_id: JobId) {
        let task = tokio::spawn({
            let pipeline = self.clone();
            async move { pipeline.execute(job_id).await }
        });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(runner = %self.name, job_id = %job_id, error = %err, "job store failure");
                self.fail_quietly(job_id, "storage error").await;
            }
            Err(err) => {
                error!(
                    runner = %self.name,
                    job_id = %job_id,
                    panicked = err.is_panic(),
                    "job pipeline aborted"
                );
                self.fail_quietly(job_id, "internal error").await;
            }
        }
    }

    async fn execute(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let Some(job) = self.jobs.get(job_id).await? else {
            warn!(runner = %self.name, job_id = %job_id, "queued job disappeared");
            return Ok(());
        };

        let scenario = match self.scenarios.get(job.scenario_id).await {
            Ok(Some(scenario)) => scenario,
            Ok(None) => {
                warn!(job_id = %job_id, scenario_id = %job.scenario_id, "scenario not found");
                self.jobs.fail(job_id, "scenario not found", Utc::now()).await?;
                return Ok(());
            }
            Err(err) => {
                error!(job_id = %job_id, scenario_id = %job.scenario_id, error = %err, "scenario lookup failed");
                self.jobs.fail(job_id, "scenario lookup failed", Utc::now()).await?;
                self.set_scenario_status(job.scenario_id, ScenarioStatus::Failed).await;
                return Ok(());
            }
        };

        self.jobs
            .mark_processing(job_id, checkpoint::STARTED, Utc::now())
            .await?;
        info!(runner = %self.name, job_id = %job_id, scenario_id = %scenario.id, "analysis started");

        self.jobs
            .advance_progress(job_id, checkpoint::ENGINE_INVOKED)
            .await?;

        match self.analyzer.analyze(&scenario).await {
            Ok(outcome) => {
                self.jobs
                    .advance_progress(job_id, checkpoint::RESULT_READY)
                    .await?;
                let provenance = outcome.provenance;
                self.jobs.complete(job_id, outcome, Utc::now()).await?;
                self.set_scenario_status(scenario.id, ScenarioStatus::Completed)
                    .await;
                info!(
                    runner = %self.name,
                    job_id = %job_id,
                    scenario_id = %scenario.id,
                    service_used = provenance.as_str(),
                    "analysis completed"
                );
            }
            Err(err) => {
                warn!(job_id = %job_id, scenario_id = %scenario.id, error = %err, "analysis failed");
                self.jobs
                    .fail(job_id, &public_message(&err), Utc::now())
                    .await?;
                self.set_scenario_status(scenario.id, ScenarioStatus::Failed)
                    .await;
            }
        }

        Ok(())
    }

    /// Mark failed unless something already finished the job.
    async fn fail_quietly(&self, job_id: JobId, message: &str) {
        match self.jobs.fail(job_id, message, Utc::now()).await {
            Ok(job) => {
                self.set_scenario_status(job.scenario_id, ScenarioStatus::Failed)
                    .await
            }
            Err(JobStoreError::Transition(_)) => {}
            Err(err) => error!(job_id = %job_id, error = %err, "could not record job failure"),
        }
    }

    async fn set_scenario_status(&self, scenario_id: ScenarioId, status: ScenarioStatus) {
        if let Err(err) = self
            .scenarios
            .set_status(scenario_id, status, Utc::now())
            .await
        {
            warn!(scenario_id = %scenario_id, status = status.as_str(), error = %err, "scenario status not updated");
        }
    }
}

/// The error text stored on a failed job.
fn public_message(err: &AiError) -> String {
    match err {
        AiError::InvalidInput(_) => err.to_string(),
        AiError::ExternalUnavailable(_) | AiError::Internal(_) => "analysis failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use partnerlens_ai::{AnalysisOutcome, FallbackEngine, Provenance};
    use partnerlens_core::{NewScenario, UserId};

    use crate::jobs::InMemoryJobStore;
    use crate::scenarios::InMemoryScenarioStore;

    /// Blocks every analysis until the test releases it.
    struct Gated {
        gate: Semaphore,
    }

    impl Gated {
        fn closed() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
            })
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }
    }

    #[async_trait]
    impl Analyzer for Gated {
        async fn analyze(&self, scenario: &Scenario) -> Result<AnalysisOutcome, AiError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| AiError::Internal(e.to_string()))?;
            permit.forget();
            let result = FallbackEngine::new().generate(scenario);
            Ok(AnalysisOutcome::fallback(result, "no API credential configured"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Analyzer for Panicking {
        async fn analyze(&self, _scenario: &Scenario) -> Result<AnalysisOutcome, AiError> {
            panic!("analyzer exploded");
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Analyzer for Rejecting {
        async fn analyze(&self, _scenario: &Scenario) -> Result<AnalysisOutcome, AiError> {
            Err(AiError::InvalidInput("missing required fields: brand_b".into()))
        }
    }

    struct Harness {
        runner: JobRunner,
        jobs: Arc<InMemoryJobStore>,
        scenarios: Arc<InMemoryScenarioStore>,
    }

    impl Harness {
        fn new(analyzer: Arc<dyn Analyzer>, config: JobRunnerConfig) -> Self {
            let jobs = InMemoryJobStore::arc();
            let scenarios = InMemoryScenarioStore::arc();
            let runner = JobRunner::spawn(jobs.clone(), scenarios.clone(), analyzer, config);
            Self {
                runner,
                jobs,
                scenarios,
            }
        }

        async fn scenario(&self, brand_a: &str) -> Scenario {
            let scenario = NewScenario {
                brand_a: Some(brand_a.into()),
                brand_b: Some("Supreme".into()),
                partnership_type: Some("co-branding".into()),
                ..Default::default()
            }
            .into_scenario(UserId::new(), Utc::now())
            .unwrap();
            self.scenarios.insert(scenario).await.unwrap()
        }

        async fn wait_until(&self, job_id: JobId, status: JobStatus) -> JobStatusView {
            for _ in 0..500 {
                let view = self.runner.status(job_id).await.unwrap().unwrap();
                if view.job.status == status {
                    return view;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job {job_id} never reached {status}");
        }
    }

    #[tokio::test]
    async fn jobs_left_running_by_a_previous_process_do_not_block_reanalysis() {
        let jobs = InMemoryJobStore::arc();
        let scenarios = InMemoryScenarioStore::arc();
        let scenario = NewScenario {
            brand_a: Some("Dior".into()),
            brand_b: Some("Stussy".into()),
            partnership_type: Some("collaboration".into()),
            ..Default::default()
        }
        .into_scenario(UserId::new(), Utc::now())
        .unwrap();
        let scenario = scenarios.insert(scenario).await.unwrap();

        // State a crashed process leaves behind.
        let orphan = Job::new(scenario.id, scenario.owner_id, Utc::now());
        let orphan_id = orphan.id;
        jobs.create_unless_active(orphan).await.unwrap();
        jobs.mark_processing(orphan_id, checkpoint::STARTED, Utc::now()).await.unwrap();

        let recovered = recover_interrupted(jobs.as_ref(), scenarios.as_ref()).await.unwrap();
        assert_eq!(recovered, 1);

        let orphan = jobs.get(orphan_id).await.unwrap().unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.error.as_deref(), Some(INTERRUPTED));
        assert_eq!(orphan.progress, checkpoint::STARTED);
        assert_eq!(
            scenarios.get(scenario.id).await.unwrap().unwrap().status,
            ScenarioStatus::Failed
        );

        let gate = Gated::closed();
        let runner = JobRunner::spawn(jobs.clone(), scenarios.clone(), gate.clone(), JobRunnerConfig::default());
        let submitted = runner.submit(&scenario).await.unwrap();
        assert!(!submitted.already_in_progress);
        assert_ne!(submitted.job.id, orphan_id);

        gate.release(1);
        runner.shutdown().await;
        assert_eq!(
            jobs.get(submitted.job.id).await.unwrap().unwrap().status,
            JobStatus::Completed
        );
        assert_eq!(recover_interrupted(jobs.as_ref(), scenarios.as_ref()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submit_returns_before_analysis_finishes() {
        let gate = Gated::closed();
        let h = Harness::new(gate.clone(), JobRunnerConfig::default());
        let scenario = h.scenario("Louis Vuitton").await;

        let submitted = h.runner.submit(&scenario).await.unwrap();
        assert!(!submitted.already_in_progress);
        assert_eq!(submitted.job.status, JobStatus::Pending);

        let processing = h.wait_until(submitted.job.id, JobStatus::Processing).await;
        assert_eq!(processing.job.progress, checkpoint::ENGINE_INVOKED);
        assert!(processing.analysis.is_none());
        assert_eq!(
            h.scenarios.get(scenario.id).await.unwrap().unwrap().status,
            ScenarioStatus::Analyzing
        );

        gate.release(1);
        let done = h.wait_until(submitted.job.id, JobStatus::Completed).await;
        assert_eq!(done.job.progress, 100);
        assert!(done.job.completed_at.is_some());
        let analysis = done.analysis.unwrap();
        assert_eq!(analysis.outcome.provenance, Provenance::Fallback);
        assert_eq!(
            h.scenarios.get(scenario.id).await.unwrap().unwrap().status,
            ScenarioStatus::Completed
        );
    }

    #[tokio::test]
    async fn resubmitting_an_active_scenario_returns_the_same_job() {
        let gate = Gated::closed();
        let h = Harness::new(gate.clone(), JobRunnerConfig::default());
        let scenario = h.scenario("Gucci").await;

        let first = h.runner.submit(&scenario).await.unwrap();
        for _ in 0..3 {
            let again = h.runner.submit(&scenario).await.unwrap();
            assert!(again.already_in_progress);
            assert_eq!(again.job.id, first.job.id);
        }
        assert_eq!(h.jobs.list_by_scenario(scenario.id).await.unwrap().len(), 1);
        gate.release(1);
        h.wait_until(first.job.id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn reanalysis_after_completion_keeps_history() {
        let gate = Gated::closed();
        let h = Harness::new(gate.clone(), JobRunnerConfig::default());
        let scenario = h.scenario("Prada").await;
        gate.release(2);

        let first = h.runner.submit(&scenario).await.unwrap();
        let first_done = h.wait_until(first.job.id, JobStatus::Completed).await;

        let second = h.runner.submit(&scenario).await.unwrap();
        assert!(!second.already_in_progress);
        assert_ne!(second.job.id, first.job.id);
        h.wait_until(second.job.id, JobStatus::Completed).await;

        let history = h.runner.jobs_for_scenario(scenario.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].job.id, second.job.id);
        assert_eq!(history[1].analysis, first_done.analysis);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_writing() {
        let gate = Gated::closed();
        let config = JobRunnerConfig::default()
            .with_max_concurrent(1)
            .with_queue_capacity(1);
        let h = Harness::new(gate.clone(), config);

        let running = h.scenario("Hermes").await;
        let waiting = h.scenario("Dior").await;
        let rejected = h.scenario("Chanel").await;

        let first = h.runner.submit(&running).await.unwrap();
        h.wait_until(first.job.id, JobStatus::Processing).await;

        let queued = h.runner.submit(&waiting).await.unwrap();
        assert_eq!(h.runner.queued(), 1);

        let err = h.runner.submit(&rejected).await.unwrap_err();
        assert!(matches!(err, SubmitError::Saturated));
        assert!(h.jobs.list_by_scenario(rejected.id).await.unwrap().is_empty());

        gate.release(2);
        h.wait_until(first.job.id, JobStatus::Completed).await;
        h.wait_until(queued.job.id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn missing_scenario_fails_from_pending() {
        let h = Harness::new(Gated::closed(), JobRunnerConfig::default());
        let orphan = NewScenario {
            brand_a: Some("Ghost".into()),
            brand_b: Some("Brand".into()),
            partnership_type: Some("event".into()),
            ..Default::default()
        }
        .into_scenario(UserId::new(), Utc::now())
        .unwrap();

        let submitted = h.runner.submit(&orphan).await.unwrap();
        let failed = h.wait_until(submitted.job.id, JobStatus::Failed).await;

        assert_eq!(failed.job.error.as_deref(), Some("scenario not found"));
        assert_eq!(failed.job.progress, 0);
        assert!(failed.job.started_at.is_none());
    }

    #[tokio::test]
    async fn panicking_analyzer_is_recorded_as_internal_error() {
        let h = Harness::new(Arc::new(Panicking), JobRunnerConfig::default());
        let scenario = h.scenario("Balenciaga").await;

        let submitted = h.runner.submit(&scenario).await.unwrap();
        let failed = h.wait_until(submitted.job.id, JobStatus::Failed).await;

        assert_eq!(failed.job.error.as_deref(), Some("internal error"));
        assert_eq!(failed.job.progress, checkpoint::ENGINE_INVOKED);
        assert!(failed.analysis.is_none());
        assert_eq!(
            h.scenarios.get(scenario.id).await.unwrap().unwrap().status,
            ScenarioStatus::Failed
        );
    }

    #[tokio::test]
    async fn analyzer_error_fails_job_with_its_message() {
        let h = Harness::new(Arc::new(Rejecting), JobRunnerConfig::default());
        let scenario = h.scenario("Fendi").await;

        let submitted = h.runner.submit(&scenario).await.unwrap();
        let failed = h.wait_until(submitted.job.id, JobStatus::Failed).await;

        assert!(failed.job.error.unwrap().contains("brand_b"));
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_work() {
        let gate = Gated::closed();
        let h = Harness::new(gate.clone(), JobRunnerConfig::default());
        let scenario = h.scenario("Celine").await;

        let submitted = h.runner.submit(&scenario).await.unwrap();
        gate.release(1);
        h.runner.shutdown().await;

        let view = h.runner.status(submitted.job.id).await.unwrap().unwrap();
        assert_eq!(view.job.status, JobStatus::Completed);

        let late = h.scenario("Loewe").await;
        assert!(matches!(
            h.runner.submit(&late).await,
            Err(SubmitError::ShuttingDown)
        ));
    }
}
