//! Periodic removal of old terminal jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::{JobStore, JobStoreError};

/// How long finished jobs are kept and how often the sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// `None` keeps jobs forever.
    pub keep_for: Option<chrono::Duration>,
    pub sweep_every: Duration,
}

impl RetentionPolicy {
    pub fn days(days: u32, sweep_every: Duration) -> Self {
        Self {
            keep_for: (days > 0).then(|| chrono::Duration::days(i64::from(days))),
            sweep_every,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.keep_for.is_some()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::days(7, Duration::from_secs(3600))
    }
}

/// Delete terminal jobs finished before `now - keep_for`.
pub async fn sweep_once(
    jobs: &dyn JobStore,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<u64, JobStoreError> {
    let Some(keep_for) = policy.keep_for else {
        return Ok(0);
    };
    jobs.purge_terminal_before(now - keep_for).await
}

/// Handle to the background sweeper.
#[derive(Debug)]
pub struct RetentionSweeper {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl RetentionSweeper {
    /// Start sweeping on the current runtime. Returns `None` when retention is disabled.
    pub fn spawn(jobs: Arc<dyn JobStore>, policy: RetentionPolicy) -> Option<Self> {
        if !policy.is_enabled() {
            info!("job retention disabled");
            return None;
        }

        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(policy.sweep_every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        match sweep_once(jobs.as_ref(), &policy, Utc::now()).await {
                            Ok(0) => debug!("retention sweep found nothing to remove"),
                            Ok(removed) => info!(removed, "retention sweep removed finished jobs"),
                            Err(err) => warn!(error = %err, "retention sweep failed"),
                        }
                    }
                }
            }
        });

        Some(Self { shutdown, join })
    }

    pub async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobStore, Job};
    use partnerlens_core::{ScenarioId, UserId};

    async fn finished_job(store: &InMemoryJobStore, finished_at: DateTime<Utc>) -> Job {
        let job = Job::new(ScenarioId::new(), UserId::new(), finished_at);
        store.create_unless_active(job.clone()).await.unwrap();
        store.fail(job.id, "boom", finished_at).await.unwrap()
    }

    #[tokio::test]
    async fn zero_days_disables_retention() {
        let policy = RetentionPolicy::days(0, Duration::from_secs(1));
        assert!(!policy.is_enabled());

        let store = InMemoryJobStore::new();
        let old = finished_job(&store, Utc::now() - chrono::Duration::days(365)).await;

        assert_eq!(sweep_once(&store, &policy, Utc::now()).await.unwrap(), 0);
        assert!(store.get(old.id).await.unwrap().is_some());
        assert!(RetentionSweeper::spawn(Arc::new(store), policy).is_none());
    }

    #[tokio::test]
    async fn sweep_keeps_recent_jobs() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let old = finished_job(&store, now - chrono::Duration::days(8)).await;
        let recent = finished_job(&store, now - chrono::Duration::days(1)).await;

        let removed = sweep_once(&store, &RetentionPolicy::default(), now).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.get(old.id).await.unwrap().is_none());
        assert!(store.get(recent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn background_sweeper_runs_and_stops() {
        let store = InMemoryJobStore::arc();
        let old = finished_job(&store, Utc::now() - chrono::Duration::days(30)).await;

        let sweeper = RetentionSweeper::spawn(
            store.clone(),
            RetentionPolicy::days(7, Duration::from_millis(10)),
        )
        .unwrap();

        for _ in 0..100 {
            if store.get(old.id).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.stop().await;

        assert!(store.get(old.id).await.unwrap().is_none());
    }
}
