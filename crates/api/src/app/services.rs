//! Service wiring: stores, analysis engine, job runner, retention.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use sqlx::PgPool;

use partnerlens_ai::{AiProvider, AnalysisEngine, FallbackEngine, OpenAiProvider};
use partnerlens_infra::jobs::{
    InMemoryJobStore, JobRunner, JobStore, PgJobStore, RetentionSweeper, recover_interrupted,
};
use partnerlens_infra::scenarios::{InMemoryScenarioStore, PgScenarioStore, ScenarioStore};
use partnerlens_infra::{AppConfig, Persistence};

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub scenarios: Arc<dyn ScenarioStore>,
    pub engine: Arc<AnalysisEngine>,
    pub runner: JobRunner,
    retention: Mutex<Option<RetentionSweeper>>,
}

impl AppServices {
    /// Drain the job runner and stop background tasks.
    pub async fn shutdown(&self) {
        self.runner.shutdown().await;
        let sweeper = self.retention.lock().ok().and_then(|mut s| s.take());
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let (scenarios, jobs) = build_stores(&config.persistence).await?;

    let provider: Option<Arc<dyn AiProvider>> = match &config.ai.api_key {
        Some(key) => {
            let provider = OpenAiProvider::new(key.clone(), config.ai.base_url.clone(), config.ai.timeout)
                .context("failed to build AI provider")?;
            Some(Arc::new(provider))
        }
        None => {
            tracing::warn!("no AI API key configured; every analysis uses the local fallback");
            None
        }
    };

    let fallback = FallbackEngine::new()
        .with_mode(config.fallback.mode)
        .with_delay(config.fallback.delay);
    let fallback_mode = fallback.mode();
    let engine = Arc::new(
        AnalysisEngine::new(provider, fallback).with_settings(config.analysis_settings()),
    );
    tracing::info!(
        external = engine.has_external_provider(),
        model = %engine.settings().model,
        fallback_mode = ?fallback_mode,
        "analysis engine ready"
    );

    let recovered = recover_interrupted(jobs.as_ref(), scenarios.as_ref())
        .await
        .context("failed to recover interrupted jobs")?;
    if recovered > 0 {
        tracing::warn!(recovered, "failed jobs left unfinished by a previous run");
    }

    let runner = JobRunner::spawn(
        jobs.clone(),
        scenarios.clone(),
        engine.clone(),
        config.runner_config(),
    );
    let retention = RetentionSweeper::spawn(jobs.clone(), config.retention_policy());

    Ok(AppServices {
        scenarios,
        engine,
        runner,
        retention: Mutex::new(retention),
    })
}

async fn build_stores(
    persistence: &Persistence,
) -> anyhow::Result<(Arc<dyn ScenarioStore>, Arc<dyn JobStore>)> {
    match persistence {
        Persistence::InMemory => {
            tracing::warn!("using in-memory stores; scenarios and jobs are lost on restart");
            let scenarios: Arc<dyn ScenarioStore> = InMemoryScenarioStore::arc();
            let jobs: Arc<dyn JobStore> = InMemoryJobStore::arc();
            Ok((scenarios, jobs))
        }
        Persistence::Postgres { database_url } => {
            let pool = PgPool::connect(database_url)
                .await
                .context("failed to connect to Postgres")?;
            partnerlens_infra::ensure_schema(&pool)
                .await
                .context("failed to prepare database schema")?;

            let pool = Arc::new(pool);
            let scenarios: Arc<dyn ScenarioStore> = Arc::new(PgScenarioStore::from_arc(pool.clone()));
            let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::from_arc(pool));
            Ok((scenarios, jobs))
        }
    }
}
