//! Postgres-backed job store.
//!
//! ## Atomicity
//!
//! Every transition runs in one transaction:
//! 1. `SELECT ... FOR UPDATE` the job row
//! 2. apply the transition through the shared [`Job`] methods
//! 3. `UPDATE` the row (plus the result `INSERT` on completion)
//!
//! Readers see either the old or the new row, never a mix. The partial
//! unique index `analysis_jobs_one_active_idx` keeps at most one
//! pending/processing job per scenario even across racing submitters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use partnerlens_ai::{AnalysisOutcome, AnalysisResult, Provenance, ResponseFormat};
use partnerlens_core::{JobId, ScenarioId, UserId};

use super::store::{JobStore, JobStoreError};
use super::types::{CreateOutcome, Job, JobStatus, StoredAnalysis, TransitionError};
use crate::schema::is_unique_violation;

const JOB_COLUMNS: &str = r#"
    id,
    scenario_id,
    owner_id,
    status,
    progress,
    error,
    created_at,
    started_at,
    completed_at
"#;

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: Arc<PgPool>,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub fn from_arc(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, JobStoreError> {
        self.pool.begin().await.map_err(|e| map_sqlx_error(operation, e))
    }

    async fn active_for_scenario(&self, scenario_id: ScenarioId) -> Result<Option<Job>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM analysis_jobs \
             WHERE scenario_id = $1 AND status IN ('pending', 'processing') \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(*scenario_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("active_for_scenario", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Lock the row, apply `apply`, write it back, commit.
    async fn transition<F>(&self, operation: &str, job_id: JobId, apply: F) -> Result<Job, JobStoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError> + Send,
    {
        let mut tx = self.begin(operation).await?;
        let mut job = lock_job(&mut tx, job_id, operation).await?;
        apply(&mut job)?;
        write_job(&mut tx, &job, operation).await?;
        tx.commit().await.map_err(|e| map_sqlx_error(operation, e))?;
        Ok(job)
    }

    async fn list_where(&self, operation: &str, column: &str, id: Uuid) -> Result<Vec<Job>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE {column} = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(job_from_row).collect()
    }
}

async fn lock_job(
    tx: &mut Transaction<'static, Postgres>,
    job_id: JobId,
    operation: &str,
) -> Result<Job, JobStoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(*job_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?
        .ok_or(JobStoreError::NotFound(job_id))?;
    job_from_row(&row)
}

async fn write_job(
    tx: &mut Transaction<'static, Postgres>,
    job: &Job,
    operation: &str,
) -> Result<(), JobStoreError> {
    sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = $2,
            progress = $3,
            error = $4,
            started_at = $5,
            completed_at = $6
        WHERE id = $1
        "#,
    )
    .bind(*job.id.as_uuid())
    .bind(job.status.as_str())
    .bind(i16::from(job.progress))
    .bind(job.error.as_deref())
    .bind(job.started_at)
    .bind(job.completed_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(())
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, scenario_id = %job.scenario_id), err)]
    async fn create_unless_active(&self, job: Job) -> Result<CreateOutcome, JobStoreError> {
        if let Some(existing) = self.active_for_scenario(job.scenario_id).await? {
            return Ok(CreateOutcome::AlreadyActive(existing));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO analysis_jobs (
                id,
                scenario_id,
                owner_id,
                status,
                progress,
                error,
                created_at,
                started_at,
                completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(*job.scenario_id.as_uuid())
        .bind(*job.owner_id.as_uuid())
        .bind(job.status.as_str())
        .bind(i16::from(job.progress))
        .bind(job.error.as_deref())
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&*self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(CreateOutcome::Created(job)),
            // Lost the race against another submitter for this scenario.
            Err(err) if is_unique_violation(&err) => self
                .active_for_scenario(job.scenario_id)
                .await?
                .map(CreateOutcome::AlreadyActive)
                .ok_or_else(|| {
                    JobStoreError::Storage("active job vanished after unique violation".to_string())
                }),
            Err(err) => Err(map_sqlx_error("create_unless_active", err)),
        }
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(*job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), fields(scenario_id = %scenario_id), err)]
    async fn list_by_scenario(&self, scenario_id: ScenarioId) -> Result<Vec<Job>, JobStoreError> {
        self.list_where("list_by_scenario", "scenario_id", *scenario_id.as_uuid())
            .await
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn mark_processing(
        &self,
        job_id: JobId,
        progress: u8,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        self.transition("mark_processing", job_id, |job| job.mark_processing(progress, now))
            .await
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn advance_progress(&self, job_id: JobId, progress: u8) -> Result<Job, JobStoreError> {
        self.transition("advance_progress", job_id, |job| job.advance(progress))
            .await
    }

    #[instrument(skip(self, outcome), fields(job_id = %job_id), err)]
    async fn complete(
        &self,
        job_id: JobId,
        outcome: AnalysisOutcome,
        now: DateTime<Utc>,
    ) -> Result<Job, JobStoreError> {
        let operation = "complete";
        let result = serde_json::to_value(&outcome.result)
            .map_err(|e| JobStoreError::Storage(format!("encode analysis result: {e}")))?;

        let mut tx = self.begin(operation).await?;
        let mut job = lock_job(&mut tx, job_id, operation).await?;
        job.mark_completed(now)?;
        write_job(&mut tx, &job, operation).await?;

        sqlx::query(
            r#"
            INSERT INTO analysis_results (
                job_id,
                scenario_id,
                result,
                service_used,
                model,
                tokens_used,
                analysis_duration,
                response_format,
                diagnostic,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(*job.scenario_id.as_uuid())
        .bind(result)
        .bind(outcome.provenance.as_str())
        .bind(outcome.model.as_deref())
        .bind(i32::try_from(outcome.tokens_used).unwrap_or(i32::MAX))
        .bind(outcome.analysis_duration)
        .bind(outcome.response_format.map(|f| f.as_str()))
        .bind(outcome.diagnostic.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error(operation, e))?;
        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn fail(&self, job_id: JobId, error: &str, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        self.transition("fail", job_id, |job| job.mark_failed(error, now))
            .await
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn result(&self, job_id: JobId) -> Result<Option<StoredAnalysis>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                job_id,
                scenario_id,
                result,
                service_used,
                model,
                tokens_used,
                analysis_duration,
                response_format,
                diagnostic,
                created_at
            FROM analysis_results
            WHERE job_id = $1
            "#,
        )
        .bind(*job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("result", e))?;

        row.as_ref().map(analysis_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, JobStoreError> {
        // analysis_results rows go with their job via ON DELETE CASCADE.
        let done = sqlx::query(
            r#"
            DELETE FROM analysis_jobs
            WHERE status IN ('completed', 'failed')
              AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("purge_terminal_before", e))?;
        Ok(done.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn fail_interrupted(&self, error: &str, now: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        let sql = format!(
            "UPDATE analysis_jobs \
             SET status = 'failed', error = $1, completed_at = $2 \
             WHERE status IN ('pending', 'processing') \
             RETURNING {JOB_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(error)
            .bind(now)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fail_interrupted", e))?;
        rows.iter().map(job_from_row).collect()
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode job row", e);

    let status: String = row.try_get("status").map_err(decode)?;
    let status = status.parse::<JobStatus>().map_err(JobStoreError::Storage)?;
    let progress: i16 = row.try_get("progress").map_err(decode)?;
    let progress = u8::try_from(progress)
        .map_err(|_| JobStoreError::Storage(format!("progress out of range: {progress}")))?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode)?),
        scenario_id: ScenarioId::from_uuid(row.try_get("scenario_id").map_err(decode)?),
        owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(decode)?),
        status,
        progress,
        error: row.try_get("error").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        started_at: row.try_get("started_at").map_err(decode)?,
        completed_at: row.try_get("completed_at").map_err(decode)?,
    })
}

fn analysis_from_row(row: &PgRow) -> Result<StoredAnalysis, JobStoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode analysis row", e);
    let corrupt = |e: partnerlens_ai::AiError| JobStoreError::Storage(e.to_string());

    let result: serde_json::Value = row.try_get("result").map_err(decode)?;
    let result: AnalysisResult = serde_json::from_value(result)
        .map_err(|e| JobStoreError::Storage(format!("decode analysis result: {e}")))?;
    let provenance: String = row.try_get("service_used").map_err(decode)?;
    let response_format: Option<String> = row.try_get("response_format").map_err(decode)?;
    let tokens_used: i32 = row.try_get("tokens_used").map_err(decode)?;

    Ok(StoredAnalysis {
        job_id: JobId::from_uuid(row.try_get("job_id").map_err(decode)?),
        scenario_id: ScenarioId::from_uuid(row.try_get("scenario_id").map_err(decode)?),
        outcome: AnalysisOutcome {
            result,
            provenance: provenance.parse::<Provenance>().map_err(corrupt)?,
            model: row.try_get("model").map_err(decode)?,
            tokens_used: u32::try_from(tokens_used).unwrap_or(0),
            analysis_duration: row.try_get("analysis_duration").map_err(decode)?,
            response_format: response_format
                .as_deref()
                .map(str::parse::<ResponseFormat>)
                .transpose()
                .map_err(corrupt)?,
            diagnostic: row.try_get("diagnostic").map_err(decode)?,
        },
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// Map SQLx errors to `JobStoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
