//! Postgres schema bootstrap.
//!
//! Statements are idempotent (`IF NOT EXISTS`) and run once at startup when
//! persistent stores are enabled.

use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scenarios (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL,
        brand_a TEXT NOT NULL,
        brand_b TEXT NOT NULL,
        partnership_type TEXT NOT NULL,
        target_audience TEXT,
        budget_range TEXT,
        status TEXT NOT NULL DEFAULT 'draft',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS scenarios_owner_created_idx
        ON scenarios (owner_id, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analysis_jobs (
        id UUID PRIMARY KEY,
        scenario_id UUID NOT NULL REFERENCES scenarios (id) ON DELETE CASCADE,
        owner_id UUID NOT NULL,
        status TEXT NOT NULL
            CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
        progress SMALLINT NOT NULL CHECK (progress BETWEEN 0 AND 100),
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ
    )
    "#,
    // At most one non-terminal job per scenario.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS analysis_jobs_one_active_idx
        ON analysis_jobs (scenario_id)
        WHERE status IN ('pending', 'processing')
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS analysis_jobs_scenario_created_idx
        ON analysis_jobs (scenario_id, created_at DESC)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS analysis_jobs_owner_created_idx
        ON analysis_jobs (owner_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analysis_results (
        job_id UUID PRIMARY KEY REFERENCES analysis_jobs (id) ON DELETE CASCADE,
        scenario_id UUID NOT NULL,
        result JSONB NOT NULL,
        service_used TEXT NOT NULL,
        model TEXT,
        tokens_used INTEGER NOT NULL DEFAULT 0,
        analysis_duration DOUBLE PRECISION NOT NULL DEFAULT 0,
        response_format TEXT,
        diagnostic TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Create tables and indexes if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!(statements = STATEMENTS.len(), "database schema ensured");
    Ok(())
}

/// Check if an error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}
