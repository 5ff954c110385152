//! Postgres-backed scenario store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use partnerlens_core::{Scenario, ScenarioId, ScenarioStatus, UserId};

use super::store::{ScenarioStore, ScenarioStoreError};
use crate::schema::is_unique_violation;

const SCENARIO_COLUMNS: &str = r#"
    id,
    owner_id,
    brand_a,
    brand_b,
    partnership_type,
    target_audience,
    budget_range,
    status,
    created_at,
    updated_at
"#;

#[derive(Debug, Clone)]
pub struct PgScenarioStore {
    pool: Arc<PgPool>,
}

impl PgScenarioStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub fn from_arc(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScenarioStore for PgScenarioStore {
    #[instrument(skip(self, scenario), fields(scenario_id = %scenario.id), err)]
    async fn insert(&self, scenario: Scenario) -> Result<Scenario, ScenarioStoreError> {
        sqlx::query(
            r#"
            INSERT INTO scenarios (
                id,
                owner_id,
                brand_a,
                brand_b,
                partnership_type,
                target_audience,
                budget_range,
                status,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(*scenario.id.as_uuid())
        .bind(*scenario.owner_id.as_uuid())
        .bind(&scenario.brand_a)
        .bind(&scenario.brand_b)
        .bind(&scenario.partnership_type)
        .bind(scenario.target_audience.as_deref())
        .bind(scenario.budget_range.as_deref())
        .bind(scenario.status.as_str())
        .bind(scenario.created_at)
        .bind(scenario.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ScenarioStoreError::AlreadyExists(scenario.id)
            } else {
                map_sqlx_error("insert_scenario", e)
            }
        })?;
        Ok(scenario)
    }

    #[instrument(skip(self), fields(scenario_id = %id), err)]
    async fn get(&self, id: ScenarioId) -> Result<Option<Scenario>, ScenarioStoreError> {
        let sql = format!("SELECT {SCENARIO_COLUMNS} FROM scenarios WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_scenario", e))?;
        row.as_ref().map(scenario_from_row).transpose()
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Scenario>, ScenarioStoreError> {
        let sql = format!(
            "SELECT {SCENARIO_COLUMNS} FROM scenarios WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(*owner_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_scenarios", e))?;
        rows.iter().map(scenario_from_row).collect()
    }

    #[instrument(skip(self), fields(scenario_id = %id, status = status.as_str()), err)]
    async fn set_status(
        &self,
        id: ScenarioId,
        status: ScenarioStatus,
        now: DateTime<Utc>,
    ) -> Result<Scenario, ScenarioStoreError> {
        let sql = format!(
            "UPDATE scenarios SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {SCENARIO_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .bind(status.as_str())
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_scenario_status", e))?
            .ok_or(ScenarioStoreError::NotFound(id))?;
        scenario_from_row(&row)
    }
}

fn scenario_from_row(row: &PgRow) -> Result<Scenario, ScenarioStoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode scenario row", e);

    let status: String = row.try_get("status").map_err(decode)?;
    let status = status
        .parse::<ScenarioStatus>()
        .map_err(|e| ScenarioStoreError::Storage(e.to_string()))?;

    Ok(Scenario {
        id: ScenarioId::from_uuid(row.try_get("id").map_err(decode)?),
        owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(decode)?),
        brand_a: row.try_get("brand_a").map_err(decode)?,
        brand_b: row.try_get("brand_b").map_err(decode)?,
        partnership_type: row.try_get("partnership_type").map_err(decode)?,
        target_audience: row.try_get("target_audience").map_err(decode)?,
        budget_range: row.try_get("budget_range").map_err(decode)?,
        status,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ScenarioStoreError {
    match err {
        sqlx::Error::Database(db_err) => ScenarioStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            ScenarioStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => ScenarioStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
