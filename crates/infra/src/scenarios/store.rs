use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use partnerlens_core::{Scenario, ScenarioId, ScenarioStatus, UserId};

/// Scenario persistence.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    async fn insert(&self, scenario: Scenario) -> Result<Scenario, ScenarioStoreError>;

    async fn get(&self, id: ScenarioId) -> Result<Option<Scenario>, ScenarioStoreError>;

    /// Scenarios owned by `owner_id`, oldest first.
    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Scenario>, ScenarioStoreError>;

    async fn set_status(
        &self,
        id: ScenarioId,
        status: ScenarioStatus,
        now: DateTime<Utc>,
    ) -> Result<Scenario, ScenarioStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScenarioStoreError {
    #[error("scenario not found: {0}")]
    NotFound(ScenarioId),
    #[error("scenario already exists: {0}")]
    AlreadyExists(ScenarioId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory scenario store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryScenarioStore {
    scenarios: RwLock<HashMap<ScenarioId, Scenario>>,
}

impl InMemoryScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned<T>(_: T) -> ScenarioStoreError {
    ScenarioStoreError::Storage("scenario store lock poisoned".to_string())
}

#[async_trait]
impl ScenarioStore for InMemoryScenarioStore {
    async fn insert(&self, scenario: Scenario) -> Result<Scenario, ScenarioStoreError> {
        let mut scenarios = self.scenarios.write().map_err(poisoned)?;
        if scenarios.contains_key(&scenario.id) {
            return Err(ScenarioStoreError::AlreadyExists(scenario.id));
        }
        scenarios.insert(scenario.id, scenario.clone());
        Ok(scenario)
    }

    async fn get(&self, id: ScenarioId) -> Result<Option<Scenario>, ScenarioStoreError> {
        let scenarios = self.scenarios.read().map_err(poisoned)?;
        Ok(scenarios.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Scenario>, ScenarioStoreError> {
        let scenarios = self.scenarios.read().map_err(poisoned)?;
        let mut owned: Vec<_> = scenarios
            .values()
            .filter(|s| s.is_owned_by(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        Ok(owned)
    }

    async fn set_status(
        &self,
        id: ScenarioId,
        status: ScenarioStatus,
        now: DateTime<Utc>,
    ) -> Result<Scenario, ScenarioStoreError> {
        let mut scenarios = self.scenarios.write().map_err(poisoned)?;
        let scenario = scenarios.get_mut(&id).ok_or(ScenarioStoreError::NotFound(id))?;
        scenario.status = status;
        scenario.updated_at = now;
        Ok(scenario.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use partnerlens_core::NewScenario;

    fn scenario(owner: UserId, at: DateTime<Utc>) -> Scenario {
        NewScenario {
            brand_a: Some("Nike".into()),
            brand_b: Some("Supreme".into()),
            partnership_type: Some("collaboration".into()),
            ..Default::default()
        }
        .into_scenario(owner, at)
        .unwrap()
    }

    #[tokio::test]
    async fn listing_is_scoped_to_owner_and_oldest_first() {
        let store = InMemoryScenarioStore::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let base = Utc::now();

        let later = store.insert(scenario(alice, base + Duration::seconds(5))).await.unwrap();
        let earlier = store.insert(scenario(alice, base)).await.unwrap();
        store.insert(scenario(bob, base)).await.unwrap();

        let listed = store.list_by_owner(alice).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryScenarioStore::new();
        let s = scenario(UserId::new(), Utc::now());
        store.insert(s.clone()).await.unwrap();
        assert!(matches!(
            store.insert(s).await,
            Err(ScenarioStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn status_update_touches_updated_at() {
        let store = InMemoryScenarioStore::new();
        let created = Utc::now();
        let s = store.insert(scenario(UserId::new(), created)).await.unwrap();

        let later = created + Duration::seconds(3);
        let updated = store.set_status(s.id, ScenarioStatus::Analyzing, later).await.unwrap();

        assert_eq!(updated.status, ScenarioStatus::Analyzing);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.brand_a, "Nike");
        assert!(matches!(
            store.set_status(ScenarioId::new(), ScenarioStatus::Failed, later).await,
            Err(ScenarioStoreError::NotFound(_))
        ));
    }
}
