// In-memory dashboard repository
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::dashboard::{DashboardConfig, UserPreferences};
use crate::domain::error::AnalyticsResult;
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryDashboardRepository {
    /// owner id -> dashboard id -> config
    configs: Arc<RwLock<HashMap<String, HashMap<String, DashboardConfig>>>>,
    preferences: Arc<RwLock<HashMap<String, UserPreferences>>>,
}

impl InMemoryDashboardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DashboardRepository for InMemoryDashboardRepository {
    async fn list_configs(&self, owner_id: &str) -> AnalyticsResult<Vec<DashboardConfig>> {
        let mut configs: Vec<DashboardConfig> = self
            .configs
            .read()
            .await
            .get(owner_id)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default();
        configs.sort_by(|a, b| {
            (Reverse(a.created_at), &a.id).cmp(&(Reverse(b.created_at), &b.id))
        });
        Ok(configs)
    }

    async fn load_config(&self, owner_id: &str, dashboard_id: &str) -> AnalyticsResult<Option<DashboardConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .get(owner_id)
            .and_then(|owned| owned.get(dashboard_id))
            .cloned())
    }

    async fn save_config(&self, config: DashboardConfig) -> AnalyticsResult<()> {
        self.configs
            .write()
            .await
            .entry(config.owner_id.clone())
            .or_default()
            .insert(config.id.clone(), config);
        Ok(())
    }

    async fn delete_config(&self, owner_id: &str, dashboard_id: &str) -> AnalyticsResult<bool> {
        Ok(self
            .configs
            .write()
            .await
            .get_mut(owner_id)
            .is_some_and(|owned| owned.remove(dashboard_id).is_some()))
    }

    async fn load_preferences(&self, owner_id: &str) -> AnalyticsResult<Option<UserPreferences>> {
        Ok(self.preferences.read().await.get(owner_id).cloned())
    }

    async fn save_preferences(&self, preferences: UserPreferences) -> AnalyticsResult<()> {
        self.preferences
            .write()
            .await
            .insert(preferences.owner_id.clone(), preferences);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn dashboard(id: &str, age_minutes: i64) -> DashboardConfig {
        DashboardConfig {
            id: id.into(),
            created_at: Some(Utc::now() - Duration::minutes(age_minutes)),
            ..DashboardConfig::default_for("u1")
        }
    }

    #[tokio::test]
    async fn test_configs_listed_newest_first_per_owner() {
        let repository = InMemoryDashboardRepository::new();
        repository.save_config(dashboard("old", 10)).await.unwrap();
        repository.save_config(dashboard("new", 1)).await.unwrap();
        repository.save_config(DashboardConfig::default_for("u2")).await.unwrap();

        let ids: Vec<String> = repository
            .list_configs("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert!(repository.delete_config("u1", "old").await.unwrap());
        assert!(!repository.delete_config("u1", "old").await.unwrap());
        assert!(repository.load_config("u1", "old").await.unwrap().is_none());
        assert_eq!(repository.list_configs("u2").await.unwrap().len(), 1);
    }
}
