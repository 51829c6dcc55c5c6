// Dashboard service - per-owner layouts and preferences
use crate::application::dashboard_repository::DashboardRepository;
use crate::domain::dashboard::{DashboardConfig, UserPreferences};
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct DashboardService {
    repository: Arc<dyn DashboardRepository>,
}

impl DashboardService {
    pub fn new(repository: Arc<dyn DashboardRepository>) -> Self {
        Self { repository }
    }

    /// The owner's active dashboard, or the default layout on first use.
    pub async fn get_config(&self, owner_id: &str) -> AnalyticsResult<DashboardConfig> {
        let saved = self.repository.list_configs(owner_id).await?;
        let favorite = self
            .repository
            .load_preferences(owner_id)
            .await?
            .and_then(|p| p.favorite_dashboard_id);
        Ok(DashboardConfig::select_active(&saved, favorite.as_deref())
            .cloned()
            .unwrap_or_else(|| DashboardConfig::default_for(owner_id)))
    }

    /// Dashboards of `owner_id` visible to `viewer_id`, newest first.
    pub async fn list_configs(&self, viewer_id: &str, owner_id: &str) -> AnalyticsResult<Vec<DashboardConfig>> {
        let mut configs = self.repository.list_configs(owner_id).await?;
        if viewer_id != owner_id {
            configs.retain(|c| c.is_public);
        }
        Ok(configs)
    }

    /// Private dashboards of other owners are reported as missing.
    pub async fn get_config_by_id(
        &self,
        viewer_id: &str,
        owner_id: &str,
        dashboard_id: &str,
    ) -> AnalyticsResult<DashboardConfig> {
        self.repository
            .load_config(owner_id, dashboard_id)
            .await?
            .filter(|c| viewer_id == owner_id || c.is_public)
            .ok_or_else(|| not_found(dashboard_id))
    }

    /// `caller_id` must own the config; widget ids must be unique. A config
    /// flagged default takes the flag from the owner's other dashboards.
    pub async fn save_config(&self, caller_id: &str, mut config: DashboardConfig) -> AnalyticsResult<DashboardConfig> {
        ensure_owner(caller_id, &config.owner_id)?;
        config.id = config.id.trim().to_string();
        config.validate()?;

        let now = Utc::now();
        let existing = self.repository.load_config(&config.owner_id, &config.id).await?;
        config.created_at = existing.and_then(|c| c.created_at).or(Some(now));
        config.updated_at = Some(now);

        if config.is_default {
            for mut other in self.repository.list_configs(&config.owner_id).await? {
                if other.id != config.id && other.is_default {
                    other.is_default = false;
                    self.repository.save_config(other).await?;
                }
            }
        }

        self.repository.save_config(config.clone()).await?;
        tracing::info!(
            "Saved dashboard '{}' ({}) for {} with {} widgets",
            config.name,
            config.id,
            config.owner_id,
            config.widgets.len()
        );
        Ok(config)
    }

    /// Remove one dashboard and return the one the owner now lands on.
    pub async fn delete_config(
        &self,
        caller_id: &str,
        owner_id: &str,
        dashboard_id: &str,
    ) -> AnalyticsResult<DashboardConfig> {
        ensure_owner(caller_id, owner_id)?;
        if !self.repository.delete_config(owner_id, dashboard_id).await? {
            return Err(not_found(dashboard_id));
        }
        tracing::info!("Deleted dashboard {} of {}", dashboard_id, owner_id);

        if let Some(mut preferences) = self.repository.load_preferences(owner_id).await? {
            if preferences.favorite_dashboard_id.as_deref() == Some(dashboard_id) {
                preferences.favorite_dashboard_id = None;
                self.repository.save_preferences(preferences).await?;
            }
        }
        self.get_config(owner_id).await
    }

    pub async fn get_preferences(&self, owner_id: &str) -> AnalyticsResult<UserPreferences> {
        let preferences = self.repository.load_preferences(owner_id).await?;
        Ok(preferences.unwrap_or_else(|| UserPreferences::default_for(owner_id)))
    }

    /// The favorite dashboard, when set, must be one the owner saved.
    pub async fn save_preferences(
        &self,
        caller_id: &str,
        mut preferences: UserPreferences,
    ) -> AnalyticsResult<UserPreferences> {
        ensure_owner(caller_id, &preferences.owner_id)?;
        preferences.validate()?;

        preferences.favorite_dashboard_id = preferences
            .favorite_dashboard_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if let Some(favorite) = &preferences.favorite_dashboard_id {
            if self
                .repository
                .load_config(&preferences.owner_id, favorite)
                .await?
                .is_none()
            {
                return Err(not_found(favorite));
            }
        }

        self.repository.save_preferences(preferences.clone()).await?;
        Ok(preferences)
    }
}

fn ensure_owner(caller_id: &str, owner_id: &str) -> AnalyticsResult<()> {
    if caller_id != owner_id {
        return Err(AnalyticsError::Forbidden(format!(
            "{} cannot modify dashboards of {}",
            caller_id, owner_id
        )));
    }
    Ok(())
}

fn not_found(dashboard_id: &str) -> AnalyticsError {
    AnalyticsError::NotFound(format!("dashboard '{}'", dashboard_id))
}
