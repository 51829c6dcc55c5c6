// Repository trait for dashboard layouts and user preferences
use crate::domain::dashboard::{DashboardConfig, UserPreferences};
use crate::domain::error::AnalyticsResult;
use async_trait::async_trait;

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Every saved dashboard of `owner_id`, newest first.
    async fn list_configs(&self, owner_id: &str) -> AnalyticsResult<Vec<DashboardConfig>>;

    async fn load_config(&self, owner_id: &str, dashboard_id: &str) -> AnalyticsResult<Option<DashboardConfig>>;

    /// Last writer wins per `(owner_id, id)`.
    async fn save_config(&self, config: DashboardConfig) -> AnalyticsResult<()>;

    /// Returns whether the dashboard existed.
    async fn delete_config(&self, owner_id: &str, dashboard_id: &str) -> AnalyticsResult<bool>;

    async fn load_preferences(&self, owner_id: &str) -> AnalyticsResult<Option<UserPreferences>>;

    async fn save_preferences(&self, preferences: UserPreferences) -> AnalyticsResult<()>;
}
