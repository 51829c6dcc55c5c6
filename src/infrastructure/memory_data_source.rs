// In-memory data source - local runs and tests
use crate::application::data_source::DataSource;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::filters::AnalyticsFilters;
use crate::domain::metric::MetricSpec;
use crate::domain::record::DataRow;
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryDataSource {
    rows: Arc<RwLock<Vec<DataRow>>>,
    queries: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl InMemoryDataSource {
    pub fn new(rows: Vec<DataRow>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            ..Default::default()
        }
    }

    /// Load a JSON array of rows.
    pub async fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let rows: Vec<DataRow> =
            serde_json::from_str(&raw).context("Failed to parse seed rows")?;
        tracing::info!("Loaded {} seed rows from {}", rows.len(), path.display());
        Ok(Self::new(rows))
    }

    pub async fn insert(&self, rows: impl IntoIterator<Item = DataRow>) {
        self.rows.write().await.extend(rows);
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Simulate a transport outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn query(&self, filters: &AnalyticsFilters, spec: &MetricSpec) -> AnalyticsResult<Vec<DataRow>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AnalyticsError::DataSourceUnavailable(
                "in-memory source is offline".to_string(),
            ));
        }
        if filters.company().trim().is_empty() {
            return Err(AnalyticsError::Unauthorized(
                "queries must be scoped to a company".to_string(),
            ));
        }
        self.queries.fetch_add(1, Ordering::SeqCst);

        let rows = self.rows.read().await;
        let matched: Vec<DataRow> = rows
            .iter()
            .filter(|row| spec.matches(row, filters))
            .cloned()
            .collect();

        tracing::debug!(
            "Query {} for company {} returned {} rows",
            spec.dataset.table(),
            filters.company(),
            matched.len()
        );
        Ok(matched)
    }
}
