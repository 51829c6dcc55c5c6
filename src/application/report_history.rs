// Report history store - append-only job records
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::report::{HistoryFilter, JobId, ReportHistory, ReportStatus, StatusDelta};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Entries are never removed. Once an entry reaches a terminal status it
/// cannot change again.
#[derive(Clone, Default)]
pub struct ReportHistoryStore {
    entries: Arc<RwLock<Vec<ReportHistory>>>,
}

impl ReportHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, entry: ReportHistory) -> AnalyticsResult<()> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(AnalyticsError::ImmutableRecord(format!(
                "report {} already recorded",
                entry.id
            )));
        }
        entries.push(entry);
        Ok(())
    }

    /// Apply a status change to a non-terminal entry.
    pub async fn update(&self, job_id: JobId, delta: StatusDelta) -> AnalyticsResult<ReportHistory> {
        let mut entries = self.entries.write().await;
        let entry = find_mut(&mut entries, job_id)?;
        if entry.status.is_terminal() {
            return Err(AnalyticsError::ImmutableRecord(format!(
                "report {} is already {:?}",
                job_id, entry.status
            )));
        }
        entry.apply(delta);
        Ok(entry.clone())
    }

    /// Compare-and-set: apply `delta` only while the entry is still in
    /// `expected`. Returns whether the change was applied.
    pub async fn transition(
        &self,
        job_id: JobId,
        expected: ReportStatus,
        delta: StatusDelta,
    ) -> AnalyticsResult<bool> {
        let mut entries = self.entries.write().await;
        let entry = find_mut(&mut entries, job_id)?;
        if entry.status != expected || entry.status.is_terminal() {
            return Ok(false);
        }
        entry.apply(delta);
        Ok(true)
    }

    pub async fn get(&self, job_id: JobId) -> Option<ReportHistory> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == job_id)
            .cloned()
    }

    /// Matching entries, newest first.
    pub async fn list(&self, filter: &HistoryFilter) -> Vec<ReportHistory> {
        let entries = self.entries.read().await;
        // Appends are chronological, so reverse order is newest first
        let matching = entries.iter().rev().filter(|e| filter.matches(e)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

fn find_mut(entries: &mut [ReportHistory], job_id: JobId) -> AnalyticsResult<&mut ReportHistory> {
    entries
        .iter_mut()
        .find(|e| e.id == job_id)
        .ok_or_else(|| AnalyticsError::NotFound(format!("report {}", job_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fixtures::january;
    use crate::domain::report::{
        ArtifactRef, ReportCategory, ReportFormat, ReportGenerationOptions, ReportTemplate,
    };
    use uuid::Uuid;

    fn template(id: &str) -> ReportTemplate {
        ReportTemplate {
            id: id.into(),
            name: "Payroll report".into(),
            description: None,
            category: ReportCategory::Payroll,
            sections: vec![],
            formats: vec![ReportFormat::Csv],
        }
    }

    fn entry(template_id: &str) -> ReportHistory {
        ReportHistory::queued(
            &template(template_id),
            ReportGenerationOptions::new(template_id, january(), ReportFormat::Csv),
        )
    }

    #[tokio::test]
    async fn test_terminal_entries_are_immutable() {
        let store = ReportHistoryStore::new();
        let queued = entry("payroll");
        let id = queued.id;
        store.append(queued).await.unwrap();

        store.update(id, StatusDelta::to(ReportStatus::Running)).await.unwrap();
        let done = store
            .update(id, StatusDelta::succeeded(ArtifactRef("a.csv".into()), 10, chrono::Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(done.status, ReportStatus::Succeeded);

        let result = store.update(id, StatusDelta::failed("late")).await;
        assert!(matches!(result, Err(AnalyticsError::ImmutableRecord(_))));
        assert_eq!(store.get(id).await.unwrap().status, ReportStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_duplicate_append_rejected() {
        let store = ReportHistoryStore::new();
        let queued = entry("payroll");
        store.append(queued.clone()).await.unwrap();
        assert!(matches!(
            store.append(queued).await,
            Err(AnalyticsError::ImmutableRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_only_from_expected_status() {
        let store = ReportHistoryStore::new();
        let queued = entry("payroll");
        let id = queued.id;
        store.append(queued).await.unwrap();

        let cancelled = store
            .transition(id, ReportStatus::Queued, StatusDelta::to(ReportStatus::Cancelled))
            .await
            .unwrap();
        assert!(cancelled);

        let started = store
            .transition(id, ReportStatus::Queued, StatusDelta::to(ReportStatus::Running))
            .await
            .unwrap();
        assert!(!started);
        assert_eq!(store.get(id).await.unwrap().status, ReportStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = ReportHistoryStore::new();
        let result = store.update(Uuid::new_v4(), StatusDelta::to(ReportStatus::Running)).await;
        assert!(matches!(result, Err(AnalyticsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_filter_and_limit() {
        let store = ReportHistoryStore::new();
        let first = entry("payroll");
        let second = entry("cost");
        let third = entry("payroll");
        let ids = [first.id, second.id, third.id];
        for e in [first, second, third] {
            store.append(e).await.unwrap();
        }

        let all: Vec<JobId> = store.list(&HistoryFilter::default()).await.iter().map(|e| e.id).collect();
        assert_eq!(all, vec![ids[2], ids[1], ids[0]]);

        let payroll = store
            .list(&HistoryFilter {
                template_id: Some("payroll".into()),
                limit: Some(1),
                ..Default::default()
            })
            .await;
        assert_eq!(payroll.len(), 1);
        assert_eq!(payroll[0].id, ids[2]);
    }
}
