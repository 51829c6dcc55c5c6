// Report templates, generation requests and job history records
use super::chart::ChartData;
use super::error::AnalyticsResult;
use super::filters::AnalyticsFilters;
use super::kpi::KpiData;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Pdf,
    Xlsx,
    Csv,
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        [
            ReportFormat::Pdf,
            ReportFormat::Xlsx,
            ReportFormat::Csv,
            ReportFormat::Html,
            ReportFormat::Json,
        ]
        .into_iter()
        .find(|format| format.extension().eq_ignore_ascii_case(extension))
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ReportFormat::Csv => "text/csv",
            ReportFormat::Html => "text/html; charset=utf-8",
            ReportFormat::Json => "application/json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Payroll,
    Compliance,
    Performance,
    Cost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionProducer {
    Kpis { metrics: Vec<String> },
    Chart { chart_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: String,
    pub title: String,
    pub producer: SectionProducer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: ReportCategory,
    pub sections: Vec<ReportSection>,
    pub formats: Vec<ReportFormat>,
}

impl ReportTemplate {
    pub fn supports(&self, format: ReportFormat) -> bool {
        self.formats.contains(&format)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGenerationOptions {
    pub template_id: String,
    pub filters: AnalyticsFilters,
    pub format: ReportFormat,
    /// Earliest start; immediate when absent.
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    template_id: String,
    filters: AnalyticsFilters,
    format: ReportFormat,
}

impl ReportGenerationOptions {
    pub fn new(template_id: &str, filters: AnalyticsFilters, format: ReportFormat) -> Self {
        Self {
            template_id: template_id.to_string(),
            filters,
            format,
            run_at: None,
        }
    }

    pub fn idempotency_key(&self) -> AnalyticsResult<IdempotencyKey> {
        Ok(IdempotencyKey {
            template_id: self.template_id.trim().to_string(),
            filters: self.filters.normalized()?,
            format: self.format,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Succeeded | ReportStatus::Failed | ReportStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportHistory {
    pub id: JobId,
    pub company_id: String,
    pub report_name: String,
    pub options: ReportGenerationOptions,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact: Option<ArtifactRef>,
    pub artifact_size: Option<u64>,
    pub error: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ReportHistory {
    pub fn queued(template: &ReportTemplate, options: ReportGenerationOptions) -> Self {
        let report_name = format!(
            "{} - {} to {}",
            template.name, options.filters.from, options.filters.to
        );
        Self {
            id: Uuid::new_v4(),
            company_id: options.filters.company().to_string(),
            report_name,
            options,
            status: ReportStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            artifact: None,
            artifact_size: None,
            error: None,
            expires_at: None,
        }
    }

    pub(crate) fn apply(&mut self, delta: StatusDelta) {
        match delta.status {
            ReportStatus::Running => self.started_at = Some(delta.at),
            status if status.is_terminal() => self.completed_at = Some(delta.at),
            _ => {}
        }
        self.status = delta.status;
        if delta.artifact.is_some() {
            self.artifact = delta.artifact;
            self.artifact_size = delta.artifact_size;
        }
        if delta.error.is_some() {
            self.error = delta.error;
        }
        if delta.expires_at.is_some() {
            self.expires_at = delta.expires_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusDelta {
    pub status: ReportStatus,
    pub at: DateTime<Utc>,
    pub artifact: Option<ArtifactRef>,
    pub artifact_size: Option<u64>,
    pub error: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StatusDelta {
    pub fn to(status: ReportStatus) -> Self {
        Self {
            status,
            at: Utc::now(),
            artifact: None,
            artifact_size: None,
            error: None,
            expires_at: None,
        }
    }

    /// The artifact expires `retention` after completion; never when that
    /// instant is past the representable range.
    pub fn succeeded(artifact: ArtifactRef, size: u64, retention: chrono::Duration) -> Self {
        let done = Self::to(ReportStatus::Succeeded);
        Self {
            artifact: Some(artifact),
            artifact_size: Some(size),
            expires_at: done.at.checked_add_signed(retention),
            ..done
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::to(ReportStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub status: Option<ReportStatus>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &ReportHistory) -> bool {
        self.company_id.as_ref().is_none_or(|c| *c == entry.company_id)
            && self.status.is_none_or(|s| s == entry.status)
            && self
                .template_id
                .as_ref()
                .is_none_or(|t| *t == entry.options.template_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SectionContent {
    Kpis(Vec<KpiData>),
    Chart(ChartData),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSection {
    pub id: String,
    pub title: String,
    pub content: SectionContent,
}

/// Rendered report document.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: ReportStatus,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn filters(company: &str) -> AnalyticsFilters {
        AnalyticsFilters::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            company,
        )
    }

    fn template() -> ReportTemplate {
        ReportTemplate {
            id: "payroll".into(),
            name: "Payroll report".into(),
            description: None,
            category: ReportCategory::Payroll,
            sections: vec![],
            formats: vec![ReportFormat::Csv],
        }
    }

    #[test]
    fn test_idempotency_key_ignores_whitespace() {
        let a = ReportGenerationOptions::new("payroll", filters("acme"), ReportFormat::Pdf);
        let b = ReportGenerationOptions::new(" payroll", filters(" acme "), ReportFormat::Pdf);
        let c = ReportGenerationOptions::new("payroll", filters("acme"), ReportFormat::Csv);

        assert_eq!(a.idempotency_key().unwrap(), b.idempotency_key().unwrap());
        assert_ne!(a.idempotency_key().unwrap(), c.idempotency_key().unwrap());
    }

    #[test]
    fn test_queued_entry_names_period() {
        let options = ReportGenerationOptions::new("payroll", filters("acme"), ReportFormat::Csv);
        let entry = ReportHistory::queued(&template(), options);

        assert_eq!(entry.status, ReportStatus::Queued);
        assert_eq!(entry.company_id, "acme");
        assert_eq!(entry.report_name, "Payroll report - 2024-01-01 to 2024-01-31");
    }

    #[test]
    fn test_apply_sets_timestamps() {
        let options = ReportGenerationOptions::new("payroll", filters("acme"), ReportFormat::Csv);
        let mut entry = ReportHistory::queued(&template(), options);

        entry.apply(StatusDelta::to(ReportStatus::Running));
        assert!(entry.started_at.is_some());
        assert!(entry.completed_at.is_none());

        entry.apply(StatusDelta::failed("renderer exploded"));
        assert_eq!(entry.status, ReportStatus::Failed);
        assert!(entry.completed_at.is_some());
        assert_eq!(entry.error.as_deref(), Some("renderer exploded"));
    }

    #[test]
    fn test_history_filter() {
        let options = ReportGenerationOptions::new("payroll", filters("acme"), ReportFormat::Csv);
        let entry = ReportHistory::queued(&template(), options);

        assert!(HistoryFilter::default().matches(&entry));
        assert!(HistoryFilter {
            company_id: Some("acme".into()),
            status: Some(ReportStatus::Queued),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!HistoryFilter {
            company_id: Some("globex".into()),
            ..Default::default()
        }
        .matches(&entry));
    }
}
