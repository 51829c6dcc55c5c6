// Ports to the external collaborators: data source, renderer, artifact store
use crate::domain::error::AnalyticsResult;
use crate::domain::filters::AnalyticsFilters;
use crate::domain::metric::MetricSpec;
use crate::domain::record::DataRow;
use crate::domain::report::{Artifact, ArtifactRef, ReportFormat, ReportTemplate, ResolvedSection};
use async_trait::async_trait;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Rows of `spec.dataset` matching `filters`. Implementations must refuse
    /// (`Unauthorized`) any request without a company scope and must never
    /// return rows of another company.
    async fn query(&self, filters: &AnalyticsFilters, spec: &MetricSpec) -> AnalyticsResult<Vec<DataRow>>;
}

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Fails with `RenderError` naming the offending section when it can.
    async fn render(
        &self,
        template: &ReportTemplate,
        sections: &[ResolvedSection],
        format: ReportFormat,
    ) -> AnalyticsResult<Artifact>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, artifact: Artifact) -> AnalyticsResult<ArtifactRef>;

    async fn fetch(&self, reference: &ArtifactRef) -> AnalyticsResult<Artifact>;
}
