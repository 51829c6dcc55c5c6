// Report template registry - section references are checked on registration
use crate::application::registry::{ChartRegistry, MetricRegistry};
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::report::{
    ReportCategory, ReportFormat, ReportSection, ReportTemplate, SectionProducer,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct TemplateRegistry {
    metrics: Arc<MetricRegistry>,
    charts: Arc<ChartRegistry>,
    templates: Arc<RwLock<HashMap<String, ReportTemplate>>>,
}

impl TemplateRegistry {
    pub fn new(metrics: Arc<MetricRegistry>, charts: Arc<ChartRegistry>) -> Self {
        Self {
            metrics,
            charts,
            templates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, template: ReportTemplate) -> AnalyticsResult<()> {
        self.validate(&template)?;
        tracing::info!(
            "Registered report template '{}' with {} sections",
            template.id,
            template.sections.len()
        );
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template);
        Ok(())
    }

    pub async fn get(&self, template_id: &str) -> Option<ReportTemplate> {
        self.templates.read().await.get(template_id.trim()).cloned()
    }

    /// All templates ordered by name.
    pub async fn list(&self) -> Vec<ReportTemplate> {
        let mut templates: Vec<ReportTemplate> = self.templates.read().await.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        templates
    }

    /// Every section must point at a registered metric or chart.
    pub fn validate(&self, template: &ReportTemplate) -> AnalyticsResult<()> {
        if template.id.trim().is_empty() {
            return Err(AnalyticsError::InvalidFilter("template id is required".to_string()));
        }
        if template.formats.is_empty() {
            return Err(AnalyticsError::UnsupportedFormat(format!(
                "template '{}' declares no output format",
                template.id
            )));
        }
        for section in &template.sections {
            match &section.producer {
                SectionProducer::Kpis { metrics } => {
                    if let Some(missing) = metrics.iter().find(|m| !self.metrics.contains(m)) {
                        return Err(unknown(&template.id, &section.id, "metric", missing));
                    }
                }
                SectionProducer::Chart { chart_id } => {
                    if !self.charts.contains(chart_id) {
                        return Err(unknown(&template.id, &section.id, "chart", chart_id));
                    }
                }
            }
        }
        Ok(())
    }
}

fn unknown(template_id: &str, section_id: &str, kind: &str, name: &str) -> AnalyticsError {
    AnalyticsError::UnknownProducer(format!(
        "template '{}' section '{}' references unknown {} '{}'",
        template_id, section_id, kind, name
    ))
}

fn section(id: &str, title: &str, producer: SectionProducer) -> ReportSection {
    ReportSection {
        id: id.to_string(),
        title: title.to_string(),
        producer,
    }
}

fn kpis(metrics: &[&str]) -> SectionProducer {
    SectionProducer::Kpis {
        metrics: metrics.iter().map(|m| m.to_string()).collect(),
    }
}

fn chart(chart_id: &str) -> SectionProducer {
    SectionProducer::Chart {
        chart_id: chart_id.to_string(),
    }
}

/// Templates available when no catalogue file is configured.
pub fn builtin_templates() -> Vec<ReportTemplate> {
    vec![
        ReportTemplate {
            id: "payroll".to_string(),
            name: "Payroll report".to_string(),
            description: Some("Payroll totals, trend and departmental distribution".to_string()),
            category: ReportCategory::Payroll,
            sections: vec![
                section(
                    "summary",
                    "Summary",
                    kpis(&["headcount", "payroll_cost", "average_salary", "completed_payrolls", "pending_payrolls"]),
                ),
                section("trend", "Payroll evolution", chart("payroll_trend")),
                section("departments", "Headcount by department", chart("department_distribution")),
                section("costs", "Cost breakdown", chart("cost_breakdown")),
            ],
            formats: vec![
                ReportFormat::Pdf,
                ReportFormat::Xlsx,
                ReportFormat::Csv,
                ReportFormat::Html,
                ReportFormat::Json,
            ],
        },
        ReportTemplate {
            id: "compliance".to_string(),
            name: "Compliance report".to_string(),
            description: Some("Turnover, absenteeism and pending payrolls".to_string()),
            category: ReportCategory::Compliance,
            sections: vec![
                section("rates", "Rates", kpis(&["headcount", "turnover_rate", "absenteeism_rate", "pending_payrolls"])),
                section("departments", "Headcount by department", chart("department_distribution")),
            ],
            formats: vec![ReportFormat::Pdf, ReportFormat::Csv, ReportFormat::Html, ReportFormat::Json],
        },
        ReportTemplate {
            id: "cost".to_string(),
            name: "Cost report".to_string(),
            description: None,
            category: ReportCategory::Cost,
            sections: vec![
                section("summary", "Summary", kpis(&["payroll_cost", "average_salary"])),
                section("costs", "Cost breakdown", chart("cost_breakdown")),
            ],
            formats: vec![ReportFormat::Pdf, ReportFormat::Xlsx, ReportFormat::Csv],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::new(
            Arc::new(MetricRegistry::with_defaults()),
            Arc::new(ChartRegistry::with_defaults()),
        )
    }

    #[tokio::test]
    async fn test_builtin_templates_register() {
        let registry = registry();
        for template in builtin_templates() {
            registry.register(template).await.unwrap();
        }

        let names: Vec<String> = registry.list().await.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Compliance report", "Cost report", "Payroll report"]);
        assert!(registry.get(" payroll ").await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_metric_rejected_at_registration() {
        let registry = registry();
        let mut template = builtin_templates().remove(0);
        template.sections.push(section("extra", "Extra", kpis(&["overtime_hours"])));

        let err = registry.register(template).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownProducer(ref m) if m.contains("overtime_hours")));
        assert!(registry.get("payroll").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_chart_rejected_at_registration() {
        let registry = registry();
        let mut template = builtin_templates().remove(0);
        template.sections.push(section("extra", "Extra", chart("heatmap")));

        assert!(matches!(
            registry.register(template).await,
            Err(AnalyticsError::UnknownProducer(_))
        ));
    }

    #[tokio::test]
    async fn test_template_without_formats_rejected() {
        let mut template = builtin_templates().remove(0);
        template.formats.clear();
        assert!(matches!(
            registry().register(template).await,
            Err(AnalyticsError::UnsupportedFormat(_))
        ));
    }
}
