// Built-in renderer for the text formats
use crate::application::data_source::TemplateRenderer;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::report::{Artifact, ReportFormat, ReportTemplate, ResolvedSection, SectionContent};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::fmt::Write;

/// Renders CSV, HTML and JSON documents. PDF and XLSX need an external
/// renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

#[async_trait]
impl TemplateRenderer for BuiltinRenderer {
    async fn render(
        &self,
        template: &ReportTemplate,
        sections: &[ResolvedSection],
        format: ReportFormat,
    ) -> AnalyticsResult<Artifact> {
        let body = match format {
            ReportFormat::Csv => render_csv(sections),
            ReportFormat::Html => render_html(template, sections),
            ReportFormat::Json => render_json(template, sections)?,
            ReportFormat::Pdf | ReportFormat::Xlsx => {
                return Err(AnalyticsError::RenderError {
                    section: None,
                    message: format!("{:?} output requires an external renderer", format),
                });
            }
        };

        Ok(Artifact {
            file_name: format!("{}.{}", template.id, format.extension()),
            content_type: format.content_type().to_string(),
            bytes: Bytes::from(body),
        })
    }
}

/// One row per KPI or chart point.
fn render_csv(sections: &[ResolvedSection]) -> String {
    let mut out = String::from("section,item,label,value,previous_value,trend\n");
    for section in sections {
        match &section.content {
            SectionContent::Kpis(kpis) => {
                for kpi in kpis {
                    let row = [
                        csv_field(&section.id),
                        csv_field(&kpi.name),
                        csv_field(&kpi.label),
                        kpi.value.to_string(),
                        optional(kpi.previous_value),
                        optional(kpi.trend),
                    ];
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
            }
            SectionContent::Chart(chart) => {
                for point in &chart.points {
                    let row = [
                        csv_field(&section.id),
                        csv_field(&chart.id),
                        csv_field(&point.label),
                        point.value.to_string(),
                        String::new(),
                        String::new(),
                    ];
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
            }
        }
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn render_html(template: &ReportTemplate, sections: &[ResolvedSection]) -> String {
    let mut out = String::new();
    let title = escape(&template.name);
    // Writing into a String cannot fail
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>\n<h1>{title}</h1>\n"
    );

    for section in sections {
        let _ = writeln!(out, "<section id=\"{}\"><h2>{}</h2>", escape(&section.id), escape(&section.title));
        out.push_str("<table>\n");
        match &section.content {
            SectionContent::Kpis(kpis) => {
                out.push_str("<tr><th>Indicator</th><th>Value</th><th>Trend</th></tr>\n");
                for kpi in kpis {
                    let _ = writeln!(
                        out,
                        "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                        escape(&kpi.label),
                        kpi.value,
                        optional(kpi.trend)
                    );
                }
            }
            SectionContent::Chart(chart) => {
                out.push_str("<tr><th>Bucket</th><th>Value</th></tr>\n");
                for point in &chart.points {
                    let _ = writeln!(out, "<tr><td>{}</td><td>{}</td></tr>", escape(&point.label), point.value);
                }
            }
        }
        out.push_str("</table></section>\n");
    }
    out.push_str("</body></html>\n");
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_json(template: &ReportTemplate, sections: &[ResolvedSection]) -> AnalyticsResult<String> {
    let document = json!({
        "template": template.id,
        "name": template.name,
        "category": template.category,
        "sections": sections,
    });
    serde_json::to_string_pretty(&document).map_err(|e| AnalyticsError::RenderError {
        section: None,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chart::{ChartData, ChartKind, ChartPoint};
    use crate::domain::kpi::KpiData;
    use crate::domain::metric::{AggregationKind, MetricUnit};
    use crate::domain::report::ReportCategory;

    fn template() -> ReportTemplate {
        ReportTemplate {
            id: "payroll".into(),
            name: "Payroll <2024>".into(),
            description: None,
            category: ReportCategory::Payroll,
            sections: vec![],
            formats: vec![ReportFormat::Csv],
        }
    }

    fn sections() -> Vec<ResolvedSection> {
        vec![
            ResolvedSection {
                id: "summary".into(),
                title: "Summary".into(),
                content: SectionContent::Kpis(vec![KpiData::new(
                    "payroll_cost".into(),
                    "Payroll cost, net".into(),
                    MetricUnit::Currency,
                    Some(3000.0),
                    Some(2000.0),
                )]),
            },
            ResolvedSection {
                id: "trend".into(),
                title: "Trend".into(),
                content: SectionContent::Chart(ChartData {
                    id: "payroll_trend".into(),
                    title: "Payroll".into(),
                    kind: ChartKind::Line,
                    unit: None,
                    aggregation: AggregationKind::Sum,
                    granularity: None,
                    points: vec![ChartPoint::new("2024-01".into(), 3000.0)],
                }),
            },
        ]
    }

    async fn render(format: ReportFormat) -> AnalyticsResult<Artifact> {
        BuiltinRenderer.render(&template(), &sections(), format).await
    }

    #[tokio::test]
    async fn test_csv_rows() {
        let artifact = render(ReportFormat::Csv).await.unwrap();
        assert_eq!(artifact.file_name, "payroll.csv");
        assert_eq!(artifact.content_type, "text/csv");

        let body = String::from_utf8(artifact.bytes.to_vec()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            vec![
                "section,item,label,value,previous_value,trend",
                "summary,payroll_cost,\"Payroll cost, net\",3000,2000,1000",
                "trend,payroll_trend,2024-01,3000,,",
            ]
        );
    }

    #[tokio::test]
    async fn test_html_is_escaped() {
        let artifact = render(ReportFormat::Html).await.unwrap();
        let body = String::from_utf8(artifact.bytes.to_vec()).unwrap();
        assert!(body.contains("<h1>Payroll &lt;2024&gt;</h1>"));
        assert!(body.contains("<section id=\"trend\">"));
    }

    #[tokio::test]
    async fn test_json_document() {
        let artifact = render(ReportFormat::Json).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(value["template"], "payroll");
        assert_eq!(value["sections"][0]["content"]["type"], "kpis");
        assert_eq!(value["sections"][1]["content"]["data"]["points"][0]["value"], 3000.0);
    }

    #[tokio::test]
    async fn test_binary_formats_need_external_renderer() {
        for format in [ReportFormat::Pdf, ReportFormat::Xlsx] {
            assert!(matches!(
                render(format).await,
                Err(AnalyticsError::RenderError { section: None, .. })
            ));
        }
    }
}
