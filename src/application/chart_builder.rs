// Chart data builder - buckets filtered rows into ordered series
use crate::application::cache::TtlCache;
use crate::application::data_source::DataSource;
use crate::application::registry::ChartRegistry;
use crate::domain::chart::{Bucketing, ChartData, ChartDefinition, ChartPoint, TimeGranularity};
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::filters::AnalyticsFilters;
use crate::domain::metric::{Aggregation, AggregationKind};
use crate::domain::record::DataRow;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Category label for rows that lack the grouping field.
pub const UNASSIGNED: &str = "unassigned";

type ChartKey = (String, AnalyticsFilters);

#[derive(Clone)]
pub struct ChartBuilder {
    source: Arc<dyn DataSource>,
    registry: Arc<ChartRegistry>,
    cache: Arc<TtlCache<ChartKey, ChartData>>,
}

impl ChartBuilder {
    pub fn new(source: Arc<dyn DataSource>, registry: Arc<ChartRegistry>, ttl: Duration) -> Self {
        Self {
            source,
            registry,
            cache: Arc::new(TtlCache::new("chart", ttl)),
        }
    }

    pub fn registry(&self) -> &ChartRegistry {
        &self.registry
    }

    /// Registered chart by id, served from cache while fresh.
    pub async fn build_chart(&self, chart_id: &str, filters: &AnalyticsFilters) -> AnalyticsResult<ChartData> {
        let filters = filters.normalized()?;
        let definition = self
            .registry
            .get(chart_id)
            .cloned()
            .ok_or_else(|| AnalyticsError::UnknownProducer(format!("chart '{}'", chart_id)))?;

        let key = (definition.id.clone(), filters.clone());
        let source = self.source.clone();
        self.cache
            .get_or_compute(key, move || async move {
                build(source.as_ref(), &definition, &filters).await
            })
            .await
    }

    /// Ad-hoc series for a definition that need not be registered; not cached.
    pub async fn build_series(
        &self,
        filters: &AnalyticsFilters,
        definition: &ChartDefinition,
    ) -> AnalyticsResult<ChartData> {
        let filters = filters.normalized()?;
        build(self.source.as_ref(), definition, &filters).await
    }

    pub async fn invalidate_company(&self, company_id: &str) -> usize {
        self.cache
            .invalidate(|(_, filters)| filters.company() == company_id)
            .await
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }
}

async fn build(
    source: &dyn DataSource,
    definition: &ChartDefinition,
    filters: &AnalyticsFilters,
) -> AnalyticsResult<ChartData> {
    let rows = source.query(filters, &definition.spec).await?;
    let (granularity, points) = bucket_rows(definition, filters, &rows);
    tracing::debug!(
        chart = %definition.id,
        rows = rows.len(),
        buckets = points.len(),
        "built chart series"
    );
    Ok(ChartData::new(definition, granularity, points))
}

/// Pure bucketing step. Every expected bucket is emitted, empty ones as zero.
pub fn bucket_rows(
    definition: &ChartDefinition,
    filters: &AnalyticsFilters,
    rows: &[DataRow],
) -> (Option<TimeGranularity>, Vec<ChartPoint>) {
    let aggregate = |bucket: &[&DataRow]| {
        definition
            .aggregation
            .apply(bucket.iter().copied())
            .unwrap_or(0.0)
    };

    match &definition.bucketing {
        Bucketing::Time { granularity } => {
            let granularity = granularity.unwrap_or_else(|| TimeGranularity::for_span(filters.span_days()));
            let mut grouped: HashMap<NaiveDate, Vec<&DataRow>> = HashMap::new();
            for row in rows.iter().filter(|r| filters.contains(r.occurred_on)) {
                grouped
                    .entry(granularity.bucket_start(row.occurred_on))
                    .or_default()
                    .push(row);
            }

            let points = granularity
                .buckets(filters.from, filters.to)
                .into_iter()
                .map(|start| {
                    let bucket = grouped.get(&start).map(Vec::as_slice).unwrap_or_default();
                    ChartPoint::new(granularity.label(start), aggregate(bucket))
                })
                .collect();
            (Some(granularity), points)
        }
        Bucketing::Category { field, order } => {
            let mut grouped: HashMap<&str, Vec<&DataRow>> = HashMap::new();
            for row in rows {
                let label = row.dimension_value(field).unwrap_or(UNASSIGNED);
                grouped.entry(label).or_default().push(row);
            }

            // Declared order first, then discovered labels sorted by label
            let discovered: BTreeSet<&str> = grouped
                .keys()
                .copied()
                .filter(|label| !order.iter().any(|o| o.as_str() == *label))
                .collect();
            let labels = order.iter().map(String::as_str).chain(discovered);

            let points = labels
                .map(|label| {
                    let bucket = grouped.get(label).map(Vec::as_slice).unwrap_or_default();
                    ChartPoint::new(label.to_string(), aggregate(bucket))
                })
                .collect();
            (None, points)
        }
        Bucketing::Measures { fields } => {
            let points = fields
                .iter()
                .map(|measure| {
                    let aggregation = match definition.aggregation.kind() {
                        AggregationKind::Sum => Aggregation::sum(&measure.field),
                        AggregationKind::Avg => Aggregation::average(&measure.field),
                        AggregationKind::Count => Aggregation::Count,
                    };
                    let value = match aggregation {
                        Aggregation::Count => rows
                            .iter()
                            .filter(|r| r.measures.contains_key(&measure.field))
                            .count() as f64,
                        other => other.apply(rows).unwrap_or(0.0),
                    };
                    ChartPoint::new(measure.label.clone(), value)
                })
                .collect();
            (None, points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fixtures::{date, january, sample_source};
    use crate::domain::chart::{ChartKind, MeasureBucket};
    use crate::domain::metric::MetricSpec;
    use crate::domain::record::Dataset;

    fn builder() -> ChartBuilder {
        ChartBuilder::new(
            Arc::new(sample_source()),
            Arc::new(ChartRegistry::with_defaults()),
            Duration::from_secs(300),
        )
    }

    fn labels(chart: &ChartData) -> Vec<&str> {
        chart.points.iter().map(|p| p.label.as_str()).collect()
    }

    fn values(chart: &ChartData) -> Vec<f64> {
        chart.points.iter().map(|p| p.value).collect()
    }

    #[tokio::test]
    async fn test_daily_trend_has_one_bucket_per_day() {
        let chart = builder().build_chart("payroll_trend", &january()).await.unwrap();

        assert_eq!(chart.granularity, Some(TimeGranularity::Day));
        assert_eq!(chart.points.len(), 31);
        assert_eq!(chart.points[0].label, "2024-01-01");
        assert_eq!(chart.points[4].value, 1500.0);
        assert_eq!(chart.points[1].value, 0.0);
        assert_eq!(values(&chart).iter().sum::<f64>(), 3000.0);
    }

    #[tokio::test]
    async fn test_monthly_trend_over_long_span() {
        let filters = AnalyticsFilters::new(date(2023, 7, 1), date(2024, 6, 30), "acme");
        let chart = builder().build_chart("payroll_trend", &filters).await.unwrap();

        assert_eq!(chart.granularity, Some(TimeGranularity::Month));
        assert_eq!(chart.points.len(), 12);
        assert_eq!(chart.points[5].label, "2023-12");
        assert_eq!(chart.points[5].value, 2000.0);
        assert_eq!(chart.points[6].value, 3000.0);
        assert_eq!(chart.points[11].value, 0.0);
    }

    #[tokio::test]
    async fn test_empty_range_keeps_zero_buckets() {
        let filters = AnalyticsFilters::new(date(2022, 1, 1), date(2022, 1, 7), "acme");
        let chart = builder().build_chart("payroll_trend", &filters).await.unwrap();

        assert_eq!(chart.points.len(), 7);
        assert!(chart.points.iter().all(|p| p.value == 0.0));
    }

    #[tokio::test]
    async fn test_category_buckets_sorted_by_label() {
        let chart = builder()
            .build_chart("department_distribution", &january())
            .await
            .unwrap();

        assert_eq!(chart.kind, ChartKind::Pie);
        assert_eq!(labels(&chart), vec!["eng", "ops", "sales"]);
        assert_eq!(values(&chart), vec![2.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_declared_categories_come_first_and_may_be_empty() {
        let definition = ChartDefinition {
            id: "by_department".into(),
            title: "By department".into(),
            kind: ChartKind::Bar,
            unit: None,
            spec: MetricSpec::up_to(Dataset::Employees).when("status", "active"),
            aggregation: Aggregation::Count,
            bucketing: Bucketing::Category {
                field: "department_id".into(),
                order: vec!["sales".into(), "finance".into()],
            },
        };
        let chart = builder().build_series(&january(), &definition).await.unwrap();

        assert_eq!(labels(&chart), vec!["sales", "finance", "eng", "ops"]);
        assert_eq!(values(&chart), vec![1.0, 0.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_cost_breakdown_in_declared_order() {
        let chart = builder().build_chart("cost_breakdown", &january()).await.unwrap();

        assert_eq!(
            labels(&chart),
            vec!["Earnings", "Deductions", "Gross salary", "Net salary"]
        );
        assert_eq!(values(&chart), vec![4800.0, 1800.0, 4200.0, 3000.0]);
    }

    #[tokio::test]
    async fn test_unknown_chart() {
        let result = builder().build_chart("overtime", &january()).await;
        assert!(matches!(result, Err(AnalyticsError::UnknownProducer(_))));
    }

    #[test]
    fn test_rows_without_field_are_unassigned() {
        let definition = ChartDefinition {
            id: "by_cost_center".into(),
            title: "By cost center".into(),
            kind: ChartKind::Bar,
            unit: None,
            spec: MetricSpec::within(Dataset::PayrollCalculations),
            aggregation: Aggregation::Count,
            bucketing: Bucketing::Category {
                field: "cost_center_id".into(),
                order: Vec::new(),
            },
        };
        let rows = vec![
            DataRow::new(Dataset::PayrollCalculations, "acme", date(2024, 1, 2)).cost_center("cc-2"),
            DataRow::new(Dataset::PayrollCalculations, "acme", date(2024, 1, 3)),
            DataRow::new(Dataset::PayrollCalculations, "acme", date(2024, 1, 4)).cost_center("cc-1"),
        ];

        let (granularity, points) = bucket_rows(&definition, &january(), &rows);
        assert_eq!(granularity, None);
        let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["cc-1", "cc-2", UNASSIGNED]);
    }

    #[test]
    fn test_average_measures() {
        let definition = ChartDefinition {
            id: "avg".into(),
            title: "Averages".into(),
            kind: ChartKind::Bar,
            unit: None,
            spec: MetricSpec::within(Dataset::PayrollCalculations),
            aggregation: Aggregation::average("net_salary"),
            bucketing: Bucketing::Measures {
                fields: vec![MeasureBucket {
                    label: "Net".into(),
                    field: "net_salary".into(),
                }],
            },
        };

        let (_, points) = bucket_rows(&definition, &january(), &[]);
        assert_eq!(points, vec![ChartPoint::new("Net".into(), 0.0)]);
    }
}
