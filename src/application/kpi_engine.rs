// KPI engine - registered metrics over a filter, with prior-period trend
use crate::application::cache::TtlCache;
use crate::application::data_source::DataSource;
use crate::application::registry::MetricRegistry;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::filters::AnalyticsFilters;
use crate::domain::kpi::KpiData;
use crate::domain::metric::{divide, Formula, MetricDefinition};
use crate::domain::record::DataRow;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;

type KpiKey = (String, AnalyticsFilters);

#[derive(Clone)]
pub struct KpiEngine {
    source: Arc<dyn DataSource>,
    registry: Arc<MetricRegistry>,
    cache: Arc<TtlCache<KpiKey, KpiData>>,
}

impl KpiEngine {
    pub fn new(source: Arc<dyn DataSource>, registry: Arc<MetricRegistry>, ttl: Duration) -> Self {
        Self {
            source,
            registry,
            cache: Arc::new(TtlCache::new("kpi", ttl)),
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// One `KpiData` per registered metric, in registration order.
    pub async fn compute_kpis(&self, filters: &AnalyticsFilters) -> AnalyticsResult<Vec<KpiData>> {
        let filters = filters.normalized()?;
        let computations = self
            .registry
            .metrics()
            .iter()
            .map(|definition| self.compute_cached(definition.clone(), filters.clone()));
        try_join_all(computations).await
    }

    pub async fn compute_metric(&self, name: &str, filters: &AnalyticsFilters) -> AnalyticsResult<KpiData> {
        let filters = filters.normalized()?;
        let definition = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| AnalyticsError::UnknownProducer(format!("metric '{}'", name)))?;
        self.compute_cached(definition, filters).await
    }

    /// Drop every cached KPI of a company, e.g. right after its data changed.
    pub async fn invalidate_company(&self, company_id: &str) -> usize {
        self.cache
            .invalidate(|(_, filters)| filters.company() == company_id)
            .await
    }

    /// Drop expired entries; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }

    async fn compute_cached(
        &self,
        definition: MetricDefinition,
        filters: AnalyticsFilters,
    ) -> AnalyticsResult<KpiData> {
        let key = (definition.name.clone(), filters.clone());
        let source = self.source.clone();
        self.cache
            .get_or_compute(key, move || async move {
                compute_definition(source.as_ref(), &definition, &filters).await
            })
            .await
    }
}

/// Result of one formula over one period.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Evaluation {
    value: Option<f64>,
    rows: usize,
}

async fn compute_definition(
    source: &dyn DataSource,
    definition: &MetricDefinition,
    filters: &AnalyticsFilters,
) -> AnalyticsResult<KpiData> {
    let prior_filters = filters.prior_period();
    let prior = async {
        match &prior_filters {
            Some(prior_filters) => evaluate_period(source, &definition.formula, prior_filters)
                .await
                .map(Some),
            None => Ok(None),
        }
    };
    let (current, prior) = tokio::try_join!(evaluate_period(source, &definition.formula, filters), prior)?;

    // An empty or unrepresentable prior period means there is nothing to compare against
    let previous = prior.filter(|p| p.rows > 0).and_then(|p| p.value);

    tracing::debug!(
        metric = %definition.name,
        company = filters.company(),
        value = ?current.value,
        previous = ?previous,
        "computed metric"
    );

    Ok(KpiData::new(
        definition.name.clone(),
        definition.label.clone(),
        definition.unit,
        current.value,
        previous,
    ))
}

async fn evaluate_period(
    source: &dyn DataSource,
    formula: &Formula,
    filters: &AnalyticsFilters,
) -> AnalyticsResult<Evaluation> {
    let queries = formula.specs().into_iter().map(|spec| source.query(filters, spec));
    let results = try_join_all(queries).await?;
    let mut leaves = results.iter();
    Ok(evaluate(formula, &mut leaves))
}

/// Walks the formula consuming one row set per leaf, in `Formula::specs` order.
fn evaluate<'a, I>(formula: &Formula, leaves: &mut I) -> Evaluation
where
    I: Iterator<Item = &'a Vec<DataRow>>,
{
    match formula {
        Formula::Aggregate { aggregation, .. } => {
            let rows = leaves.next().map(Vec::as_slice).unwrap_or_default();
            Evaluation {
                value: aggregation.apply(rows),
                rows: rows.len(),
            }
        }
        Formula::Ratio {
            numerator,
            denominator,
            scale,
        } => {
            let n = evaluate(numerator, leaves);
            let d = evaluate(denominator, leaves);
            let value = match (n.value, d.value) {
                (Some(n), Some(d)) => divide(n, d).map(|v| v * scale),
                _ => None,
            };
            Evaluation {
                value,
                rows: n.rows + d.rows,
            }
        }
    }
}
