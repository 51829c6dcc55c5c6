// Metric definitions - what to read and how to aggregate it
use super::filters::AnalyticsFilters;
use super::record::{DataRow, Dataset};
use serde::{Deserialize, Serialize};

/// How a spec's date range applies to the dataset's reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateScope {
    /// Rows dated inside [from, to].
    Within,
    /// Rows dated on or before `to` (stock figures such as headcount).
    UpTo,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: String,
}

/// The data-source request behind a metric or chart series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricSpec {
    pub dataset: Dataset,
    pub date_scope: DateScope,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl MetricSpec {
    pub fn within(dataset: Dataset) -> Self {
        Self {
            dataset,
            date_scope: DateScope::Within,
            conditions: Vec::new(),
        }
    }

    pub fn up_to(dataset: Dataset) -> Self {
        Self {
            dataset,
            date_scope: DateScope::UpTo,
            conditions: Vec::new(),
        }
    }

    pub fn when(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Whether `row` belongs to this spec under `filters`. Company scope is
    /// always enforced, so a row from another company never matches.
    pub fn matches(&self, row: &DataRow, filters: &AnalyticsFilters) -> bool {
        if row.dataset != self.dataset || row.company_id != filters.company() {
            return false;
        }

        let in_range = match self.date_scope {
            DateScope::Within => filters.contains(row.occurred_on),
            DateScope::UpTo => row.occurred_on <= filters.to,
        };
        if !in_range {
            return false;
        }

        if let Some(department) = &filters.department_id {
            if row.department_id.as_ref() != Some(department) {
                return false;
            }
        }
        if let Some(cost_center) = &filters.cost_center_id {
            if row.cost_center_id.as_ref() != Some(cost_center) {
                return false;
            }
        }

        self.conditions
            .iter()
            .all(|c| row.dimension_value(&c.field) == Some(c.value.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Sum,
    Avg,
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregation {
    Sum { field: String },
    Count,
    Average { field: String },
    WeightedAverage { field: String, weight: String },
}

impl Aggregation {
    pub fn sum(field: impl Into<String>) -> Self {
        Aggregation::Sum { field: field.into() }
    }

    pub fn average(field: impl Into<String>) -> Self {
        Aggregation::Average { field: field.into() }
    }

    pub fn kind(&self) -> AggregationKind {
        match self {
            Aggregation::Sum { .. } => AggregationKind::Sum,
            Aggregation::Count => AggregationKind::Count,
            Aggregation::Average { .. } | Aggregation::WeightedAverage { .. } => {
                AggregationKind::Avg
            }
        }
    }

    /// `None` when the aggregate is undefined (an average over no weight).
    pub fn apply<'a, I>(&self, rows: I) -> Option<f64>
    where
        I: IntoIterator<Item = &'a DataRow>,
    {
        match self {
            Aggregation::Sum { field } => Some(rows.into_iter().map(|r| r.measure_value(field)).sum()),
            Aggregation::Count => Some(rows.into_iter().count() as f64),
            Aggregation::Average { field } => {
                let (total, count) = rows
                    .into_iter()
                    .fold((0.0, 0usize), |(t, c), r| (t + r.measure_value(field), c + 1));
                divide(total, count as f64)
            }
            Aggregation::WeightedAverage { field, weight } => {
                let (total, weights) = rows.into_iter().fold((0.0, 0.0), |(t, w), r| {
                    let rw = r.measure_value(weight);
                    (t + r.measure_value(field) * rw, w + rw)
                });
                divide(total, weights)
            }
        }
    }
}

pub fn divide(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// One aggregate over one spec, or a scaled ratio of two formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Formula {
    Aggregate {
        spec: MetricSpec,
        aggregation: Aggregation,
    },
    Ratio {
        numerator: Box<Formula>,
        denominator: Box<Formula>,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
}

fn unit_scale() -> f64 {
    1.0
}

impl Formula {
    pub fn aggregate(spec: MetricSpec, aggregation: Aggregation) -> Self {
        Formula::Aggregate { spec, aggregation }
    }

    pub fn ratio(numerator: Formula, denominator: Formula, scale: f64) -> Self {
        Formula::Ratio {
            numerator: Box::new(numerator),
            denominator: Box::new(denominator),
            scale,
        }
    }

    /// Leaf specs in evaluation order.
    pub fn specs(&self) -> Vec<&MetricSpec> {
        match self {
            Formula::Aggregate { spec, .. } => vec![spec],
            Formula::Ratio {
                numerator,
                denominator,
                ..
            } => {
                let mut specs = numerator.specs();
                specs.extend(denominator.specs());
                specs
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    Count,
    Currency,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub label: String,
    pub unit: MetricUnit,
    pub formula: Formula,
}

impl MetricDefinition {
    pub fn new(name: &str, label: &str, unit: MetricUnit, formula: Formula) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            unit,
            formula,
        }
    }
}
