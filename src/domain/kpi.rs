// KPI result model
use super::metric::MetricUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiData {
    pub name: String,
    pub label: String,
    pub value: f64,
    pub unit: MetricUnit,
    /// `value - previous_value`; absent when there is no comparable prior period.
    pub trend: Option<f64>,
    pub previous_value: Option<f64>,
    pub change_percentage: Option<f64>,
    pub direction: TrendDirection,
    pub computed_at: DateTime<Utc>,
}

impl KpiData {
    /// `current` is `None` when the metric is undefined for the period
    /// (ratio over a zero denominator); such a KPI reports zero with no trend.
    pub fn new(
        name: String,
        label: String,
        unit: MetricUnit,
        current: Option<f64>,
        previous: Option<f64>,
    ) -> Self {
        let value = current.unwrap_or(0.0);
        let previous_value = current.and(previous);
        let trend = previous_value.map(|p| value - p);
        let change_percentage = previous_value
            .filter(|p| *p != 0.0)
            .map(|p| (value - p) / p.abs() * 100.0);
        let direction = match trend {
            Some(t) if t > 0.0 => TrendDirection::Up,
            Some(t) if t < 0.0 => TrendDirection::Down,
            _ => TrendDirection::Stable,
        };

        Self {
            name,
            label,
            value,
            unit,
            trend,
            previous_value,
            change_percentage,
            direction,
            computed_at: Utc::now(),
        }
    }
}
