// Chart series model and bucketing rules
use super::metric::{Aggregation, AggregationKind, MetricSpec};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGranularity {
    Day,
    Week,
    Month,
}

impl TimeGranularity {
    /// Daily up to a month, weekly up to half a year, monthly beyond.
    pub fn for_span(days: i64) -> Self {
        if days <= 31 {
            TimeGranularity::Day
        } else if days <= 182 {
            TimeGranularity::Week
        } else {
            TimeGranularity::Month
        }
    }

    /// Weeks that would begin before the earliest representable date start
    /// at that date instead.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeGranularity::Day => date,
            TimeGranularity::Week => date
                .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
                .unwrap_or(NaiveDate::MIN),
            TimeGranularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn next(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            TimeGranularity::Day => start.checked_add_days(Days::new(1)),
            TimeGranularity::Week => start.checked_add_days(Days::new(7)),
            TimeGranularity::Month => start.checked_add_months(Months::new(1)),
        }
    }

    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            TimeGranularity::Day => start.format("%Y-%m-%d").to_string(),
            TimeGranularity::Week => start.format("%G-W%V").to_string(),
            TimeGranularity::Month => start.format("%Y-%m").to_string(),
        }
    }

    /// Start dates of every bucket touching [from, to], ascending.
    pub fn buckets(&self, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
        let mut starts = Vec::new();
        let mut cursor = self.bucket_start(from);
        while cursor <= to {
            starts.push(cursor);
            match self.next(cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        starts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureBucket {
    pub label: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bucketing {
    /// Granularity is derived from the filter span when not given.
    Time {
        #[serde(default)]
        granularity: Option<TimeGranularity>,
    },
    /// Declared categories come first, in declared order, even when empty.
    Category {
        field: String,
        #[serde(default)]
        order: Vec<String>,
    },
    /// One bucket per measure column, in declared order.
    Measures { fields: Vec<MeasureBucket> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDefinition {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    #[serde(default)]
    pub unit: Option<String>,
    pub spec: MetricSpec,
    pub aggregation: Aggregation,
    pub bucketing: Bucketing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

impl ChartPoint {
    pub fn new(label: String, value: f64) -> Self {
        Self { label, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub unit: Option<String>,
    pub aggregation: AggregationKind,
    pub granularity: Option<TimeGranularity>,
    pub points: Vec<ChartPoint>,
}

impl ChartData {
    pub fn new(
        definition: &ChartDefinition,
        granularity: Option<TimeGranularity>,
        points: Vec<ChartPoint>,
    ) -> Self {
        Self {
            id: definition.id.clone(),
            title: definition.title.clone(),
            kind: definition.kind,
            unit: definition.unit.clone(),
            aggregation: definition.aggregation.kind(),
            granularity,
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_granularity_from_span() {
        assert_eq!(TimeGranularity::for_span(1), TimeGranularity::Day);
        assert_eq!(TimeGranularity::for_span(31), TimeGranularity::Day);
        assert_eq!(TimeGranularity::for_span(90), TimeGranularity::Week);
        assert_eq!(TimeGranularity::for_span(365), TimeGranularity::Month);
    }

    #[test]
    fn test_week_buckets_start_on_monday() {
        // 2024-01-03 is a Wednesday
        let starts = TimeGranularity::Week.buckets(date(2024, 1, 3), date(2024, 1, 15));
        assert_eq!(starts, vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)]);
        assert_eq!(TimeGranularity::Week.label(starts[0]), "2024-W01");
    }

    #[test]
    fn test_month_buckets_cover_partial_months() {
        let starts = TimeGranularity::Month.buckets(date(2024, 1, 20), date(2024, 4, 2));
        let labels: Vec<String> = starts.iter().map(|s| TimeGranularity::Month.label(*s)).collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
    }

    #[test]
    fn test_day_buckets_include_both_ends() {
        assert_eq!(TimeGranularity::Day.buckets(date(2024, 2, 27), date(2024, 3, 1)).len(), 4);
    }

    #[test]
    fn test_buckets_at_calendar_limits() {
        for granularity in [TimeGranularity::Day, TimeGranularity::Week, TimeGranularity::Month] {
            let start = granularity.bucket_start(NaiveDate::MIN);
            assert_eq!(start, NaiveDate::MIN);
            assert_eq!(granularity.buckets(NaiveDate::MIN, NaiveDate::MIN).len(), 1);
            assert_eq!(granularity.buckets(NaiveDate::MAX, NaiveDate::MAX).len(), 1);
        }
    }
}
