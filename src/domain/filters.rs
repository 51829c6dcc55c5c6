// Analytics filter model - query scope for KPIs, charts and reports
use super::error::{AnalyticsError, AnalyticsResult};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive date range scoped to one company, optionally narrowed to a
/// department and/or cost center.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalyticsFilters {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub cost_center_id: Option<String>,
}

impl AnalyticsFilters {
    pub fn new(from: NaiveDate, to: NaiveDate, company_id: impl Into<String>) -> Self {
        Self {
            from,
            to,
            company_id: Some(company_id.into()),
            department_id: None,
            cost_center_id: None,
        }
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_cost_center(mut self, cost_center_id: impl Into<String>) -> Self {
        self.cost_center_id = Some(cost_center_id.into());
        self
    }

    /// Trim identifiers, drop blank ones and validate the range.
    /// Two filters describing the same scope normalize to equal values, which
    /// makes the result usable as a cache or idempotency key.
    pub fn normalized(&self) -> AnalyticsResult<Self> {
        let normalized = Self {
            from: self.from,
            to: self.to,
            company_id: clean(&self.company_id),
            department_id: clean(&self.department_id),
            cost_center_id: clean(&self.cost_center_id),
        };
        normalized.validate()?;
        Ok(normalized)
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.from > self.to {
            return Err(AnalyticsError::InvalidFilter(format!(
                "range start {} is after range end {}",
                self.from, self.to
            )));
        }
        if clean(&self.company_id).is_none() {
            return Err(AnalyticsError::InvalidFilter("company_id is required".to_string()));
        }
        Ok(())
    }

    /// Company scope; empty only for filters that have not been validated.
    pub fn company(&self) -> &str {
        self.company_id.as_deref().unwrap_or_default()
    }

    /// Number of days covered, both ends included.
    pub fn span_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// The period of equal length ending the day before `from`. None when
    /// it would start before the earliest representable date.
    pub fn prior_period(&self) -> Option<Self> {
        let shift = Days::new(u64::try_from(self.span_days()).ok()?);
        Some(Self {
            from: self.from.checked_sub_days(shift)?,
            to: self.to.checked_sub_days(shift)?,
            ..self.clone()
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
