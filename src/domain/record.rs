// Raw HR/payroll rows as returned by a data source
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tables the analytics engine reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Employees,
    PayrollCalculations,
    Terminations,
    Absences,
    Timesheets,
}

impl Dataset {
    pub fn table(&self) -> &'static str {
        match self {
            Dataset::Employees => "employees",
            Dataset::PayrollCalculations => "payroll_calculations",
            Dataset::Terminations => "terminations",
            Dataset::Absences => "absences",
            Dataset::Timesheets => "timesheets",
        }
    }

    /// Column holding the row's reference date.
    pub fn date_column(&self) -> &'static str {
        match self {
            Dataset::Employees => "admission_date",
            Dataset::PayrollCalculations => "created_at",
            Dataset::Terminations => "termination_date",
            Dataset::Absences => "start_date",
            Dataset::Timesheets => "work_date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub dataset: Dataset,
    pub company_id: String,
    pub occurred_on: NaiveDate,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub cost_center_id: Option<String>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default)]
    pub measures: BTreeMap<String, f64>,
}

impl DataRow {
    pub fn new(dataset: Dataset, company_id: impl Into<String>, occurred_on: NaiveDate) -> Self {
        Self {
            dataset,
            company_id: company_id.into(),
            occurred_on,
            department_id: None,
            cost_center_id: None,
            dimensions: BTreeMap::new(),
            measures: BTreeMap::new(),
        }
    }

    pub fn department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn cost_center(mut self, cost_center_id: impl Into<String>) -> Self {
        self.cost_center_id = Some(cost_center_id.into());
        self
    }

    pub fn dimension(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(field.into(), value.into());
        self
    }

    pub fn measure(mut self, field: impl Into<String>, value: f64) -> Self {
        self.measures.insert(field.into(), value);
        self
    }

    /// Discrete field lookup; the scope columns are addressable by name too.
    pub fn dimension_value(&self, field: &str) -> Option<&str> {
        match field {
            "department_id" => self.department_id.as_deref(),
            "cost_center_id" => self.cost_center_id.as_deref(),
            _ => self.dimensions.get(field).map(String::as_str),
        }
    }

    /// Missing measures read as zero, matching how payroll totals are summed.
    pub fn measure_value(&self, field: &str) -> f64 {
        self.measures.get(field).copied().unwrap_or(0.0)
    }
}
