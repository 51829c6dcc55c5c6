// Shared sample data for application tests
use crate::domain::filters::AnalyticsFilters;
use crate::domain::record::{DataRow, Dataset};
use crate::infrastructure::memory_data_source::InMemoryDataSource;
use chrono::NaiveDate;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn january() -> AnalyticsFilters {
    AnalyticsFilters::new(date(2024, 1, 1), date(2024, 1, 31), "acme")
}

fn employee(on: NaiveDate, department: &str, status: &str) -> DataRow {
    DataRow::new(Dataset::Employees, "acme", on)
        .department(department)
        .dimension("status", status)
}

fn payroll(on: NaiveDate, department: &str, status: &str, gross: f64, net: f64) -> DataRow {
    DataRow::new(Dataset::PayrollCalculations, "acme", on)
        .department(department)
        .dimension("status", status)
        .measure("gross_salary", gross)
        .measure("net_salary", net)
        .measure("total_earnings", gross + 300.0)
        .measure("total_deductions", gross - net + 300.0)
}

/// Company "acme" with data from December 2023 onwards, plus a row of
/// another company that must never leak into acme's figures.
pub fn sample_rows() -> Vec<DataRow> {
    vec![
        employee(date(2023, 6, 1), "eng", "active"),
        employee(date(2023, 9, 1), "eng", "active"),
        employee(date(2023, 12, 10), "ops", "active"),
        employee(date(2024, 1, 15), "sales", "active"),
        employee(date(2023, 1, 1), "ops", "inactive"),
        DataRow::new(Dataset::Employees, "globex", date(2023, 1, 1)).dimension("status", "active"),
        payroll(date(2023, 12, 5), "eng", "completed", 1200.0, 1000.0),
        payroll(date(2023, 12, 20), "ops", "completed", 1200.0, 1000.0),
        payroll(date(2024, 1, 5), "eng", "completed", 2000.0, 1500.0),
        payroll(date(2024, 1, 20), "ops", "pending", 2200.0, 1500.0),
        DataRow::new(Dataset::PayrollCalculations, "globex", date(2024, 1, 5)).measure("net_salary", 99999.0),
        DataRow::new(Dataset::Terminations, "acme", date(2024, 1, 25)).department("ops"),
        DataRow::new(Dataset::Absences, "acme", date(2024, 1, 10)).measure("hours", 8.0),
        DataRow::new(Dataset::Timesheets, "acme", date(2023, 12, 31)).measure("scheduled_hours", 160.0),
        DataRow::new(Dataset::Timesheets, "acme", date(2024, 1, 31)).measure("scheduled_hours", 160.0),
    ]
}

pub fn sample_source() -> InMemoryDataSource {
    InMemoryDataSource::new(sample_rows())
}
