// Domain layer - analytics models and pure rules
pub mod alert;
pub mod chart;
pub mod dashboard;
pub mod error;
pub mod filters;
pub mod kpi;
pub mod metric;
pub mod record;
pub mod report;
