pub mod alert_service;
pub mod cache;
pub mod chart_builder;
pub mod dashboard_repository;
pub mod dashboard_service;
pub mod data_source;
pub mod kpi_engine;
pub mod registry;
pub mod report_generator;
pub mod report_history;
pub mod template_registry;

#[cfg(test)]
pub mod fixtures;
