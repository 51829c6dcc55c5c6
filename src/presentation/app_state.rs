// Application state for HTTP handlers
use crate::application::alert_service::AlertService;
use crate::application::chart_builder::ChartBuilder;
use crate::application::dashboard_service::DashboardService;
use crate::application::kpi_engine::KpiEngine;
use crate::application::report_generator::ReportGenerator;

#[derive(Clone)]
pub struct AppState {
    pub kpi_engine: KpiEngine,
    pub chart_builder: ChartBuilder,
    pub dashboard_service: DashboardService,
    pub alert_service: AlertService,
    pub report_generator: ReportGenerator,
}
