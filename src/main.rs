// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::alert_service::AlertService;
use crate::application::chart_builder::ChartBuilder;
use crate::application::dashboard_service::DashboardService;
use crate::application::data_source::{ArtifactStore, DataSource};
use crate::application::kpi_engine::KpiEngine;
use crate::application::registry::{ChartRegistry, MetricRegistry};
use crate::application::report_generator::{GeneratorSettings, ReportGenerator};
use crate::application::report_history::ReportHistoryStore;
use crate::application::template_registry::{builtin_templates, TemplateRegistry};
use crate::infrastructure::artifact_store::{FsArtifactStore, InMemoryArtifactStore};
use crate::infrastructure::config::{load_app_config, load_report_templates, AppConfig, DataSourceKind};
use crate::infrastructure::memory_dashboard_repository::InMemoryDashboardRepository;
use crate::infrastructure::memory_data_source::InMemoryDataSource;
use crate::infrastructure::renderer::BuiltinRenderer;
use crate::infrastructure::rest_data_source::RestDataSource;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    acknowledge_alert, alert_events, build_series, cancel_report, delete_alert, delete_dashboard, download_report,
    evaluate_alerts, get_chart, get_dashboard, get_dashboard_config, get_kpis, get_owner_kpis, get_preferences, get_report, health_check,
    invalidate_cache, list_alerts, list_dashboards, list_reports, list_templates, put_alert, put_dashboard,
    put_preferences, report_events, submit_report,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_app_config()?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create adapters (infrastructure layer)
    let source = build_data_source(&config).await?;
    let artifacts: Arc<dyn ArtifactStore> = match &config.reports.artifact_dir {
        Some(dir) => Arc::new(FsArtifactStore::new(dir).await?),
        None => Arc::new(InMemoryArtifactStore::new()),
    };
    let dashboards = Arc::new(InMemoryDashboardRepository::new());

    // Create services (application layer)
    let metrics = Arc::new(MetricRegistry::with_defaults());
    let charts = Arc::new(ChartRegistry::with_defaults());
    let kpi_engine = KpiEngine::new(source.clone(), metrics.clone(), config.cache.kpi_ttl());
    let chart_builder = ChartBuilder::new(source, charts.clone(), config.cache.chart_ttl());

    spawn_cache_sweeper(kpi_engine.clone(), chart_builder.clone(), config.cache.kpi_ttl());

    let templates = TemplateRegistry::new(metrics, charts);
    let catalogue = match &config.reports.templates_path {
        Some(path) => load_report_templates(path).await?,
        None => builtin_templates(),
    };
    for template in catalogue {
        let id = template.id.clone();
        templates
            .register(template)
            .await
            .with_context(|| format!("Invalid report template '{}'", id))?;
    }

    let dashboard_service = DashboardService::new(dashboards);
    let alert_service = AlertService::new(dashboard_service.clone());
    let report_generator = ReportGenerator::start(
        kpi_engine.clone(),
        chart_builder.clone(),
        templates,
        Arc::new(BuiltinRenderer),
        artifacts,
        ReportHistoryStore::new(),
        GeneratorSettings {
            workers: config.reports.workers,
            retention: config.reports.retention()?,
        },
    );

    // Create application state
    let state = Arc::new(AppState {
        kpi_engine,
        chart_builder,
        dashboard_service,
        alert_service,
        report_generator,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/kpis", get(get_kpis))
        .route("/charts", post(build_series))
        .route("/charts/:id", get(get_chart))
        .route("/dashboards/:owner", get(get_dashboard))
        .route("/dashboards/:owner/configs", get(list_dashboards))
        .route(
            "/dashboards/:owner/configs/:dashboard_id",
            get(get_dashboard_config).put(put_dashboard).delete(delete_dashboard),
        )
        .route("/dashboards/:owner/kpis", get(get_owner_kpis))
        .route("/preferences/:owner", get(get_preferences).put(put_preferences))
        .route("/alerts/:owner", get(list_alerts).put(put_alert))
        .route("/alerts/:owner/events", get(alert_events))
        .route("/alerts/:owner/evaluate", post(evaluate_alerts))
        .route("/alerts/:owner/:alert_id", delete(delete_alert))
        .route("/alerts/:owner/:alert_id/ack", post(acknowledge_alert))
        .route("/templates", get(list_templates))
        .route("/reports", post(submit_report).get(list_reports))
        .route("/reports/events", get(report_events))
        .route("/reports/:id", get(get_report).delete(cancel_report))
        .route("/reports/:id/artifact", get(download_report))
        .route("/cache/invalidate", post(invalidate_cache))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Starting hr-analytics service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

/// Expired cache entries are otherwise only replaced when their key is asked for again.
fn spawn_cache_sweeper(kpi_engine: KpiEngine, chart_builder: ChartBuilder, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let (kpis, charts) = tokio::join!(kpi_engine.purge_expired(), chart_builder.purge_expired());
            if kpis + charts > 0 {
                tracing::debug!("Purged {} KPI and {} chart cache entries", kpis, charts);
            }
        }
    });
}

async fn build_data_source(config: &AppConfig) -> anyhow::Result<Arc<dyn DataSource>> {
    let settings = &config.data_source;
    match settings.kind {
        DataSourceKind::Memory => {
            let source = match &settings.seed_path {
                Some(path) => InMemoryDataSource::from_json_file(path).await?,
                None => {
                    tracing::warn!("No seed rows configured; the in-memory data source is empty");
                    InMemoryDataSource::default()
                }
            };
            Ok(Arc::new(source))
        }
        DataSourceKind::Rest => {
            let base_url = settings
                .base_url
                .clone()
                .context("data_source.base_url is required for the rest data source")?;
            let api_key = settings
                .api_key
                .clone()
                .context("data_source.api_key is required for the rest data source")?;
            tracing::info!("Using REST data source at {}", base_url);
            Ok(Arc::new(RestDataSource::new(base_url, api_key, settings.schema.clone())))
        }
    }
}
