// HTTP request handlers
use crate::domain::alert::{AlertEvent, AlertRule, DashboardAlert};
use crate::domain::chart::{ChartData, ChartDefinition};
use crate::domain::dashboard::{DashboardConfig, UserPreferences};
use crate::domain::error::AnalyticsError;
use crate::domain::filters::AnalyticsFilters;
use crate::domain::kpi::KpiData;
use crate::domain::report::{HistoryFilter, JobId, ReportGenerationOptions, ReportHistory, ReportTemplate};
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use crate::presentation::extractors::Caller;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::Utc;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct SubmittedReport {
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    pub company_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SeriesRequest {
    pub definition: ChartDefinition,
    pub filters: AnalyticsFilters,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub company_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub kpis: usize,
    pub charts: usize,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_kpis(
    State(state): State<Arc<AppState>>,
    Query(filters): Query<AnalyticsFilters>,
) -> ApiResult<Json<Vec<KpiData>>> {
    Ok(Json(state.kpi_engine.compute_kpis(&filters).await?))
}

pub async fn get_chart(
    State(state): State<Arc<AppState>>,
    Path(chart_id): Path<String>,
    Query(filters): Query<AnalyticsFilters>,
) -> ApiResult<Json<ChartData>> {
    Ok(Json(state.chart_builder.build_chart(&chart_id, &filters).await?))
}

/// Ad-hoc series for an unregistered chart definition.
pub async fn build_series(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SeriesRequest>,
) -> ApiResult<Json<ChartData>> {
    Ok(Json(
        state
            .chart_builder
            .build_series(&request.filters, &request.definition)
            .await?,
    ))
}

/// KPIs over the owner's preferred default window, ending today.
pub async fn get_owner_kpis(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    Query(query): Query<CompanyQuery>,
) -> ApiResult<Json<Vec<KpiData>>> {
    let preferences = state.dashboard_service.get_preferences(&owner_id).await?;
    let filters = preferences.default_filters(&query.company_id, Utc::now().date_naive());
    Ok(Json(state.kpi_engine.compute_kpis(&filters).await?))
}

/// The owner's active dashboard.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<DashboardConfig>> {
    Ok(Json(state.dashboard_service.get_config(&owner_id).await?))
}

pub async fn list_dashboards(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<Vec<DashboardConfig>>> {
    Ok(Json(state.dashboard_service.list_configs(&caller.0, &owner_id).await?))
}

pub async fn get_dashboard_config(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((owner_id, dashboard_id)): Path<(String, String)>,
) -> ApiResult<Json<DashboardConfig>> {
    Ok(Json(
        state
            .dashboard_service
            .get_config_by_id(&caller.0, &owner_id, &dashboard_id)
            .await?,
    ))
}

pub async fn put_dashboard(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((owner_id, dashboard_id)): Path<(String, String)>,
    Json(mut config): Json<DashboardConfig>,
) -> ApiResult<Json<DashboardConfig>> {
    config.owner_id = owner_id;
    config.id = dashboard_id;
    Ok(Json(state.dashboard_service.save_config(&caller.0, config).await?))
}

/// Returns the dashboard the owner lands on afterwards.
pub async fn delete_dashboard(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((owner_id, dashboard_id)): Path<(String, String)>,
) -> ApiResult<Json<DashboardConfig>> {
    Ok(Json(
        state
            .dashboard_service
            .delete_config(&caller.0, &owner_id, &dashboard_id)
            .await?,
    ))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<UserPreferences>> {
    Ok(Json(state.dashboard_service.get_preferences(&owner_id).await?))
}

pub async fn put_preferences(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(owner_id): Path<String>,
    Json(mut preferences): Json<UserPreferences>,
) -> ApiResult<Json<UserPreferences>> {
    preferences.owner_id = owner_id;
    Ok(Json(
        state
            .dashboard_service
            .save_preferences(&caller.0, preferences)
            .await?,
    ))
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Json<Vec<DashboardAlert>> {
    Json(state.alert_service.list_alerts(&owner_id).await)
}

pub async fn put_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(owner_id): Path<String>,
    Json(rule): Json<AlertRule>,
) -> ApiResult<Json<DashboardAlert>> {
    ensure_owner(&caller, &owner_id)?;
    Ok(Json(state.alert_service.upsert_alert(&owner_id, rule).await?))
}

pub async fn delete_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((owner_id, alert_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    ensure_owner(&caller, &owner_id)?;
    state.alert_service.remove_alert(&owner_id, &alert_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((owner_id, alert_id)): Path<(String, String)>,
) -> ApiResult<Json<DashboardAlert>> {
    ensure_owner(&caller, &owner_id)?;
    Ok(Json(state.alert_service.acknowledge(&owner_id, &alert_id).await?))
}

/// Compute the KPIs for `filters` and run every rule of the owner against them.
pub async fn evaluate_alerts(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(owner_id): Path<String>,
    Json(filters): Json<AnalyticsFilters>,
) -> ApiResult<Json<Vec<AlertEvent>>> {
    ensure_owner(&caller, &owner_id)?;
    let kpis = state.kpi_engine.compute_kpis(&filters).await?;
    Ok(Json(state.alert_service.evaluate_all(&owner_id, &kpis).await))
}

/// Alert transitions of one owner as server-sent events.
pub async fn alert_events(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.alert_service.subscribe()).filter_map(move |event| {
        // Lagged receivers skip what they missed
        let event = event.ok().filter(|e| e.owner_id == owner_id)?;
        Event::default().event("alert").json_data(&event).ok().map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn list_templates(State(state): State<Arc<AppState>>) -> Json<Vec<ReportTemplate>> {
    Json(state.report_generator.templates().list().await)
}

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Json(options): Json<ReportGenerationOptions>,
) -> ApiResult<(StatusCode, Json<SubmittedReport>)> {
    let job_id = state.report_generator.submit(options).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmittedReport { job_id })))
}

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<HistoryFilter>,
) -> Json<Vec<ReportHistory>> {
    Json(state.report_generator.list(&filter).await)
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<JobId>,
) -> ApiResult<Json<ReportHistory>> {
    Ok(Json(state.report_generator.status(job_id).await?))
}

pub async fn cancel_report(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<JobId>,
) -> ApiResult<Json<ReportHistory>> {
    Ok(Json(state.report_generator.cancel(job_id).await?))
}

pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<JobId>,
) -> ApiResult<impl IntoResponse> {
    let artifact = state.report_generator.download(job_id).await?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    ))
}

/// Job status changes as server-sent events.
pub async fn report_events(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receiver = state.report_generator.subscribe();
    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => match Event::default().event("job").json_data(&event) {
                    Ok(sse) => yield Ok::<_, Infallible>(sse),
                    Err(e) => tracing::warn!("Could not encode job event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Report event subscriber lagged by {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Eager invalidation after a company's data changed.
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InvalidateRequest>,
) -> Json<InvalidateResponse> {
    let company_id = request.company_id.trim();
    let (kpis, charts) = tokio::join!(
        state.kpi_engine.invalidate_company(company_id),
        state.chart_builder.invalidate_company(company_id),
    );
    tracing::info!("Invalidated {} KPI and {} chart entries for {}", kpis, charts, company_id);
    Json(InvalidateResponse { kpis, charts })
}

fn ensure_owner(caller: &Caller, owner_id: &str) -> Result<(), ApiError> {
    if caller.0 != owner_id {
        return Err(AnalyticsError::Forbidden(format!("{} cannot manage alerts of {}", caller.0, owner_id)).into());
    }
    Ok(())
}
