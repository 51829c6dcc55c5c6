// Report generator - queued jobs executed by a bounded worker pool
use crate::application::chart_builder::ChartBuilder;
use crate::application::data_source::{ArtifactStore, TemplateRenderer};
use crate::application::kpi_engine::KpiEngine;
use crate::application::report_history::ReportHistoryStore;
use crate::application::template_registry::TemplateRegistry;
use crate::domain::error::{AnalyticsError, AnalyticsResult};
use crate::domain::filters::AnalyticsFilters;
use crate::domain::report::{
    Artifact, HistoryFilter, IdempotencyKey, JobEvent, JobId, ReportGenerationOptions,
    ReportHistory, ReportSection, ReportStatus, ReportTemplate, ResolvedSection, SectionContent,
    SectionProducer, StatusDelta,
};
use chrono::Utc;
use futures::future::try_join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub workers: usize,
    /// How long a stored artifact stays downloadable.
    pub retention: chrono::Duration,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            retention: chrono::Duration::days(30),
        }
    }
}

/// Handle to the job pipeline. Cloning shares the same queue and workers;
/// the workers stop once every handle is dropped.
#[derive(Clone)]
pub struct ReportGenerator {
    runner: Arc<JobRunner>,
    queue: mpsc::UnboundedSender<JobId>,
}

struct JobRunner {
    kpis: KpiEngine,
    charts: ChartBuilder,
    templates: TemplateRegistry,
    renderer: Arc<dyn TemplateRenderer>,
    artifacts: Arc<dyn ArtifactStore>,
    history: ReportHistoryStore,
    retention: chrono::Duration,
    /// Non-terminal jobs by idempotency key.
    active: Mutex<HashMap<IdempotencyKey, JobId>>,
    cancellations: Mutex<HashMap<JobId, Arc<CancelFlag>>>,
    events: broadcast::Sender<JobEvent>,
}

/// Cancellation request for one job. Workers poll it between sections;
/// a job waiting for its `run_at` is woken by it.
#[derive(Default)]
struct CancelFlag {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // Stores a permit when nobody waits yet
        self.notify.notify_one();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

enum Outcome {
    Rendered(Artifact),
    Cancelled,
    Failed(String),
}

impl ReportGenerator {
    /// Spawns `settings.workers` workers on the current runtime.
    pub fn start(
        kpis: KpiEngine,
        charts: ChartBuilder,
        templates: TemplateRegistry,
        renderer: Arc<dyn TemplateRenderer>,
        artifacts: Arc<dyn ArtifactStore>,
        history: ReportHistoryStore,
        settings: GeneratorSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let runner = Arc::new(JobRunner {
            kpis,
            charts,
            templates,
            renderer,
            artifacts,
            history,
            retention: settings.retention,
            active: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
            events,
        });

        let (queue, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = settings.workers.max(1);
        for worker in 0..workers {
            let runner = runner.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    // Holding the lock while waiting keeps dequeue order FIFO
                    let next = receiver.lock().await.recv().await;
                    let Some(job_id) = next else { break };
                    runner.run(job_id).await;
                }
                tracing::debug!(worker, "report worker stopped");
            });
        }
        tracing::info!("Started report generator with {} workers", workers);

        Self { runner, queue }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.runner.templates
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.runner.events.subscribe()
    }

    /// Queue a report. An equivalent job still Queued or Running is returned
    /// instead of starting a duplicate.
    pub async fn submit(&self, mut options: ReportGenerationOptions) -> AnalyticsResult<JobId> {
        options.template_id = options.template_id.trim().to_string();
        options.filters = options.filters.normalized()?;
        let template = self
            .runner
            .templates
            .get(&options.template_id)
            .await
            .ok_or_else(|| AnalyticsError::NotFound(format!("template '{}'", options.template_id)))?;
        if !template.supports(options.format) {
            return Err(AnalyticsError::UnsupportedFormat(format!(
                "template '{}' cannot produce {:?}",
                template.id, options.format
            )));
        }

        let key = options.idempotency_key()?;
        let mut active = self.runner.active.lock().await;
        if let Some(existing) = active.get(&key).copied() {
            let still_active = self
                .runner
                .history
                .get(existing)
                .await
                .is_some_and(|entry| !entry.status.is_terminal());
            if still_active {
                tracing::debug!(job = %existing, "coalesced duplicate report request");
                return Ok(existing);
            }
        }

        let run_at = options.run_at;
        let entry = ReportHistory::queued(&template, options);
        let job_id = entry.id;
        let created_at = entry.created_at;
        self.runner.history.append(entry).await?;
        active.insert(key, job_id);
        drop(active);

        let cancel = Arc::new(CancelFlag::default());
        self.runner
            .cancellations
            .lock()
            .await
            .insert(job_id, cancel.clone());
        self.runner.publish(job_id, ReportStatus::Queued, created_at, None);
        tracing::info!(job = %job_id, template = %template.id, "queued report");

        match run_at.and_then(|at| (at - Utc::now()).to_std().ok()) {
            Some(delay) if !delay.is_zero() => {
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => enqueue(&queue, job_id),
                        _ = cancel.notify.notified() => {
                            tracing::debug!(job = %job_id, "dropped cancelled scheduled report");
                        }
                    }
                });
            }
            _ => enqueue(&self.queue, job_id),
        }
        Ok(job_id)
    }

    pub async fn status(&self, job_id: JobId) -> AnalyticsResult<ReportHistory> {
        self.runner
            .history
            .get(job_id)
            .await
            .ok_or_else(|| AnalyticsError::NotFound(format!("report {}", job_id)))
    }

    /// Queued jobs are cancelled at once. Running jobs are asked to stop at
    /// the next section boundary and may still finish. Terminal jobs are
    /// returned unchanged.
    pub async fn cancel(&self, job_id: JobId) -> AnalyticsResult<ReportHistory> {
        let entry = self.status(job_id).await?;
        if entry.status.is_terminal() {
            return Ok(entry);
        }

        let flag = self.runner.cancellations.lock().await.get(&job_id).cloned();
        let cancelled = self
            .runner
            .history
            .transition(job_id, ReportStatus::Queued, StatusDelta::to(ReportStatus::Cancelled))
            .await?;
        if let Some(flag) = &flag {
            flag.request();
        }
        if cancelled {
            tracing::info!(job = %job_id, "cancelled queued report");
            let entry = self.status(job_id).await?;
            self.runner.finish(&entry).await;
            return Ok(entry);
        }

        // Already picked up by a worker
        if flag.is_some() {
            tracing::info!(job = %job_id, "requested cancellation of running report");
        }
        self.status(job_id).await
    }

    pub async fn list(&self, filter: &HistoryFilter) -> Vec<ReportHistory> {
        self.runner.history.list(filter).await
    }

    /// Stored artifact of a succeeded, unexpired job.
    pub async fn download(&self, job_id: JobId) -> AnalyticsResult<Artifact> {
        let entry = self.status(job_id).await?;
        let reference = match (&entry.status, &entry.artifact) {
            (ReportStatus::Succeeded, Some(reference)) => reference,
            _ => {
                return Err(AnalyticsError::NotFound(format!(
                    "report {} has no artifact ({:?})",
                    job_id, entry.status
                )));
            }
        };
        if entry.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(AnalyticsError::NotFound(format!("report {} has expired", job_id)));
        }
        self.runner.artifacts.fetch(reference).await
    }
}

fn enqueue(queue: &mpsc::UnboundedSender<JobId>, job_id: JobId) {
    if queue.send(job_id).is_err() {
        tracing::error!(job = %job_id, "report queue is closed");
    }
}

impl JobRunner {
    async fn run(&self, job_id: JobId) {
        match self
            .history
            .transition(job_id, ReportStatus::Queued, StatusDelta::to(ReportStatus::Running))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job = %job_id, "skipping report that is no longer queued");
                return;
            }
            Err(e) => {
                tracing::error!(job = %job_id, "cannot start report: {}", e);
                return;
            }
        }
        self.publish(job_id, ReportStatus::Running, Utc::now(), None);

        let Some(entry) = self.history.get(job_id).await else {
            return;
        };
        let cancel = self
            .cancellations
            .lock()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default();

        let work = async {
            match self.execute(&entry, &cancel).await {
                Outcome::Rendered(artifact) => self.persist(artifact).await,
                Outcome::Cancelled => StatusDelta::to(ReportStatus::Cancelled),
                Outcome::Failed(error) => StatusDelta::failed(error),
            }
        };
        // A panicking job fails alone; the worker keeps serving the queue
        let delta = AssertUnwindSafe(work)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| StatusDelta::failed(AnalyticsError::from_panic(panic).to_string()));

        match self.history.update(job_id, delta).await {
            Ok(entry) => {
                match entry.status {
                    ReportStatus::Failed => tracing::warn!(
                        job = %job_id,
                        "report failed: {}",
                        entry.error.as_deref().unwrap_or_default()
                    ),
                    status => tracing::info!(job = %job_id, "report finished as {:?}", status),
                }
                self.finish(&entry).await;
            }
            Err(e) => tracing::error!(job = %job_id, "cannot record report outcome: {}", e),
        }
    }

    async fn execute(&self, entry: &ReportHistory, cancel: &CancelFlag) -> Outcome {
        let Some(template) = self.templates.get(&entry.options.template_id).await else {
            return Outcome::Failed(format!("template '{}' is not registered", entry.options.template_id));
        };

        let mut resolved = Vec::with_capacity(template.sections.len());
        for section in &template.sections {
            if cancel.is_requested() {
                return Outcome::Cancelled;
            }
            match self.resolve(section, &entry.options.filters).await {
                Ok(content) => resolved.push(ResolvedSection {
                    id: section.id.clone(),
                    title: section.title.clone(),
                    content,
                }),
                Err(e) => return Outcome::Failed(format!("section '{}': {}", section.id, e)),
            }
        }
        // Past this point the job runs to completion
        if cancel.is_requested() {
            return Outcome::Cancelled;
        }

        match self.render(&template, &resolved, entry).await {
            Ok(artifact) => Outcome::Rendered(artifact),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    async fn resolve(&self, section: &ReportSection, filters: &AnalyticsFilters) -> AnalyticsResult<SectionContent> {
        match &section.producer {
            SectionProducer::Kpis { metrics } => {
                let computations = metrics
                    .iter()
                    .map(|metric| self.kpis.compute_metric(metric, filters));
                Ok(SectionContent::Kpis(try_join_all(computations).await?))
            }
            SectionProducer::Chart { chart_id } => {
                Ok(SectionContent::Chart(self.charts.build_chart(chart_id, filters).await?))
            }
        }
    }

    async fn render(
        &self,
        template: &ReportTemplate,
        sections: &[ResolvedSection],
        entry: &ReportHistory,
    ) -> AnalyticsResult<Artifact> {
        let mut artifact = self
            .renderer
            .render(template, sections, entry.options.format)
            .await?;
        artifact.file_name = format!("{}.{}", entry.id, entry.options.format.extension());
        Ok(artifact)
    }

    async fn persist(&self, artifact: Artifact) -> StatusDelta {
        let size = artifact.bytes.len() as u64;
        match self.artifacts.store(artifact).await {
            Ok(reference) => StatusDelta::succeeded(reference, size, self.retention),
            Err(e) => StatusDelta::failed(e.to_string()),
        }
    }

    /// Publish the terminal event and release the job's bookkeeping.
    async fn finish(&self, entry: &ReportHistory) {
        self.active.lock().await.retain(|_, id| *id != entry.id);
        self.cancellations.lock().await.remove(&entry.id);
        self.publish(
            entry.id,
            entry.status,
            entry.completed_at.unwrap_or_else(Utc::now),
            entry.error.clone(),
        );
    }

    fn publish(&self, job_id: JobId, status: ReportStatus, at: chrono::DateTime<Utc>, error: Option<String>) {
        // No subscribers is fine
        let _ = self.events.send(JobEvent {
            job_id,
            status,
            at,
            error,
        });
    }
}
