// Service configuration - file plus environment overrides
use crate::domain::report::ReportTemplate;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub reports: ReportSettings,
    #[serde(default)]
    pub data_source: DataSourceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub kpi_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub chart_ttl_secs: u64,
}

impl CacheSettings {
    pub fn kpi_ttl(&self) -> Duration {
        Duration::from_secs(self.kpi_ttl_secs)
    }

    pub fn chart_ttl(&self) -> Duration {
        Duration::from_secs(self.chart_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            kpi_ttl_secs: default_ttl_secs(),
            chart_ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Artifacts are kept in memory when unset.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    /// Built-in templates are used when unset.
    #[serde(default)]
    pub templates_path: Option<PathBuf>,
}

impl ReportSettings {
    /// How long artifacts stay downloadable.
    pub fn retention(&self) -> anyhow::Result<chrono::Duration> {
        u32::try_from(self.retention_days)
            .ok()
            .and_then(|days| chrono::Duration::try_days(i64::from(days)))
            .with_context(|| format!("reports.retention_days out of range: {}", self.retention_days))
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retention_days: default_retention_days(),
            artifact_dir: None,
            templates_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    #[default]
    Memory,
    Rest,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DataSourceSettings {
    #[serde(default)]
    pub kind: DataSourceKind,
    /// JSON rows loaded into the in-memory source.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_workers() -> usize {
    4
}

fn default_retention_days() -> i64 {
    30
}

/// `config/analytics.toml` if present, then `HR_ANALYTICS__SECTION__KEY`
/// environment variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/analytics").required(false))
        .add_source(
            config::Environment::with_prefix("HR_ANALYTICS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to load configuration")?;

    Ok(settings.try_deserialize()?)
}

#[derive(Debug, Deserialize)]
struct TemplateCatalogue {
    #[serde(default)]
    templates: Vec<ReportTemplate>,
}

pub fn parse_report_templates(raw: &str) -> anyhow::Result<Vec<ReportTemplate>> {
    let catalogue: TemplateCatalogue = toml::from_str(raw).context("Failed to parse report templates")?;
    Ok(catalogue.templates)
}

pub async fn load_report_templates(path: &Path) -> anyhow::Result<Vec<ReportTemplate>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read report templates from {}", path.display()))?;
    parse_report_templates(&raw)
}
