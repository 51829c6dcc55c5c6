// Error taxonomy shared by every analytics component
use std::any::Any;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyticsError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("render error{}: {message}", in_section(.section))]
    RenderError {
        section: Option<String>,
        message: String,
    },

    #[error("artifact store error: {0}")]
    ArtifactStoreError(String),

    #[error("duplicate widget id: {0}")]
    DuplicateWidget(String),

    #[error("record {0} is in a terminal status and cannot be changed")]
    ImmutableRecord(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown producer: {0}")]
    UnknownProducer(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalyticsError {
    /// Transient failures the caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyticsError::DataSourceUnavailable(_))
    }

    /// Error for a computation that panicked, keeping the panic message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown cause");
        AnalyticsError::Internal(format!("panicked: {}", message))
    }
}

fn in_section(section: &Option<String>) -> String {
    section
        .as_deref()
        .map(|id| format!(" in section '{}'", id))
        .unwrap_or_default()
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
