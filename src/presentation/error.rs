// HTTP mapping of analytics errors
use crate::domain::error::AnalyticsError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub struct ApiError(pub AnalyticsError);

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AnalyticsError::InvalidFilter(_)
            | AnalyticsError::UnknownProducer(_)
            | AnalyticsError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            AnalyticsError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AnalyticsError::Forbidden(_) => StatusCode::FORBIDDEN,
            AnalyticsError::NotFound(_) => StatusCode::NOT_FOUND,
            AnalyticsError::DuplicateWidget(_) | AnalyticsError::ImmutableRecord(_) => StatusCode::CONFLICT,
            AnalyticsError::RenderError { .. } | AnalyticsError::ArtifactStoreError(_) => StatusCode::BAD_GATEWAY,
            AnalyticsError::DataSourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalyticsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = serde_json::json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_transient(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AnalyticsError::InvalidFilter("x".into()), StatusCode::BAD_REQUEST),
            (AnalyticsError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AnalyticsError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AnalyticsError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AnalyticsError::DuplicateWidget("w".into()), StatusCode::CONFLICT),
            (AnalyticsError::ImmutableRecord("j".into()), StatusCode::CONFLICT),
            (AnalyticsError::DataSourceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AnalyticsError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_response_carries_status() {
        let response = ApiError(AnalyticsError::NotFound("report 1".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
