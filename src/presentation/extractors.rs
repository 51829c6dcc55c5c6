// Request extractors
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub const CALLER_HEADER: &str = "x-user-id";

/// Authenticated user id, set by the gateway in front of this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

#[derive(Debug)]
pub struct CallerRejection(String);

impl IntoResponse for CallerRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.0 });
        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = CallerRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| CallerRejection(format!("missing {} header", CALLER_HEADER)))?
            .to_str()
            .map_err(|_| CallerRejection(format!("invalid {} header value", CALLER_HEADER)))?
            .trim();

        if value.is_empty() {
            return Err(CallerRejection(format!("empty {} header", CALLER_HEADER)));
        }
        Ok(Caller(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<Caller, CallerRejection> {
        let mut builder = Request::builder().uri("/dashboards/u1");
        if let Some(value) = header {
            builder = builder.header(CALLER_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_caller_from_header() {
        assert_eq!(extract(Some(" u1 ")).await.unwrap(), Caller("u1".into()));
    }

    #[tokio::test]
    async fn test_missing_or_blank_caller_rejected() {
        assert!(extract(None).await.is_err());
        assert!(extract(Some("  ")).await.is_err());
    }
}
