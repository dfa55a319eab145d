use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::core::{GatewayError, PLUGIN_NAME};
use crate::query::QueryResult;

/// A failed request, rendered as the error envelope.
#[derive(Debug)]
pub struct ApiError {
    pub query: String,
    pub timestamp: String,
    pub error: GatewayError,
}

impl ApiError {
    pub fn new(query: &str, timestamp: &str, error: GatewayError) -> Self {
        Self {
            query: query.to_string(),
            timestamp: timestamp.to_string(),
            error,
        }
    }

    /// Every failure maps to 500; callers tell causes apart by `message`.
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(
            "{PLUGIN_NAME}: request: \"{}\" at {}: {}",
            self.query, self.timestamp, self.error
        );
        let body = QueryResult::failure(&self.error, &self.timestamp);
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    #[test]
    fn test_new_keeps_request_context() {
        let err = ApiError::new("SELECT 1", "ts", GatewayError::QueryError("boom".into()));
        assert_eq!(err.query, "SELECT 1");
        assert_eq!(err.timestamp, "ts");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_into_response_renders_failure_envelope() {
        let err = ApiError::new("SELECT 1", "ts", GatewayError::QueryError("boom".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "boom");
        assert_eq!(json["querytimestamp"], "ts");
    }
}
