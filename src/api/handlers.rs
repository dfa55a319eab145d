use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use log::info;

use crate::core::{GatewayError, PLUGIN_NAME};
use crate::query::{QueryRequest, normalize_query};

use super::GatewayState;
use super::error::ApiError;

const NOT_READY: &str = "Backend is not ready";
const POST_ONLY: &str = "Only POST method is supported";

pub async fn query(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Stamped once so the response and the log lines agree.
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);

    let service = match &*state {
        GatewayState::Ready(service) => service,
        GatewayState::NotReady(_) => {
            return Ok((StatusCode::INTERNAL_SERVER_ERROR, NOT_READY).into_response());
        }
    };
    if method != Method::POST {
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, POST_ONLY).into_response());
    }

    let request: QueryRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::new("", &timestamp, GatewayError::from(e)))?;
    let query = normalize_query(&request.query);

    let result = service
        .run(&query, &timestamp)
        .await
        .map_err(|e| ApiError::new(&query, &timestamp, e))?;

    info!("{PLUGIN_NAME}: request: \"{query}\" at {timestamp}");
    if request.get_types {
        Ok(Json(result).into_response())
    } else {
        Ok(Json(result.result).into_response())
    }
}

pub async fn health(State(state): State<Arc<GatewayState>>) -> Response {
    match &*state {
        GatewayState::Ready(_) => (StatusCode::OK, "OK").into_response(),
        GatewayState::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, NOT_READY).into_response(),
    }
}
