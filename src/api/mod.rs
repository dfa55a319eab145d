mod error;
mod handlers;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{any, get};
use log::{error, info};
use tower_http::trace::TraceLayer;

use crate::conf::RawConfig;
use crate::core::{GatewayError, PLUGIN_NAME};
use crate::driver::Driver;
use crate::service::QueryService;

pub use error::ApiError;

/// What the handler serves: a live pipeline, or the reason mounting failed.
pub enum GatewayState {
    Ready(QueryService),
    NotReady(GatewayError),
}

/// The mounted query handler.
pub struct GatewayApi {
    state: Arc<GatewayState>,
}

impl GatewayApi {
    /// Builds the pipeline from the backend config. A failure is logged and
    /// leaves a handler that answers every request with "Backend is not
    /// ready"; the host keeps running.
    pub async fn mount(driver: Arc<dyn Driver>, raw: &RawConfig, ping_timeout: Duration) -> Self {
        info!("{PLUGIN_NAME}: initializing backend connection");
        match QueryService::open(driver, raw, ping_timeout).await {
            Ok(service) => Self::ready(service),
            Err(err) => {
                error!("{PLUGIN_NAME}: error initializing backend connection: {err}");
                Self::not_ready(err)
            }
        }
    }

    pub fn ready(service: QueryService) -> Self {
        Self {
            state: Arc::new(GatewayState::Ready(service)),
        }
    }

    pub fn not_ready(err: GatewayError) -> Self {
        Self {
            state: Arc::new(GatewayState::NotReady(err)),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state, GatewayState::Ready(_))
    }

    /// Why mounting failed, if it did.
    pub fn mount_error(&self) -> Option<&GatewayError> {
        match &*self.state {
            GatewayState::NotReady(err) => Some(err),
            GatewayState::Ready(_) => None,
        }
    }

    /// Routes the handler at `path`, with a readiness probe at `{path}/health`.
    pub fn router(&self, path: &str) -> Router {
        let trimmed = path.trim_matches('/');
        let (query_path, health_path) = if trimmed.is_empty() {
            ("/".to_string(), "/health".to_string())
        } else {
            (format!("/{trimmed}"), format!("/{trimmed}/health"))
        };
        Router::new()
            .route(&query_path, any(handlers::query))
            .route(&health_path, get(handlers::health))
            .with_state(self.state.clone())
    }

    /// Releases the backend pool. Called by the host on unmount.
    pub fn close(&self) {
        if let GatewayState::Ready(service) = &*self.state {
            service.close();
        }
    }

    pub async fn serve<F>(&self, addr: &str, path: &str, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::IoError(format!("binding to {addr}: {e}")))?;
        info!("{PLUGIN_NAME}: serving {path} on {addr}");
        let app = self.router(path).layer(TraceLayer::new_for_http());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::IoError(format!("serving: {e}")))?;
        Ok(())
    }
}
