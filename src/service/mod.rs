use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::conf::{PoolConfig, RawConfig};
use crate::core::{GatewayError, PLUGIN_NAME};
use crate::driver::Driver;
use crate::pool::{Pool, open_pool};
use crate::query::{QueryResultWithTypes, execute, validate};

/// The validated-query pipeline over one shared pool.
pub struct QueryService {
    pool: Arc<Pool>,
    query_timeout: Duration,
}

impl QueryService {
    /// Resolves the backend config, opens the pool and probes it once.
    pub async fn open(
        driver: Arc<dyn Driver>,
        raw: &RawConfig,
        ping_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let config = PoolConfig::from_raw(raw)?;
        let pool = open_pool(driver, &config, ping_timeout).await?;
        info!("{PLUGIN_NAME}: connection initialized successfully");
        Ok(Self::new(pool, config.query_timeout))
    }

    pub fn new(pool: Arc<Pool>, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Validates and runs a normalized query.
    pub async fn run(
        &self,
        query: &str,
        timestamp: &str,
    ) -> Result<QueryResultWithTypes, GatewayError> {
        validate(query)?;
        execute(&self.pool, query, timestamp, self.query_timeout).await
    }

    pub fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::core::ValidationError;
    use crate::driver::SqlValue;
    use crate::testutil::{MemoryDriver, MemoryResult};

    fn raw() -> RawConfig {
        match json!({
            "server": "memory",
            "port": 10800.0,
            "username": "gate",
            "password": "secret",
            "table": "ORG",
            "tls": "no",
            "tls-insecure": "no",
            "timeout": 2500,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_open_and_run() {
        let driver = MemoryDriver::new().with_result(
            "SELECT ID FROM ORG",
            MemoryResult::new(&[("ID", "INTEGER")]).row(vec![SqlValue::Int(1)]),
        );
        let service = QueryService::open(Arc::new(driver.clone()), &raw(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(service.query_timeout(), Duration::from_millis(2500));

        let res = service.run("SELECT ID FROM ORG", "ts").await.unwrap();
        assert_eq!(res.result.count, 1);
    }

    #[tokio::test]
    async fn test_rejected_query_never_reaches_backend() {
        let driver = MemoryDriver::new();
        let service = QueryService::open(Arc::new(driver.clone()), &raw(), Duration::from_secs(5))
            .await
            .unwrap();

        let err = service.run("DELETE FROM ORG", "ts").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Validation(ValidationError::UnsupportedStatement("Delete".into()))
        );
        assert_eq!(driver.queries(), 0);
    }

    #[tokio::test]
    async fn test_open_reports_config_error() {
        let mut raw = raw();
        raw.remove("table");
        let err = QueryService::open(Arc::new(MemoryDriver::new()), &raw, Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            GatewayError::ConfigError(format!("table not found in {PLUGIN_NAME} config"))
        );
    }

    #[tokio::test]
    async fn test_closed_service_refuses_queries() {
        let driver = MemoryDriver::new()
            .with_result("SELECT 1", MemoryResult::new(&[("1", "INTEGER")]));
        let service = QueryService::open(Arc::new(driver), &raw(), Duration::from_secs(5))
            .await
            .unwrap();
        service.close();

        let err = service.run("SELECT 1", "ts").await.unwrap_err();
        assert_eq!(err, GatewayError::ConnectionError("pool is closed".into()));
    }
}
