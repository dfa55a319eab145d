//! Test utilities.
//!
//! This module is only available when the `testutil` feature is enabled.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::driver::{ColumnType, ConnectTarget, Connection, Driver, DriverError, Rows, SqlValue};

/// A canned result set served by [`MemoryDriver`].
#[derive(Debug, Clone, Default)]
pub struct MemoryResult {
    columns: Vec<ColumnType>,
    rows: Vec<Vec<SqlValue>>,
    fail_at: Option<(usize, String)>,
}

impl MemoryResult {
    /// Columns as `(name, declared type)` pairs.
    pub fn new(columns: &[(&str, &str)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, ty)| ColumnType {
                    name: name.to_string(),
                    database_type_name: ty.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Makes reading row `index` (0-based) fail.
    pub fn fail_at(mut self, index: usize, message: &str) -> Self {
        self.fail_at = Some((index, message.to_string()));
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    queries: AtomicUsize,
    open_cursors: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// In-memory driver answering queries from a table of canned results.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    results: Arc<Mutex<HashMap<String, MemoryResult>>>,
    counters: Arc<Counters>,
    connect_failure: Option<String>,
    ping_failure: Option<String>,
    latency: Option<Duration>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A target with throwaway values, for building pools directly.
    pub fn target() -> ConnectTarget {
        ConnectTarget {
            server: "memory".into(),
            port: 10800,
            table: "ORG".into(),
            username: "test".into(),
            password: "test".into(),
            tls: false,
            tls_insecure_skip_verify: false,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_result(self, query: &str, result: MemoryResult) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(query.to_string(), result);
        self
    }

    pub fn with_connect_failure(mut self, message: &str) -> Self {
        self.connect_failure = Some(message.to_string());
        self
    }

    pub fn with_ping_failure(mut self, message: &str) -> Self {
        self.ping_failure = Some(message.to_string());
        self
    }

    /// Delays every ping and query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.counters.queries.load(Ordering::SeqCst)
    }

    pub fn open_cursors(&self) -> usize {
        self.counters.open_cursors.load(Ordering::SeqCst)
    }

    /// Highest number of queries observed running at once.
    pub fn max_running(&self) -> usize {
        self.counters.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn connect(&self, _target: &ConnectTarget) -> Result<Box<dyn Connection>, DriverError> {
        if let Some(message) = &self.connect_failure {
            return Err(DriverError(message.clone()));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            driver: self.clone(),
        }))
    }
}

struct MemoryConnection {
    driver: MemoryDriver,
}

struct Running<'a>(&'a Counters);

impl<'a> Running<'a> {
    fn start(counters: &'a Counters) -> Self {
        let now = counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_running.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn ping(&mut self) -> Result<(), DriverError> {
        if let Some(latency) = self.driver.latency {
            tokio::time::sleep(latency).await;
        }
        match &self.driver.ping_failure {
            Some(message) => Err(DriverError(message.clone())),
            None => Ok(()),
        }
    }

    async fn query(&mut self, sql: &str) -> Result<Box<dyn Rows>, DriverError> {
        let counters = &self.driver.counters;
        counters.queries.fetch_add(1, Ordering::SeqCst);
        let _running = Running::start(counters);
        if let Some(latency) = self.driver.latency {
            tokio::time::sleep(latency).await;
        }
        let result = self
            .driver
            .results
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .ok_or_else(|| DriverError(format!("no result registered for {sql}")))?;
        counters.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryRows {
            names: result.columns.iter().map(|c| c.name.clone()).collect(),
            columns: result.columns,
            rows: result.rows.into(),
            fail_at: result.fail_at,
            read: 0,
            counters: Arc::clone(counters),
            closed: false,
        }))
    }
}

struct MemoryRows {
    names: Vec<String>,
    columns: Vec<ColumnType>,
    rows: VecDeque<Vec<SqlValue>>,
    fail_at: Option<(usize, String)>,
    read: usize,
    counters: Arc<Counters>,
    closed: bool,
}

#[async_trait]
impl Rows for MemoryRows {
    fn columns(&self) -> &[String] {
        &self.names
    }

    fn column_types(&self) -> Result<Vec<ColumnType>, DriverError> {
        Ok(self.columns.clone())
    }

    async fn next(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError> {
        if self.closed {
            return Ok(None);
        }
        if let Some((index, message)) = &self.fail_at {
            if *index == self.read {
                return Err(DriverError(message.clone()));
            }
        }
        self.read += 1;
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Creates a SQLite database with an `ORG` table holding two rows.
/// Returns the directory guard and the database path.
pub fn sqlite_fixture() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE ORG (ID INTEGER PRIMARY KEY, NAME VARCHAR, LOGO BLOB);
         INSERT INTO ORG VALUES (1, 'Acme', X'61636D652E706E67');
         INSERT INTO ORG VALUES (2, 'Globex', NULL);",
    )
    .unwrap();
    (dir, path.to_string_lossy().into_owned())
}
