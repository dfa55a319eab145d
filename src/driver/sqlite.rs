//! SQLite backend. The target's `server` is the database path; network,
//! credential and TLS settings do not apply and are ignored.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{InterruptHandle, OpenFlags};

use super::{ColumnType, ConnectTarget, Connection, Driver, DriverError, Rows, SqlValue};

const BUSY_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Default, Clone)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, DriverError> {
        let path = target.server.clone();
        let table = target.table.clone();
        debug!("opening sqlite database {path} read-only");
        let conn = tokio::task::spawn_blocking(move || {
            let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            let conn = rusqlite::Connection::open_with_flags(&path, flags)?;
            conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
            conn.pragma_update(None, "query_only", 1)?;
            Ok::<_, DriverError>(conn)
        })
        .await
        .map_err(|e| DriverError(format!("sqlite open task failed: {e}")))??;

        let interrupt = conn.get_interrupt_handle();
        Ok(Box::new(SqliteConnection {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            table,
        }))
    }
}

pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    interrupt: InterruptHandle,
    table: String,
}

/// Interrupts the running statement unless disarmed. Dropping a query future
/// mid-flight (deadline, client gone) stops the blocking work promptly.
struct InterruptOnDrop<'a>(Option<&'a InterruptHandle>);

impl InterruptOnDrop<'_> {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.0 {
            handle.interrupt();
        }
    }
}

fn lock(conn: &Mutex<rusqlite::Connection>) -> Result<MutexGuard<'_, rusqlite::Connection>, DriverError> {
    conn.lock()
        .map_err(|_| DriverError("sqlite connection lock poisoned".into()))
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn ping(&mut self) -> Result<(), DriverError> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let found: i64 = conn.query_row(
                "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
                [&table],
                |row| row.get(0),
            )?;
            if found == 0 {
                return Err(DriverError(format!("table {table} does not exist")));
            }
            Ok(())
        })
        .await
        .map_err(|e| DriverError(format!("sqlite ping task failed: {e}")))?
    }

    async fn query(&mut self, sql: &str) -> Result<Box<dyn Rows>, DriverError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let mut guard = InterruptOnDrop(Some(&self.interrupt));
        let rows = tokio::task::spawn_blocking(move || run_query(&conn, &sql))
            .await
            .map_err(|e| DriverError(format!("sqlite query task failed: {e}")))??;
        guard.disarm();
        Ok(Box::new(rows))
    }
}

fn run_query(conn: &Mutex<rusqlite::Connection>, sql: &str) -> Result<SqliteRows, DriverError> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let declared: Vec<Option<String>> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().map(str::to_string))
        .collect();

    let mut rows = stmt.query([])?;
    let mut buffered = VecDeque::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_ref(row.get_ref(i)?));
        }
        buffered.push_back(values);
    }

    Ok(SqliteRows {
        columns,
        declared,
        rows: buffered,
        first_kinds: None,
    })
}

fn from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Bytes(b.to_vec()),
    }
}

/// Result set buffered by the blocking task.
pub struct SqliteRows {
    columns: Vec<String>,
    declared: Vec<Option<String>>,
    rows: VecDeque<Vec<SqlValue>>,
    /// Storage classes of the first row, for columns without a declared type.
    first_kinds: Option<Vec<&'static str>>,
}

#[async_trait]
impl Rows for SqliteRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn column_types(&self) -> Result<Vec<ColumnType>, DriverError> {
        Ok(self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let database_type_name = match &self.declared[i] {
                    Some(decl) if !decl.is_empty() => decl.to_uppercase(),
                    _ => self
                        .first_kinds
                        .as_ref()
                        .and_then(|kinds| kinds.get(i).copied())
                        .unwrap_or("NULL")
                        .to_string(),
                };
                ColumnType {
                    name: name.clone(),
                    database_type_name,
                }
            })
            .collect())
    }

    async fn next(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError> {
        let row = self.rows.pop_front();
        if self.first_kinds.is_none() {
            if let Some(values) = &row {
                self.first_kinds = Some(values.iter().map(SqlValue::kind_name).collect());
            }
        }
        Ok(row)
    }

    async fn close(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sqlite_fixture;

    fn target(path: &str, table: &str) -> ConnectTarget {
        ConnectTarget {
            server: path.to_string(),
            port: 0,
            table: table.to_string(),
            username: String::new(),
            password: String::new(),
            tls: false,
            tls_insecure_skip_verify: false,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_ping_checks_table() {
        let (_dir, path) = sqlite_fixture();
        let driver = SqliteDriver::new();

        let mut conn = driver.connect(&target(&path, "ORG")).await.unwrap();
        conn.ping().await.unwrap();

        let mut conn = driver.connect(&target(&path, "MISSING")).await.unwrap();
        let err = conn.ping().await.unwrap_err();
        assert_eq!(err.0, "table MISSING does not exist");
    }

    #[tokio::test]
    async fn test_connect_missing_file_fails() {
        let driver = SqliteDriver::new();
        let result = driver
            .connect(&target("/nonexistent/dir/db.sqlite", "ORG"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_query_rows_and_types() {
        let (_dir, path) = sqlite_fixture();
        let driver = SqliteDriver::new();
        let mut conn = driver.connect(&target(&path, "ORG")).await.unwrap();

        let mut rows = conn
            .query("SELECT ID, NAME, LOGO, 1 + 1 AS TWO FROM ORG ORDER BY ID")
            .await
            .unwrap();
        assert_eq!(rows.columns(), ["ID", "NAME", "LOGO", "TWO"]);

        let first = rows.next().await.unwrap().unwrap();
        assert_eq!(first[0], SqlValue::Int(1));
        assert_eq!(first[1], SqlValue::Text("Acme".into()));
        assert_eq!(first[2], SqlValue::Bytes(b"acme.png".to_vec()));

        let types: Vec<String> = rows
            .column_types()
            .unwrap()
            .into_iter()
            .map(|c| c.database_type_name)
            .collect();
        assert_eq!(types, ["INTEGER", "VARCHAR", "BLOB", "INTEGER"]);

        assert!(rows.next().await.unwrap().is_some());
        assert!(rows.next().await.unwrap().is_none());
        rows.close().await;
    }

    #[tokio::test]
    async fn test_connection_is_read_only() {
        let (_dir, path) = sqlite_fixture();
        let driver = SqliteDriver::new();
        let mut conn = driver.connect(&target(&path, "ORG")).await.unwrap();
        let result = conn.query("DELETE FROM ORG").await;
        assert!(result.is_err());
    }
}
