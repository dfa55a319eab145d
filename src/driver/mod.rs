//! The backend capability the gateway runs queries against.
//!
//! A [`Driver`] turns a [`ConnectTarget`] into [`Connection`]s; connections
//! answer pings and produce [`Rows`] cursors. Pooling, deadlines and result
//! shaping live above this layer.

mod sqlite;
mod target;
mod value;

use async_trait::async_trait;
use thiserror::Error;

pub use sqlite::SqliteDriver;
pub use target::{ConnectTarget, PAGE_SIZE, PROTOCOL_VERSION};
pub use value::SqlValue;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct DriverError(pub String);

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        DriverError(err.to_string())
    }
}

/// Name and backend-declared type of a result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    pub name: String,
    pub database_type_name: String,
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Connection>, DriverError>;
}

#[async_trait]
pub trait Connection: Send {
    async fn ping(&mut self) -> Result<(), DriverError>;

    async fn query(&mut self, sql: &str) -> Result<Box<dyn Rows>, DriverError>;
}

/// A forward-only cursor over a result set.
#[async_trait]
pub trait Rows: Send {
    fn columns(&self) -> &[String];

    /// Declared column types. Drivers may only know them once a row has
    /// been read.
    fn column_types(&self) -> Result<Vec<ColumnType>, DriverError>;

    async fn next(&mut self) -> Result<Option<Vec<SqlValue>>, DriverError>;

    /// Releases the cursor. Further calls to `next` return `None`.
    async fn close(&mut self);
}
