use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::{Instant, timeout_at};

use crate::core::GatewayError::{self, QueryError};
use crate::driver::{Connection, Rows};
use crate::pool::Pool;

use super::types::{QueryResult, QueryResultWithTypes, Row};

struct Materialized {
    rows: Vec<Row>,
    datatypes: Map<String, Value>,
}

/// Runs an already validated query and shapes its result set.
///
/// Checkout and execution share one deadline. A connection that hits the
/// deadline mid-query is discarded instead of going back to the pool.
pub async fn execute(
    pool: &Arc<Pool>,
    query: &str,
    timestamp: &str,
    timeout: Duration,
) -> Result<QueryResultWithTypes, GatewayError> {
    let deadline = Instant::now() + timeout;
    let timed_out = || {
        QueryError(format!(
            "query timed out after {}ms: {query}",
            timeout.as_millis()
        ))
    };

    let mut conn = match timeout_at(deadline, pool.acquire()).await {
        Ok(conn) => conn?,
        Err(_) => return Err(timed_out()),
    };

    let outcome = timeout_at(deadline, materialize(&mut *conn, query)).await;
    match outcome {
        Ok(Ok(materialized)) => Ok(QueryResultWithTypes {
            result: QueryResult::success(materialized.rows, timestamp),
            datatypes: materialized.datatypes,
        }),
        Ok(Err(err)) => Err(err),
        Err(_) => {
            conn.discard();
            Err(timed_out())
        }
    }
}

async fn materialize(conn: &mut dyn Connection, query: &str) -> Result<Materialized, GatewayError> {
    let mut rows = conn
        .query(query)
        .await
        .map_err(|e| QueryError(format!("failed sql query {query}: {e}")))?;
    let shaped = shape(rows.as_mut()).await;
    rows.close().await;
    shaped
}

async fn shape(rows: &mut dyn Rows) -> Result<Materialized, GatewayError> {
    let columns = rows.columns().to_vec();
    let mut shaped = Vec::new();
    let mut datatypes = Map::new();

    while let Some(values) = rows
        .next()
        .await
        .map_err(|e| QueryError(format!("failed to get row: {e}")))?
    {
        // Some drivers only know column types once a row has been read.
        if shaped.is_empty() {
            let types = rows
                .column_types()
                .map_err(|e| QueryError(format!("failed to get column types: {e}")))?;
            for column in types {
                datatypes.insert(column.name, Value::String(column.database_type_name));
            }
        }

        if values.len() != columns.len() {
            return Err(QueryError(format!(
                "failed to get row: expected {} values, got {}",
                columns.len(),
                values.len()
            )));
        }
        let row: Row = columns
            .iter()
            .cloned()
            .zip(values.into_iter().map(|v| v.into_json()))
            .collect();
        shaped.push(row);
    }

    Ok(Materialized {
        rows: shaped,
        datatypes,
    })
}
