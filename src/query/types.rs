use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::GatewayError;

/// Inbound request body.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct QueryRequest {
    /// Informational only; the query names its own targets.
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "gettypes", alias = "getTypes")]
    pub get_types: bool,
}

/// Undoes the one escape clients commonly leave in the query text.
pub fn normalize_query(query: &str) -> String {
    query.replace("%27", "'")
}

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub success: bool,
    pub message: String,
    pub count: usize,
    #[serde(rename = "querytimestamp")]
    pub query_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
}

impl QueryResult {
    pub fn success(rows: Vec<Row>, timestamp: &str) -> Self {
        Self {
            success: true,
            message: String::new(),
            count: rows.len(),
            query_timestamp: timestamp.to_string(),
            data: Some(rows),
        }
    }

    pub fn failure(err: &GatewayError, timestamp: &str) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            count: 0,
            query_timestamp: timestamp.to_string(),
            data: None,
        }
    }
}

/// A result plus the declared type of every column, keyed by column name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResultWithTypes {
    #[serde(flatten)]
    pub result: QueryResult,
    pub datatypes: Map<String, Value>,
}
