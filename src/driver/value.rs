use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A scalar as returned by a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Renders the value for the response body. Byte strings become text,
    /// everything else keeps its kind.
    pub fn into_json(self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(b),
            SqlValue::Int(i) => Value::from(i),
            // NaN and infinities have no JSON form.
            SqlValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s),
            SqlValue::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
            SqlValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }

    /// Storage-class name, used when a backend declares no column type.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "BOOLEAN",
            SqlValue::Int(_) => "INTEGER",
            SqlValue::Float(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Bytes(_) => "BLOB",
            SqlValue::Timestamp(_) => "TIMESTAMP",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_bytes_become_text() {
        assert_eq!(SqlValue::Bytes(b"Acme".to_vec()).into_json(), json!("Acme"));
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(SqlValue::Int(1).into_json(), json!(1));
        assert_eq!(SqlValue::Bool(true).into_json(), json!(true));
        assert_eq!(SqlValue::Null.into_json(), Value::Null);
        assert_eq!(SqlValue::Float(2.5).into_json(), json!(2.5));
        assert_eq!(SqlValue::Float(f64::NAN).into_json(), Value::Null);
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            SqlValue::Timestamp(ts).into_json(),
            json!("2024-05-01T12:30:00Z")
        );
    }
}
