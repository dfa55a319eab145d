use std::fmt;
use std::time::Duration;

use log::{error, warn};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::GatewayError::{self, ConfigError};
use crate::core::PLUGIN_NAME;
use crate::driver::ConnectTarget;

/// The untyped backend table as read from the host configuration.
pub type RawConfig = Map<String, Value>;

pub const DEFAULT_MAX_IDLE_CONNS: usize = 3;
pub const DEFAULT_MAX_OPEN_CONNS: usize = 10;
pub const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 0;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoerceError {
    /// The value is not a number at all; carries the JSON kind.
    #[error("is an unknown type: {0}")]
    UnknownType(&'static str),
    #[error("is not an integer: {0}")]
    Fractional(f64),
    #[error("is out of range: {0}")]
    OutOfRange(String),
}

/// Integers pass through; floats are accepted when they encode an integer.
pub fn coerce_int(value: &Value) -> Result<i64, CoerceError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(u) = n.as_u64() {
                Err(CoerceError::OutOfRange(u.to_string()))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if !f.is_finite() || f.fract() != 0.0 {
                    Err(CoerceError::Fractional(f))
                } else if f < i64::MIN as f64 || f > i64::MAX as f64 {
                    Err(CoerceError::OutOfRange(f.to_string()))
                } else {
                    Ok(f as i64)
                }
            }
        }
        other => Err(CoerceError::UnknownType(kind_of(other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolved backend settings. Built once when the handler is mounted.
#[derive(Clone, PartialEq)]
pub struct PoolConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Must exist on the backend; queries are not restricted to it.
    pub table: String,
    pub tls_enabled: bool,
    pub tls_insecure_skip_verify: bool,
    pub max_idle_conns: usize,
    /// 0 means unlimited.
    pub max_open_conns: usize,
    /// Zero duration means unlimited.
    pub conn_max_lifetime: Duration,
    pub query_timeout: Duration,
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("table", &self.table)
            .field("tls_enabled", &self.tls_enabled)
            .field("tls_insecure_skip_verify", &self.tls_insecure_skip_verify)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("max_open_conns", &self.max_open_conns)
            .field("conn_max_lifetime", &self.conn_max_lifetime)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl PoolConfig {
    pub fn from_raw(raw: &RawConfig) -> Result<Self, GatewayError> {
        check_args(raw)?;
        Ok(Self {
            server: required_string(raw, "server")?,
            port: port(raw)?,
            username: required_string(raw, "username")?,
            password: required_string(raw, "password")?,
            table: required_string(raw, "table")?,
            tls_enabled: yes_no(raw, "tls")?,
            tls_insecure_skip_verify: yes_no(raw, "tls-insecure")?,
            max_idle_conns: optional_u64(raw, "max-idle-conn", DEFAULT_MAX_IDLE_CONNS as u64, 0)
                as usize,
            max_open_conns: optional_u64(raw, "max-open-conn", DEFAULT_MAX_OPEN_CONNS as u64, 0)
                as usize,
            conn_max_lifetime: Duration::from_secs(optional_u64(
                raw,
                "conn-max-lifetime",
                DEFAULT_CONN_MAX_LIFETIME_SECS,
                0,
            )),
            query_timeout: Duration::from_millis(optional_u64(
                raw,
                "timeout",
                DEFAULT_QUERY_TIMEOUT_MS,
                1,
            )),
        })
    }

    pub fn connect_target(&self) -> ConnectTarget {
        ConnectTarget {
            server: self.server.clone(),
            port: self.port,
            table: self.table.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls_enabled,
            tls_insecure_skip_verify: self.tls_insecure_skip_verify,
            timeout: self.query_timeout,
        }
    }
}

/// Checks presence and shape of the required keys, in a fixed order so the
/// first missing one is the one reported.
pub fn check_args(raw: &RawConfig) -> Result<(), GatewayError> {
    for key in ["server", "port", "username", "password", "table"] {
        if !raw.contains_key(key) {
            return Err(not_found(key));
        }
        if key == "port" {
            port(raw)?;
        }
    }
    for key in ["tls", "tls-insecure"] {
        yes_no(raw, key)?;
    }
    Ok(())
}

fn not_found(key: &str) -> GatewayError {
    ConfigError(format!("{key} not found in {PLUGIN_NAME} config"))
}

fn required_string(raw: &RawConfig, key: &str) -> Result<String, GatewayError> {
    match raw.get(key) {
        None => Err(not_found(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ConfigError(format!(
            "{key} is an unknown type: {}",
            kind_of(other)
        ))),
    }
}

fn port(raw: &RawConfig) -> Result<u16, GatewayError> {
    let value = raw.get("port").ok_or_else(|| not_found("port"))?;
    let port = coerce_int(value).map_err(|e| ConfigError(format!("port {e}")))?;
    u16::try_from(port).map_err(|_| ConfigError(format!("port out of range: {port}")))
}

fn yes_no(raw: &RawConfig, key: &str) -> Result<bool, GatewayError> {
    let value = raw.get(key).ok_or_else(|| not_found(key))?;
    match value.as_str() {
        Some(s) if s.eq_ignore_ascii_case("yes") => Ok(true),
        Some(s) if s.eq_ignore_ascii_case("no") => Ok(false),
        _ => Err(ConfigError(format!("{key} should be \"yes\" or \"no\""))),
    }
}

/// Reads an optional non-negative integer. Anything unusable is logged and
/// replaced by `default`; this never fails.
fn optional_u64(raw: &RawConfig, key: &str, default: u64, min: u64) -> u64 {
    let Some(value) = raw.get(key) else {
        return default;
    };
    match coerce_int(value) {
        Ok(v) if v >= 0 && v as u64 >= min => v as u64,
        Ok(v) => {
            warn!("{PLUGIN_NAME}: {key} must be at least {min}, got {v}; setting default");
            default
        }
        Err(e) => {
            error!("{PLUGIN_NAME}: {key} {e}; setting default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn raw(value: Value) -> RawConfig {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn full() -> RawConfig {
        raw(json!({
            "server": "ignite.mine.lan",
            "port": 10800,
            "username": "gate",
            "password": "secret",
            "table": "SQL_PUBLIC_ORGANIZATION",
            "tls": "no",
            "tls-insecure": "NO",
        }))
    }

    #[rstest]
    #[case(json!(3), Ok(3))]
    #[case(json!(3.0), Ok(3))]
    #[case(json!(-2), Ok(-2))]
    #[case(json!(3.5), Err(CoerceError::Fractional(3.5)))]
    #[case(json!("3"), Err(CoerceError::UnknownType("string")))]
    #[case(json!(true), Err(CoerceError::UnknownType("bool")))]
    #[case(json!(null), Err(CoerceError::UnknownType("null")))]
    fn test_coerce_int(#[case] value: Value, #[case] expected: Result<i64, CoerceError>) {
        assert_eq!(coerce_int(&value), expected);
    }

    #[test]
    fn test_coerce_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(coerce_int(&json!("3")).unwrap_err());
        assert_eq!(err.to_string(), "is an unknown type: string");
        assert_eq!(
            CoerceError::Fractional(3.5).to_string(),
            "is not an integer: 3.5"
        );
    }

    #[test]
    fn test_defaults_applied() {
        let config = PoolConfig::from_raw(&full()).unwrap();
        assert_eq!(config.port, 10800);
        assert!(!config.tls_enabled);
        assert!(!config.tls_insecure_skip_verify);
        assert_eq!(config.max_idle_conns, 3);
        assert_eq!(config.max_open_conns, 10);
        assert_eq!(config.conn_max_lifetime, Duration::ZERO);
        assert_eq!(config.query_timeout, Duration::from_millis(60_000));
    }

    #[test]
    fn test_float_encoded_fields() {
        let mut map = full();
        map.insert("port".into(), json!(10800.0));
        map.insert("max-idle-conn".into(), json!(5.0));
        map.insert("max-open-conn".into(), json!(20));
        map.insert("conn-max-lifetime".into(), json!(30));
        map.insert("timeout".into(), json!(1500.0));
        map.insert("tls".into(), json!("Yes"));
        let config = PoolConfig::from_raw(&map).unwrap();
        assert_eq!(config.port, 10800);
        assert_eq!(config.max_idle_conns, 5);
        assert_eq!(config.max_open_conns, 20);
        assert_eq!(config.conn_max_lifetime, Duration::from_secs(30));
        assert_eq!(config.query_timeout, Duration::from_millis(1500));
        assert!(config.tls_enabled);
    }

    #[rstest]
    #[case("max-idle-conn", json!("many"))]
    #[case("max-idle-conn", json!(-1))]
    #[case("timeout", json!(0))]
    #[case("timeout", json!([1]))]
    fn test_bad_optional_falls_back(#[case] key: &str, #[case] value: Value) {
        let mut map = full();
        map.insert(key.into(), value);
        let config = PoolConfig::from_raw(&map).unwrap();
        assert_eq!(config.max_idle_conns, DEFAULT_MAX_IDLE_CONNS);
        assert_eq!(
            config.query_timeout,
            Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS)
        );
    }

    #[rstest]
    #[case("server")]
    #[case("port")]
    #[case("username")]
    #[case("password")]
    #[case("table")]
    #[case("tls")]
    #[case("tls-insecure")]
    fn test_missing_required_field(#[case] key: &str) {
        let mut map = full();
        map.remove(key);
        let err = PoolConfig::from_raw(&map).unwrap_err();
        assert_eq!(
            err,
            ConfigError(format!("{key} not found in {PLUGIN_NAME} config"))
        );
    }

    #[rstest]
    #[case("tls", json!("maybe"))]
    #[case("tls-insecure", json!(true))]
    fn test_bad_tls_flag(#[case] key: &str, #[case] value: Value) {
        let mut map = full();
        map.insert(key.into(), value);
        let err = check_args(&map).unwrap_err();
        assert_eq!(err, ConfigError(format!("{key} should be \"yes\" or \"no\"")));
    }

    #[rstest]
    #[case(json!("10800"))]
    #[case(json!(70000))]
    #[case(json!(1.5))]
    fn test_bad_port(#[case] value: Value) {
        let mut map = full();
        map.insert("port".into(), value);
        let err = check_args(&map).unwrap_err();
        assert!(matches!(err, ConfigError(msg) if msg.starts_with("port")));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = PoolConfig::from_raw(&full()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_connect_target() {
        let config = PoolConfig::from_raw(&full()).unwrap();
        let target = config.connect_target();
        assert_eq!(target.server, "ignite.mine.lan");
        assert_eq!(target.table, "SQL_PUBLIC_ORGANIZATION");
        assert_eq!(target.timeout, Duration::from_millis(60_000));
    }
}
