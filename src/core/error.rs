use thiserror::Error;

/// Reasons a query is refused before it reaches the backend.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid query : {0}")]
    InvalidQuery(String),
    #[error("Unsupported SQL statement : {0}")]
    UnsupportedStatement(String),
    #[error("Unknown SQL statement : {0}")]
    UnknownStatement(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("Cannot parse config: {0}")]
    ConfigParsingError(String),
    #[error("{0}")]
    ConfigError(String),
    #[error("{0}")]
    ConnectionError(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    QueryError(String),
    #[error("{0}")]
    DecodeError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl GatewayError {
    /// Errors raised while mounting the backend, as opposed to per request.
    pub fn is_mount_error(&self) -> bool {
        matches!(
            self,
            GatewayError::ConfigError(_) | GatewayError::ConnectionError(_)
        )
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::DecodeError(err.to_string())
    }
}
