mod args;
mod error;
mod logger;

pub use args::CliArgs;
pub use error::{GatewayError, ValidationError};
pub use logger::setup_logging;

/// Prefix of gateway log lines and the key of the backend config table.
pub const PLUGIN_NAME: &str = "sqlgate-backend";
