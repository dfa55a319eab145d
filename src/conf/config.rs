use config::{Config as CConfig, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{
    conf::{RawConfig, ServerConfig},
    core::GatewayError::{self, ConfigParsingError},
};

const ENV_PREFIX: &str = "SQLGATE";

/// Host configuration. The backend table stays untyped here and is resolved
/// into a `PoolConfig` when the handler is mounted.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(rename = "sqlgate-backend", default)]
    pub backend: RawConfig,
}

impl Config {
    pub fn from_str(toml_str: &str) -> Result<Config, GatewayError> {
        let config = CConfig::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigParsingError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigParsingError(e.to_string()))?;
        Ok(config)
    }

    /// Loads an optional TOML file, then applies `SQLGATE_*` environment
    /// overrides (`SQLGATE_SERVER__PORT=9000`).
    pub fn load(path: Option<&str>) -> Result<Config, GatewayError> {
        let mut builder = CConfig::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigParsingError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigParsingError(e.to_string()))
    }
}
