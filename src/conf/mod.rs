mod backend;
mod config;
mod server;

pub use backend::{
    CoerceError, DEFAULT_CONN_MAX_LIFETIME_SECS, DEFAULT_MAX_IDLE_CONNS, DEFAULT_MAX_OPEN_CONNS,
    DEFAULT_QUERY_TIMEOUT_MS, PoolConfig, RawConfig, check_args, coerce_int,
};
pub use config::Config;
pub use server::ServerConfig;
