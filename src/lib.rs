pub mod api;
pub mod conf;
pub mod core;
pub mod driver;
pub mod pool;
pub mod query;
pub mod service;

#[cfg(feature = "testutil")]
pub mod testutil;
