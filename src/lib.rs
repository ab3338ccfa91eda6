pub mod api;
pub mod cfenv;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod repo;
