pub mod config;
pub mod http;
pub mod media;
pub mod metrics;
pub mod rate_limit;
