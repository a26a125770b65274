//! Forward policy: header, query and trace reconstruction for a reverse proxy
//!
//! Given an inbound client request and per-request routing state, this crate
//! decides which headers, path and query go upstream, which response headers
//! come back, and records an optional diagnostic trace of each exchange.

pub mod application;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
pub use proxy::{ProxyPolicyConfig, ProxyRequestHelper, RequestContext};
