//! Jobgate Core - authorization and dispatch core of the job gateway
//!
//! Every request is authenticated against the identity service, gated on
//! the capability it requires, and then either proxied synchronously to a
//! backend or dispatched asynchronously as a job envelope on the broker.

pub mod api;
pub mod backend;
pub mod broker;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod policy;
pub mod server;
pub mod service;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
