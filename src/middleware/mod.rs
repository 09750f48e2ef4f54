//! HTTP middleware for the job gateway
//!
//! - Authentication and capability enforcement
//! - Error response normalization
//! - Request ID propagation and HTTP metrics

pub mod authorize;
pub mod error_response;
pub mod metrics;

pub use authorize::{authenticate_middleware, authorize_middleware, AuthorizationState};
pub use error_response::normalize_error_response;
pub use metrics::ObservabilityLayer;
