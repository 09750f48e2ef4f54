//! Liveness endpoint

/// Fixed liveness answer, no side effects
pub const HEALTH_RESPONSE: &str = "jobgate-core is alive";

pub async fn health() -> &'static str {
    HEALTH_RESPONSE
}
