//! Administrative statistics

use crate::error::Result;
use crate::server::AppState;
use crate::service::ProxyResponse;
use axum::extract::State;

/// GET /admin/stats
pub async fn stats(State(state): State<AppState>) -> Result<ProxyResponse> {
    state.proxy.admin_stats().await
}
