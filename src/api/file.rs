//! Hosted file download

use crate::error::Result;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
};

/// GET /file/{data_id}
pub async fn download(State(state): State<AppState>, Path(data_id): Path<String>) -> Result<Response> {
    state.proxy.fetch_file(&data_id).await
}
