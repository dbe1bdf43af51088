//! Process-wide orchestrator figures.

use axum::{extract::State, Json};
use std::sync::Arc;
use deckbatch_core::SystemMetrics;

use crate::state::AppState;

pub async fn get_system_metrics(State(state): State<Arc<AppState>>) -> Json<SystemMetrics> {
    Json(state.orchestrator().system_metrics().await)
}
