//! Crash recovery endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use workflow::ExecutionReport;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResponse {
    pub resumed: usize,
    pub executions: Vec<ExecutionReport>,
}

/// POST /recoveries: resume every unfinished execution and wait for it to settle.
#[tracing::instrument(skip(state))]
pub async fn recover(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecoveryResponse>, ApiError> {
    let executions = state.coordinator.recover_incomplete().await?;
    Ok(Json(RecoveryResponse {
        resumed: executions.len(),
        executions,
    }))
}
