//! Execution inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::ExecutionId;
use domain::Aggregate;
use serde::Serialize;
use workflow::{StepOutcome, StepResult, WorkflowExecution};

use crate::error::ApiError;
use crate::state::AppState;

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub execution_id: String,
    pub workflow_type: String,
    pub status: String,
    pub stage: String,
    pub bonus_code: Option<String>,
    pub request_id: Option<String>,
    pub steps: Vec<StepResponse>,
    pub failure_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub step_name: String,
    pub attempts: u32,
    pub status: &'static str,
    pub reason: Option<String>,
}

impl From<&StepOutcome> for StepResponse {
    fn from(outcome: &StepOutcome) -> Self {
        let (status, reason) = match &outcome.result {
            StepResult::Success { .. } => ("SUCCESS", None),
            StepResult::Failure { reason, .. } => ("FAILURE", Some(reason.clone())),
        };
        Self {
            step_name: outcome.step_name.clone(),
            attempts: outcome.attempts,
            status,
            reason,
        }
    }
}

impl From<&WorkflowExecution> for ExecutionResponse {
    fn from(execution: &WorkflowExecution) -> Self {
        Self {
            execution_id: execution
                .id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            workflow_type: execution.workflow_type().to_string(),
            status: execution.status().to_string(),
            stage: execution.stage().to_string(),
            bonus_code: execution.claim().map(|c| c.bonus_code.to_string()),
            request_id: execution.reference().map(|r| r.request_id.clone()),
            steps: execution.steps().iter().map(StepResponse::from).collect(),
            failure_reason: execution.failure_reason().map(str::to_string),
            started_at: execution.started_at(),
            finished_at: execution.finished_at(),
        }
    }
}

// -- Handlers --

/// GET /executions/{id}: folded state of one execution.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let execution_id: ExecutionId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid execution id: {e}")))?;

    let execution = state
        .coordinator
        .workflow()
        .load(execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Execution {execution_id} not found")))?;

    Ok(Json(ExecutionResponse::from(&execution)))
}
