//! Batch submission endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::ExecutionId;
use domain::{RedeemedBonus, RedemptionBatch, RequestReference};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AppState, Coordinator};

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    /// Batch ID; generated when absent.
    pub request_id: Option<String>,
    /// `yyyy-MM-dd`; today when absent.
    pub request_date: Option<String>,
    pub redeemed_bonuses: Vec<RedeemedBonusRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedBonusRequest {
    pub bonus_code: String,
    pub redeemed_at: DateTime<Utc>,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub request_id: String,
    /// Execution IDs in claim order.
    pub executions: Vec<ExecutionId>,
}

// -- Handlers --

/// POST /redemptions: accept a batch and process it in the background.
#[tracing::instrument(skip(state, req), fields(claims = req.redeemed_bonuses.len()))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RedemptionRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let request_id = req
        .request_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let reference = match req.request_date {
        Some(date) => RequestReference::new(request_id, date),
        None => RequestReference::accepted_at(request_id, Utc::now()),
    };
    let claims = req
        .redeemed_bonuses
        .into_iter()
        .map(|c| RedeemedBonus::new(c.bonus_code, c.redeemed_at))
        .collect();

    let batch = RedemptionBatch::new(reference, claims)?;
    let request_id = batch.reference.request_id.clone();
    let executions = Coordinator::execution_ids(&batch);
    metrics::counter!("redemption_batches_accepted_total").increment(1);
    metrics::counter!("redemption_claims_accepted_total").increment(executions.len() as u64);

    // Fire-and-forget: outcomes are observable per execution
    drop(state.coordinator.submit_batch(batch));
    tracing::info!(%request_id, "batch accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "OK",
            request_id,
            executions,
        }),
    ))
}
