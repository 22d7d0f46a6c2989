use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{AppState, FamilyId, JsonBody};
use crate::error::Result;
use crate::services::approval::WalletSummary;
use crate::store::EscrowStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub amount_cents: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub success: bool,
    pub balance_cents: i64,
    pub transaction_id: Uuid,
}

async fn deposit<S: EscrowStore>(
    State(state): State<AppState<S>>,
    FamilyId(family_id): FamilyId,
    JsonBody(req): JsonBody<DepositRequest>,
) -> Result<Json<DepositResponse>> {
    let receipt = state
        .coordinator
        .deposit(family_id, req.amount_cents, req.description)
        .await?;

    Ok(Json(DepositResponse {
        success: true,
        balance_cents: receipt.balance_cents,
        transaction_id: receipt.transaction_id,
    }))
}

/// Balance and recent ledger rows for the acting family
async fn show_wallet<S: EscrowStore>(
    State(state): State<AppState<S>>,
    FamilyId(family_id): FamilyId,
) -> Result<Json<WalletSummary>> {
    let summary = state.coordinator.wallet_summary(family_id).await?;
    Ok(Json(summary))
}

pub fn router<S: EscrowStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/wallet", get(show_wallet::<S>))
        .route("/wallet/deposits", post(deposit::<S>))
}
