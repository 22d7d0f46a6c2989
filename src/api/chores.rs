use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{AppState, FamilyId, JsonBody, OptionalJsonBody};
use crate::error::Result;
use crate::services::approval::{ApproveInput, RequestView};
use crate::store::EscrowStore;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub approved_amount_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub success: bool,
    pub approved_amount_cents: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub evidence_url: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Approve a pending request, optionally with a different amount.
/// The body is optional.
async fn approve<S: EscrowStore>(
    State(state): State<AppState<S>>,
    FamilyId(family_id): FamilyId,
    Path(request_id): Path<Uuid>,
    OptionalJsonBody(req): OptionalJsonBody<ApproveRequest>,
) -> Result<Json<ApproveResponse>> {
    let outcome = state
        .coordinator
        .approve(
            request_id,
            family_id,
            ApproveInput {
                approved_amount_cents: req.approved_amount_cents,
                notes: req.notes,
            },
        )
        .await?;

    Ok(Json(ApproveResponse {
        success: true,
        approved_amount_cents: outcome.approval.approved_amount_cents,
    }))
}

/// Reject a pending request. The body is optional.
async fn reject<S: EscrowStore>(
    State(state): State<AppState<S>>,
    FamilyId(family_id): FamilyId,
    Path(request_id): Path<Uuid>,
    OptionalJsonBody(req): OptionalJsonBody<RejectRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .coordinator
        .reject(request_id, family_id, req.notes)
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn complete<S: EscrowStore>(
    State(state): State<AppState<S>>,
    FamilyId(family_id): FamilyId,
    Path(request_id): Path<Uuid>,
    JsonBody(req): JsonBody<CompleteRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .coordinator
        .complete(request_id, family_id, &req.evidence_url)
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn show_request<S: EscrowStore>(
    State(state): State<AppState<S>>,
    FamilyId(family_id): FamilyId,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestView>> {
    let view = state.coordinator.get_request(request_id, family_id).await?;
    Ok(Json(view))
}

pub fn router<S: EscrowStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/chores/:id", get(show_request::<S>))
        .route("/chores/:id/approve", post(approve::<S>))
        .route("/chores/:id/reject", post(reject::<S>))
        .route("/chores/:id/complete", post(complete::<S>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{send, TestApp};
    use crate::models::{ChoreStatus, PaymentMode};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_approve_returns_approved_amount() {
        let app = TestApp::new().await;
        app.fund(10_000).await;
        let request_id = app.request(3_500, PaymentMode::InApp).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/chores/{}/approve", request_id),
            Some(json!({ "approvedAmountCents": 3000, "notes": "Good job" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "approvedAmountCents": 3000 }));
        assert_eq!(app.status(request_id).await, ChoreStatus::Approved);
    }

    #[tokio::test]
    async fn test_approve_without_funds_is_conflict() {
        let app = TestApp::new().await;
        app.fund(500).await;
        let request_id = app.request(8_000, PaymentMode::InApp).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/chores/{}/approve", request_id),
            Some(json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "InsufficientFunds");
        assert_eq!(app.status(request_id).await, ChoreStatus::AwaitingParent);
    }

    #[tokio::test]
    async fn test_reject_without_body_then_already_decided() {
        let app = TestApp::new().await;
        let request_id = app.request(1_000, PaymentMode::Manual).await;
        let uri = format!("/chores/{}/reject", request_id);

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (status, body) = send(&app, "POST", &uri, Some(json!({ "notes": "again" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "AlreadyDecided");
    }

    #[tokio::test]
    async fn test_reject_with_malformed_body_changes_nothing() {
        let app = TestApp::new().await;
        let request_id = app.request(1_000, PaymentMode::Manual).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/chores/{}/reject", request_id),
            Some(json!({ "notes": 12345 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(app.status(request_id).await, ChoreStatus::AwaitingParent);
    }

    #[tokio::test]
    async fn test_approve_without_body_uses_offered_amount() {
        let app = TestApp::new().await;
        app.fund(2_000).await;
        let request_id = app.request(1_500, PaymentMode::InApp).await;

        let (status, body) =
            send(&app, "POST", &format!("/chores/{}/approve", request_id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "approvedAmountCents": 1500 }));
        assert_eq!(app.status(request_id).await, ChoreStatus::Approved);
    }

    #[tokio::test]
    async fn test_approve_with_mistyped_amount_is_validation_error() {
        let app = TestApp::new().await;
        app.fund(5_000).await;
        let request_id = app.request(3_500, PaymentMode::InApp).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/chores/{}/approve", request_id),
            Some(json!({ "approvedAmountCents": "3000" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(app.status(request_id).await, ChoreStatus::AwaitingParent);
    }

    #[tokio::test]
    async fn test_complete_without_body_is_validation_error() {
        let app = TestApp::new().await;
        let request_id = app.request(1_000, PaymentMode::Manual).await;
        send(&app, "POST", &format!("/chores/{}/approve", request_id), None).await;

        let (status, body) =
            send(&app, "POST", &format!("/chores/{}/complete", request_id), None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(app.status(request_id).await, ChoreStatus::Approved);
    }

    #[tokio::test]
    async fn test_complete_requires_approval_and_valid_url() {
        let app = TestApp::new().await;
        let request_id = app.request(1_000, PaymentMode::Manual).await;
        let uri = format!("/chores/{}/complete", request_id);

        let (status, body) =
            send(&app, "POST", &uri, Some(json!({ "evidenceUrl": "https://x/y.jpg" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "NotApproved");

        send(
            &app,
            "POST",
            &format!("/chores/{}/approve", request_id),
            Some(json!({})),
        )
        .await;

        let (status, body) =
            send(&app, "POST", &uri, Some(json!({ "evidenceUrl": "y.jpg" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ValidationError");

        let (status, _) =
            send(&app, "POST", &uri, Some(json!({ "evidenceUrl": "https://x/y.jpg" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.status(request_id).await, ChoreStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_request_and_missing_identity() {
        let app = TestApp::new().await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/chores/{}/approve", Uuid::new_v4()),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");

        let (status, body) = app.send_anonymous("GET", "/wallet").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_show_request_includes_history() {
        let app = TestApp::new().await;
        app.fund(2_000).await;
        let request_id = app.request(1_000, PaymentMode::InApp).await;
        send(
            &app,
            "POST",
            &format!("/chores/{}/approve", request_id),
            Some(json!({ "approvedAmountCents": 1200 })),
        )
        .await;

        let (status, body) = send(&app, "GET", &format!("/chores/{}", request_id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "approved");
        assert_eq!(body["request"]["offeredAmountCents"], 1000);
        assert_eq!(body["request"]["approvedAmountCents"], 1200);
        assert_eq!(body["approvals"][0]["decision"], "modified");
    }
}
