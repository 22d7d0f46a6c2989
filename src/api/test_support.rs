//! In-process harness for the HTTP handlers, backed by the memory store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use crate::api::{self, middleware::AppState, FAMILY_ID_HEADER};
use crate::models::{ChoreStatus, ExternalChoreRequest, PaymentMode};
use crate::services::approval::{ApprovalCoordinator, ApprovalLimits};
use crate::services::ledger::{DepositLimits, WalletLedger};
use crate::services::notifier::LogNotifier;
use crate::store::MemoryLedgerStore;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryLedgerStore>,
    pub state: AppState<MemoryLedgerStore>,
    pub family_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = WalletLedger::new(store.clone(), DepositLimits::default(), "USD");
        let coordinator = ApprovalCoordinator::new(
            store.clone(),
            ledger,
            Arc::new(LogNotifier),
            ApprovalLimits::default(),
        );
        let state = AppState::new(coordinator);

        Self {
            router: api::app(state.clone()),
            store,
            state,
            family_id: Uuid::new_v4(),
        }
    }

    pub async fn fund(&self, cents: i64) {
        self.state
            .coordinator
            .deposit(self.family_id, cents, None)
            .await
            .unwrap();
    }

    pub async fn request(&self, offered: i64, mode: PaymentMode) -> Uuid {
        let now = Utc::now();
        let request = ExternalChoreRequest {
            id: Uuid::new_v4(),
            family_id: self.family_id,
            child_id: Uuid::new_v4(),
            contact_id: None,
            title: "Rake leaves".to_string(),
            offered_amount_cents: offered,
            approved_amount_cents: None,
            payment_mode: mode,
            status: ChoreStatus::AwaitingParent,
            evidence_url: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = request.id;
        self.store.insert_chore_request(request).await;
        id
    }

    pub async fn status(&self, request_id: Uuid) -> ChoreStatus {
        self.state
            .coordinator
            .get_request(request_id, self.family_id)
            .await
            .unwrap()
            .request
            .status
    }

    pub async fn send_anonymous(&self, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        dispatch(&self.router, request).await
    }
}

/// Sends a request as the app's family, with an optional JSON body
pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(FAMILY_ID_HEADER, app.family_id.to_string());

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    dispatch(&app.router, request).await
}

async fn dispatch(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
