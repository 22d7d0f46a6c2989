//! Approval Workflow Coordinator.
//!
//! Single entry point for parent decisions. Each operation opens one unit of
//! work, applies the state machine and the ledger effects inside it, and
//! commits them together. Notifications go out only after a successful commit.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::{
    ApprovalDecision, ExternalChoreRequest, NewParentApproval, ParentApproval, PaymentMode,
    Wallet, WalletTransaction,
};
use crate::services::chore_state::{self, ChoreAction};
use crate::services::ledger::{LedgerReceipt, WalletLedger};
use crate::services::notifier::{ChoreEvent, Notifier};
use crate::store::EscrowStore;

const RECENT_TRANSACTIONS_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy)]
pub struct ApprovalLimits {
    pub max_approved_amount_cents: i64,
    pub max_notes_len: usize,
}

impl Default for ApprovalLimits {
    fn default() -> Self {
        Self {
            max_approved_amount_cents: 50_000,
            max_notes_len: 500,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApproveInput {
    /// Defaults to the offered amount
    pub approved_amount_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub request: ExternalChoreRequest,
    pub approval: ParentApproval,
    pub hold: Option<LedgerReceipt>,
}

#[derive(Debug, Clone)]
pub struct RejectionOutcome {
    pub request: ExternalChoreRequest,
    pub approval: ParentApproval,
    pub released_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub wallet: Option<Wallet>,
    pub transactions: Vec<WalletTransaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub request: ExternalChoreRequest,
    pub approvals: Vec<ParentApproval>,
}

pub struct ApprovalCoordinator<S: EscrowStore> {
    store: Arc<S>,
    ledger: WalletLedger<S>,
    notifier: Arc<dyn Notifier>,
    limits: ApprovalLimits,
}

impl<S: EscrowStore> ApprovalCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        ledger: WalletLedger<S>,
        notifier: Arc<dyn Notifier>,
        limits: ApprovalLimits,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            limits,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Approves a pending request, holding the approved amount for in-app
    /// payments. If the hold fails nothing is persisted.
    #[tracing::instrument(skip(self, input))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        family_id: Uuid,
        input: ApproveInput,
    ) -> Result<ApprovalOutcome, EscrowError> {
        if let Some(amount) = input.approved_amount_cents {
            if amount < 0 || amount > self.limits.max_approved_amount_cents {
                return Err(EscrowError::Validation(format!(
                    "Approved amount must be between 0 and {} cents",
                    self.limits.max_approved_amount_cents
                )));
            }
        }
        self.validate_notes(input.notes.as_deref())?;

        let mut uow = self.store.begin().await?;
        let result = self.approve_in(&mut uow, request_id, family_id, input).await;
        let outcome = self.finish(uow, result).await?;

        tracing::info!(
            decision = ?outcome.approval.decision,
            approved_amount_cents = outcome.approval.approved_amount_cents,
            held = outcome.hold.is_some(),
            "Request approved"
        );

        self.emit(ChoreEvent::Approved, &outcome.request).await;
        Ok(outcome)
    }

    async fn approve_in(
        &self,
        uow: &mut S::Uow,
        request_id: Uuid,
        family_id: Uuid,
        input: ApproveInput,
    ) -> Result<ApprovalOutcome, EscrowError> {
        let mut request = self.load_owned(uow, request_id, family_id).await?;
        let approved_amount = input
            .approved_amount_cents
            .unwrap_or(request.offered_amount_cents);

        let decision = chore_state::approve(&mut request, approved_amount)?;

        let approval = self
            .store
            .insert_approval(
                uow,
                NewParentApproval {
                    external_chore_id: request.id,
                    parent_family_id: family_id,
                    decision,
                    original_amount_cents: request.offered_amount_cents,
                    approved_amount_cents: approved_amount,
                    notes: input.notes,
                },
            )
            .await?;

        let hold = if request.payment_mode == PaymentMode::InApp && approved_amount > 0 {
            let receipt = self
                .ledger
                .place_hold(
                    uow,
                    family_id,
                    approved_amount,
                    request.id,
                    &format!("Hold for external chore: {}", request.title),
                )
                .await?;
            Some(receipt)
        } else {
            None
        };

        self.store.save_chore_request(uow, &request).await?;

        Ok(ApprovalOutcome {
            request,
            approval,
            hold,
        })
    }

    /// Rejects a pending request and releases any stray hold
    #[tracing::instrument(skip(self, notes))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        family_id: Uuid,
        notes: Option<String>,
    ) -> Result<RejectionOutcome, EscrowError> {
        self.validate_notes(notes.as_deref())?;

        let mut uow = self.store.begin().await?;
        let result = self.reject_in(&mut uow, request_id, family_id, notes).await;
        let outcome = self.finish(uow, result).await?;

        if outcome.released_cents > 0 {
            tracing::warn!(
                released_cents = outcome.released_cents,
                "Released a hold on a request that was still awaiting a decision"
            );
        }
        tracing::info!("Request rejected");

        self.emit(ChoreEvent::Rejected, &outcome.request).await;
        Ok(outcome)
    }

    async fn reject_in(
        &self,
        uow: &mut S::Uow,
        request_id: Uuid,
        family_id: Uuid,
        notes: Option<String>,
    ) -> Result<RejectionOutcome, EscrowError> {
        let mut request = self.load_owned(uow, request_id, family_id).await?;
        chore_state::reject(&mut request)?;

        let approval = self
            .store
            .insert_approval(
                uow,
                NewParentApproval {
                    external_chore_id: request.id,
                    parent_family_id: family_id,
                    decision: ApprovalDecision::Rejected,
                    original_amount_cents: request.offered_amount_cents,
                    approved_amount_cents: 0,
                    notes,
                },
            )
            .await?;

        let released_cents = self.ledger.release_hold(uow, request.id).await?;
        self.store.save_chore_request(uow, &request).await?;

        Ok(RejectionOutcome {
            request,
            approval,
            released_cents,
        })
    }

    /// Marks an approved request as done. Does not touch the ledger.
    #[tracing::instrument(skip(self, evidence_url))]
    pub async fn complete(
        &self,
        request_id: Uuid,
        family_id: Uuid,
        evidence_url: &str,
    ) -> Result<ExternalChoreRequest, EscrowError> {
        let evidence_url = validate_evidence_url(evidence_url)?;

        let mut uow = self.store.begin().await?;
        let result = async {
            let mut request = self.load_owned(&mut uow, request_id, family_id).await?;
            chore_state::complete(&mut request, evidence_url, Utc::now())?;
            self.store.save_chore_request(&mut uow, &request).await?;
            Ok::<_, EscrowError>(request)
        }
        .await;
        let request = self.finish(uow, result).await?;

        tracing::info!("Request completed");

        self.emit(ChoreEvent::Completed, &request).await;
        Ok(request)
    }

    /// Payout hook: settles the hold of a completed in-app request.
    ///
    /// Returns `false` when there is nothing to settle, which is always the
    /// case for manual payment mode.
    #[tracing::instrument(skip(self))]
    pub async fn settle(&self, request_id: Uuid, family_id: Uuid) -> Result<bool, EscrowError> {
        let mut uow = self.store.begin().await?;
        let result = async {
            let request = self.load_owned(&mut uow, request_id, family_id).await?;
            chore_state::next_status(request.status, ChoreAction::Settle)?;

            let settled = match request.payment_mode {
                PaymentMode::InApp => self.ledger.settle_hold(&mut uow, request.id).await?,
                PaymentMode::Manual => false,
            };
            Ok::<_, EscrowError>(settled)
        }
        .await;

        self.finish(uow, result).await
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn deposit(
        &self,
        family_id: Uuid,
        amount_cents: i64,
        description: Option<String>,
    ) -> Result<LedgerReceipt, EscrowError> {
        let description = description.unwrap_or_else(|| "Wallet deposit".to_string());
        self.validate_notes(Some(&description))?;

        let mut uow = self.store.begin().await?;
        let result = self
            .ledger
            .deposit(&mut uow, family_id, amount_cents, &description)
            .await;

        self.finish(uow, result).await
    }

    pub async fn wallet_summary(&self, family_id: Uuid) -> Result<WalletSummary, EscrowError> {
        let mut uow = self.store.begin().await?;
        let result = async {
            let wallet = self.store.find_wallet_by_family(&mut uow, family_id).await?;
            let transactions = match &wallet {
                Some(wallet) => {
                    self.store
                        .list_transactions(&mut uow, wallet.id, Some(RECENT_TRANSACTIONS_LIMIT))
                        .await?
                }
                None => Vec::new(),
            };
            Ok::<_, EscrowError>(WalletSummary {
                wallet,
                transactions,
            })
        }
        .await;

        self.finish(uow, result).await
    }

    pub async fn get_request(
        &self,
        request_id: Uuid,
        family_id: Uuid,
    ) -> Result<RequestView, EscrowError> {
        let mut uow = self.store.begin().await?;
        let result = async {
            let request = self.load_owned(&mut uow, request_id, family_id).await?;
            let approvals = self.store.list_approvals(&mut uow, request.id).await?;
            Ok::<_, EscrowError>(RequestView { request, approvals })
        }
        .await;

        self.finish(uow, result).await
    }

    /// Requests owned by another family are reported as missing
    async fn load_owned(
        &self,
        uow: &mut S::Uow,
        request_id: Uuid,
        family_id: Uuid,
    ) -> Result<ExternalChoreRequest, EscrowError> {
        self.store
            .find_chore_request(uow, request_id)
            .await?
            .filter(|request| request.family_id == family_id)
            .ok_or_else(|| EscrowError::NotFound(format!("chore request {}", request_id)))
    }

    /// Commits on success, rolls back on failure
    async fn finish<T>(
        &self,
        uow: S::Uow,
        result: Result<T, EscrowError>,
    ) -> Result<T, EscrowError> {
        match result {
            Ok(value) => {
                self.store.commit(uow).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(uow).await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    fn validate_notes(&self, notes: Option<&str>) -> Result<(), EscrowError> {
        match notes {
            Some(notes) if notes.chars().count() > self.limits.max_notes_len => {
                Err(EscrowError::Validation(format!(
                    "Notes must be at most {} characters",
                    self.limits.max_notes_len
                )))
            }
            _ => Ok(()),
        }
    }

    /// Notifies the request's contact. Never fails the caller.
    async fn emit(&self, event: ChoreEvent, request: &ExternalChoreRequest) {
        let Some(contact_id) = request.contact_id else {
            tracing::debug!(request_id = %request.id, "No contact to notify");
            return;
        };

        let contact = match self.store.get_contact(contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                tracing::debug!(%contact_id, "Contact no longer exists, skipping notification");
                return;
            }
            Err(e) => {
                tracing::warn!(%contact_id, error = %e, "Contact lookup failed");
                return;
            }
        };

        let mut payload = json!({
            "event": event,
            "requestId": request.id,
            "title": request.title,
            "contactName": contact.name,
        });
        if let Some(amount) = request.approved_amount_cents {
            payload["approvedAmountCents"] = json!(amount);
        }
        if let Some(evidence_url) = &request.evidence_url {
            payload["evidenceUrl"] = json!(evidence_url);
        }

        if let Err(e) = self.notifier.notify(event, &contact.email, payload).await {
            tracing::warn!(
                request_id = %request.id,
                ?event,
                error = %e,
                "Notification failed"
            );
        }
    }
}

/// Returns the trimmed reference exactly as supplied once it parses as an
/// http(s) URL with a host
fn validate_evidence_url(evidence_url: &str) -> Result<String, EscrowError> {
    let evidence_url = evidence_url.trim();
    let parsed = url::Url::parse(evidence_url)
        .map_err(|e| EscrowError::Validation(format!("Invalid evidence URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(EscrowError::Validation(
            "Evidence URL must be an http(s) URL".to_string(),
        ));
    }

    Ok(evidence_url.to_string())
}
