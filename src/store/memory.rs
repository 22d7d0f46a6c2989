use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{ContactDirectory, LedgerStore, StoreError};
use crate::models::{
    ExternalChoreRequest, NewParentApproval, NewWalletTransaction, ParentApproval,
    TransactionKind, TransactionStatus, TrustedContact, Wallet, WalletTransaction,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<WalletTransaction>,
    requests: HashMap<Uuid, ExternalChoreRequest>,
    approvals: Vec<ParentApproval>,
    contacts: HashMap<Uuid, TrustedContact>,
}

/// Process-local ledger store for tests and local development.
///
/// A unit of work holds the single state lock for its whole lifetime and
/// writes to a private copy; commit swaps the copy in. This gives serializable
/// behaviour at the cost of running one unit of work at a time.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

pub struct MemoryUow {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent commit fail, simulating a lost connection
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub async fn insert_contact(&self, contact: TrustedContact) {
        self.state.lock().await.contacts.insert(contact.id, contact);
    }

    /// Chore requests are created by the contact-facing side of the product;
    /// this is how they enter the in-memory backend.
    pub async fn insert_chore_request(&self, request: ExternalChoreRequest) {
        self.state.lock().await.requests.insert(request.id, request);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Uow = MemoryUow;

    async fn begin(&self) -> Result<Self::Uow, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUow { guard, working })
    }

    async fn commit(&self, uow: Self::Uow) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit failed".to_string()));
        }

        let MemoryUow { mut guard, working } = uow;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self, uow: Self::Uow) -> Result<(), StoreError> {
        drop(uow);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_or_create_wallet(
        &self,
        uow: &mut Self::Uow,
        family_id: Uuid,
        currency: &str,
    ) -> Result<Wallet, StoreError> {
        if let Some(wallet) = find_by_family(&uow.working, family_id) {
            return Ok(wallet);
        }

        let now = Utc::now();
        let wallet = Wallet {
            id: Uuid::new_v4(),
            family_id,
            balance_cents: 0,
            currency: currency.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        uow.working.wallets.insert(wallet.id, wallet.clone());

        Ok(wallet)
    }

    async fn find_wallet_by_family(
        &self,
        uow: &mut Self::Uow,
        family_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(find_by_family(&uow.working, family_id))
    }

    async fn find_wallet(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(uow.working.wallets.get(&wallet_id).cloned())
    }

    async fn list_wallets(&self, uow: &mut Self::Uow) -> Result<Vec<Wallet>, StoreError> {
        let mut wallets: Vec<Wallet> = uow.working.wallets.values().cloned().collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn append_transaction(
        &self,
        uow: &mut Self::Uow,
        transaction: NewWalletTransaction,
    ) -> Result<Uuid, StoreError> {
        if !uow.working.wallets.contains_key(&transaction.wallet_id) {
            return Err(StoreError::RowNotFound(format!(
                "wallet {}",
                transaction.wallet_id
            )));
        }

        if let (TransactionKind::Hold, TransactionStatus::Pending, Some(request_id)) = (
            transaction.kind,
            transaction.status,
            transaction.external_chore_id,
        ) {
            let already_pending = uow.working.transactions.iter().any(|t| {
                t.external_chore_id == Some(request_id)
                    && t.kind == TransactionKind::Hold
                    && t.status == TransactionStatus::Pending
            });
            if already_pending {
                return Err(StoreError::DuplicateHold(request_id));
            }
        }

        let now = Utc::now();
        let row = WalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: transaction.wallet_id,
            external_chore_id: transaction.external_chore_id,
            amount_cents: transaction.amount_cents,
            kind: transaction.kind,
            status: transaction.status,
            description: transaction.description,
            created_at: now,
            processed_at: (transaction.status != TransactionStatus::Pending).then_some(now),
        };
        let id = row.id;
        uow.working.transactions.push(row);

        Ok(id)
    }

    async fn update_wallet_balance(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
        new_balance_cents: i64,
    ) -> Result<(), StoreError> {
        if new_balance_cents < 0 {
            return Err(StoreError::NegativeBalance {
                wallet_id,
                balance_cents: new_balance_cents,
            });
        }

        let wallet = uow
            .working
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| StoreError::RowNotFound(format!("wallet {}", wallet_id)))?;

        if !wallet.is_active {
            return Err(StoreError::WalletInactive(wallet_id));
        }

        wallet.balance_cents = new_balance_cents;
        wallet.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate_wallet(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
    ) -> Result<(), StoreError> {
        let wallet = uow
            .working
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| StoreError::RowNotFound(format!("wallet {}", wallet_id)))?;

        wallet.is_active = false;
        wallet.updated_at = Utc::now();
        Ok(())
    }

    async fn pending_holds(
        &self,
        uow: &mut Self::Uow,
        external_chore_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        Ok(uow
            .working
            .transactions
            .iter()
            .filter(|t| {
                t.external_chore_id == Some(external_chore_id)
                    && t.kind == TransactionKind::Hold
                    && t.status == TransactionStatus::Pending
            })
            .cloned()
            .collect())
    }

    async fn set_transaction_status(
        &self,
        uow: &mut Self::Uow,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), StoreError> {
        let row = uow
            .working
            .transactions
            .iter_mut()
            .find(|t| t.id == transaction_id)
            .ok_or_else(|| {
                StoreError::RowNotFound(format!("wallet transaction {}", transaction_id))
            })?;

        row.status = status;
        row.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn list_transactions(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        // Insertion order is creation order
        Ok(uow
            .working
            .transactions
            .iter()
            .rev()
            .filter(|t| t.wallet_id == wallet_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_chore_request(
        &self,
        uow: &mut Self::Uow,
        request_id: Uuid,
    ) -> Result<Option<ExternalChoreRequest>, StoreError> {
        Ok(uow.working.requests.get(&request_id).cloned())
    }

    async fn save_chore_request(
        &self,
        uow: &mut Self::Uow,
        request: &ExternalChoreRequest,
    ) -> Result<(), StoreError> {
        let stored = uow
            .working
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::RowNotFound(format!("chore request {}", request.id)))?;

        stored.status = request.status;
        stored.approved_amount_cents = request.approved_amount_cents;
        stored.evidence_url = request.evidence_url.clone();
        stored.completed_at = request.completed_at;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_approval(
        &self,
        uow: &mut Self::Uow,
        approval: NewParentApproval,
    ) -> Result<ParentApproval, StoreError> {
        let row = ParentApproval {
            id: Uuid::new_v4(),
            external_chore_id: approval.external_chore_id,
            parent_family_id: approval.parent_family_id,
            decision: approval.decision,
            original_amount_cents: approval.original_amount_cents,
            approved_amount_cents: approval.approved_amount_cents,
            notes: approval.notes,
            created_at: Utc::now(),
        };
        uow.working.approvals.push(row.clone());

        Ok(row)
    }

    async fn list_approvals(
        &self,
        uow: &mut Self::Uow,
        request_id: Uuid,
    ) -> Result<Vec<ParentApproval>, StoreError> {
        Ok(uow
            .working
            .approvals
            .iter()
            .filter(|a| a.external_chore_id == request_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactDirectory for MemoryLedgerStore {
    async fn get_contact(&self, contact_id: Uuid) -> Result<Option<TrustedContact>, StoreError> {
        Ok(self.state.lock().await.contacts.get(&contact_id).cloned())
    }
}

fn find_by_family(state: &MemoryState, family_id: Uuid) -> Option<Wallet> {
    state
        .wallets
        .values()
        .find(|w| w.family_id == family_id)
        .cloned()
}
