//! # Ledger Store
//!
//! Durable storage of wallets, ledger rows, chore requests and parent approvals.
//!
//! Every read or write takes a unit-of-work handle opened with
//! [`LedgerStore::begin`]. Callers own the transaction boundary: nothing is
//! visible to other units of work until [`LedgerStore::commit`] succeeds, and
//! dropping or rolling back a handle discards all of its writes.
//!
//! Reads that lock (`*_locked` in the Postgres backend) hold their row until the
//! unit of work ends, so two callers inspecting the same wallet or request are
//! serialized.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ExternalChoreRequest, NewParentApproval, NewWalletTransaction, ParentApproval,
    TransactionStatus, TrustedContact, Wallet, WalletTransaction,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Balance of wallet {wallet_id} would become negative ({balance_cents})")]
    NegativeBalance { wallet_id: Uuid, balance_cents: i64 },

    #[error("Wallet {0} is inactive")]
    WalletInactive(Uuid),

    #[error("A pending hold already exists for request {0}")]
    DuplicateHold(Uuid),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Transactional storage for the escrow ledger and the chore workflow.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Pre-opened unit of work threaded through every call
    type Uow: Send;

    async fn begin(&self) -> Result<Self::Uow, StoreError>;

    async fn commit(&self, uow: Self::Uow) -> Result<(), StoreError>;

    async fn rollback(&self, uow: Self::Uow) -> Result<(), StoreError>;

    /// Connectivity probe for health checks
    async fn ping(&self) -> Result<(), StoreError>;

    /// Idempotent; never creates a second wallet for the same family, even
    /// under concurrent first use. The returned wallet is locked.
    async fn get_or_create_wallet(
        &self,
        uow: &mut Self::Uow,
        family_id: Uuid,
        currency: &str,
    ) -> Result<Wallet, StoreError>;

    async fn find_wallet_by_family(
        &self,
        uow: &mut Self::Uow,
        family_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError>;

    async fn find_wallet(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError>;

    async fn list_wallets(&self, uow: &mut Self::Uow) -> Result<Vec<Wallet>, StoreError>;

    /// Appends a ledger row. Does not touch the wallet balance. A second
    /// pending hold for the same request fails with `DuplicateHold`.
    async fn append_transaction(
        &self,
        uow: &mut Self::Uow,
        transaction: NewWalletTransaction,
    ) -> Result<Uuid, StoreError>;

    /// Must be paired with the matching `append_transaction` in the same unit
    /// of work. Fails if the balance would go negative or the wallet is inactive.
    async fn update_wallet_balance(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
        new_balance_cents: i64,
    ) -> Result<(), StoreError>;

    async fn deactivate_wallet(&self, uow: &mut Self::Uow, wallet_id: Uuid)
        -> Result<(), StoreError>;

    async fn pending_holds(
        &self,
        uow: &mut Self::Uow,
        external_chore_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, StoreError>;

    /// Sets `status` and stamps `processed_at`
    async fn set_transaction_status(
        &self,
        uow: &mut Self::Uow,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), StoreError>;

    /// Newest first; `None` returns the whole ledger
    async fn list_transactions(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<WalletTransaction>, StoreError>;

    async fn find_chore_request(
        &self,
        uow: &mut Self::Uow,
        request_id: Uuid,
    ) -> Result<Option<ExternalChoreRequest>, StoreError>;

    async fn save_chore_request(
        &self,
        uow: &mut Self::Uow,
        request: &ExternalChoreRequest,
    ) -> Result<(), StoreError>;

    async fn insert_approval(
        &self,
        uow: &mut Self::Uow,
        approval: NewParentApproval,
    ) -> Result<ParentApproval, StoreError>;

    async fn list_approvals(
        &self,
        uow: &mut Self::Uow,
        request_id: Uuid,
    ) -> Result<Vec<ParentApproval>, StoreError>;
}

/// Read-only trusted contact lookup
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn get_contact(&self, contact_id: Uuid) -> Result<Option<TrustedContact>, StoreError>;
}

/// Everything the coordinator and the HTTP layer need from a backend
pub trait EscrowStore: LedgerStore + ContactDirectory {}

impl<T: LedgerStore + ContactDirectory> EscrowStore for T {}
