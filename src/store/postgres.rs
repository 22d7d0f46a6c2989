use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ContactDirectory, LedgerStore, StoreError};
use crate::models::{
    ExternalChoreRequest, NewParentApproval, NewWalletTransaction, ParentApproval,
    TransactionStatus, TrustedContact, Wallet, WalletTransaction,
};

/// Lock waits longer than this abort the unit of work; the caller retries.
const LOCK_TIMEOUT: &str = "5s";

/// Partial unique index allowing one pending hold per chore request
const PENDING_HOLD_INDEX: &str = "one_pending_hold_per_request";

/// Postgres-backed ledger store. Units of work are database transactions and
/// decisions are guarded with `SELECT ... FOR UPDATE` row locks.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Uow = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Uow, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL lock_timeout = '{}'", LOCK_TIMEOUT))
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }

    async fn commit(&self, uow: Self::Uow) -> Result<(), StoreError> {
        uow.commit().await?;
        Ok(())
    }

    async fn rollback(&self, uow: Self::Uow) -> Result<(), StoreError> {
        uow.rollback().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn get_or_create_wallet(
        &self,
        uow: &mut Self::Uow,
        family_id: Uuid,
        currency: &str,
    ) -> Result<Wallet, StoreError> {
        Ok(Wallet::get_or_create_locked(&mut **uow, family_id, currency).await?)
    }

    async fn find_wallet_by_family(
        &self,
        uow: &mut Self::Uow,
        family_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(Wallet::find_by_family_locked(&mut **uow, family_id).await?)
    }

    async fn find_wallet(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(Wallet::find_by_id_locked(&mut **uow, wallet_id).await?)
    }

    async fn list_wallets(&self, uow: &mut Self::Uow) -> Result<Vec<Wallet>, StoreError> {
        Ok(Wallet::list_all(&mut **uow).await?)
    }

    async fn append_transaction(
        &self,
        uow: &mut Self::Uow,
        transaction: NewWalletTransaction,
    ) -> Result<Uuid, StoreError> {
        let request_id = transaction.external_chore_id;

        match WalletTransaction::insert(&mut **uow, transaction).await {
            Ok(row) => Ok(row.id),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some(PENDING_HOLD_INDEX) =>
            {
                Err(StoreError::DuplicateHold(request_id.unwrap_or_default()))
            }
            Err(e) => Err(e.into()),
        }
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

        let updated = Wallet::set_balance(&mut **uow, wallet_id, new_balance_cents).await?;
        if updated == 0 {
            return Err(StoreError::WalletInactive(wallet_id));
        }

        Ok(())
    }

    async fn deactivate_wallet(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
    ) -> Result<(), StoreError> {
        let updated = Wallet::deactivate(&mut **uow, wallet_id).await?;
        if updated == 0 {
            return Err(StoreError::RowNotFound(format!("wallet {}", wallet_id)));
        }
        Ok(())
    }

    async fn pending_holds(
        &self,
        uow: &mut Self::Uow,
        external_chore_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        Ok(WalletTransaction::pending_holds_locked(&mut **uow, external_chore_id).await?)
    }

    async fn set_transaction_status(
        &self,
        uow: &mut Self::Uow,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), StoreError> {
        let updated = WalletTransaction::set_status(&mut **uow, transaction_id, status).await?;
        if updated == 0 {
            return Err(StoreError::RowNotFound(format!(
                "wallet transaction {}",
                transaction_id
            )));
        }
        Ok(())
    }

    async fn list_transactions(
        &self,
        uow: &mut Self::Uow,
        wallet_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        Ok(WalletTransaction::list_by_wallet(&mut **uow, wallet_id, limit).await?)
    }

    async fn find_chore_request(
        &self,
        uow: &mut Self::Uow,
        request_id: Uuid,
    ) -> Result<Option<ExternalChoreRequest>, StoreError> {
        Ok(ExternalChoreRequest::find_by_id_locked(&mut **uow, request_id).await?)
    }

    async fn save_chore_request(
        &self,
        uow: &mut Self::Uow,
        request: &ExternalChoreRequest,
    ) -> Result<(), StoreError> {
        let updated = ExternalChoreRequest::save_workflow_state(&mut **uow, request).await?;
        if updated == 0 {
            return Err(StoreError::RowNotFound(format!("chore request {}", request.id)));
        }
        Ok(())
    }

    async fn insert_approval(
        &self,
        uow: &mut Self::Uow,
        approval: NewParentApproval,
    ) -> Result<ParentApproval, StoreError> {
        Ok(ParentApproval::insert(&mut **uow, approval).await?)
    }

    async fn list_approvals(
        &self,
        uow: &mut Self::Uow,
        request_id: Uuid,
    ) -> Result<Vec<ParentApproval>, StoreError> {
        Ok(ParentApproval::list_by_request(&mut **uow, request_id).await?)
    }
}

#[async_trait]
impl ContactDirectory for PgLedgerStore {
    async fn get_contact(&self, contact_id: Uuid) -> Result<Option<TrustedContact>, StoreError> {
        Ok(TrustedContact::find_by_id(&self.pool, contact_id).await?)
    }
}

/// These run against a real database and are skipped unless `DATABASE_URL`
/// points at a disposable Postgres instance.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EscrowError;
    use crate::models::{TransactionKind, TransactionStatus};
    use crate::services::approval::{ApprovalCoordinator, ApprovalLimits, ApproveInput};
    use crate::services::ledger::{DepositLimits, WalletLedger};
    use crate::services::notifier::LogNotifier;
    use secrecy::Secret;
    use std::sync::Arc;

    async fn connect() -> Option<PgLedgerStore> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            return None;
        };
        let pool = crate::db::create_pool(&Secret::new(url)).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        Some(PgLedgerStore::new(pool))
    }

    async fn insert_request(store: &PgLedgerStore, family_id: Uuid, offered_cents: i64) -> Uuid {
        sqlx::query_scalar(
            r#"
            INSERT INTO external_chore_requests (
                family_id, child_id, title, offered_amount_cents, payment_mode
            )
            VALUES ($1, $2, 'Mow the lawn', $3, 'in_app')
            RETURNING id
            "#,
        )
        .bind(family_id)
        .bind(Uuid::new_v4())
        .bind(offered_cents)
        .fetch_one(&store.pool)
        .await
        .unwrap()
    }

    fn coordinator(store: &Arc<PgLedgerStore>) -> Arc<ApprovalCoordinator<PgLedgerStore>> {
        let ledger = WalletLedger::new(store.clone(), DepositLimits::default(), "USD");
        Arc::new(ApprovalCoordinator::new(
            store.clone(),
            ledger,
            Arc::new(LogNotifier),
            ApprovalLimits::default(),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_first_use_creates_one_wallet() {
        let Some(store) = connect().await else { return };
        let store = Arc::new(store);
        let family_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut uow = store.begin().await.unwrap();
                let wallet = store
                    .get_or_create_wallet(&mut uow, family_id, "USD")
                    .await
                    .unwrap();
                store.commit(uow).await.unwrap();
                wallet.id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_hold_index_reports_duplicate_hold() {
        let Some(store) = connect().await else { return };
        let family_id = Uuid::new_v4();
        let request_id = insert_request(&store, family_id, 500).await;

        let mut uow = store.begin().await.unwrap();
        let wallet = store
            .get_or_create_wallet(&mut uow, family_id, "USD")
            .await
            .unwrap();
        let hold = || NewWalletTransaction {
            wallet_id: wallet.id,
            external_chore_id: Some(request_id),
            amount_cents: -500,
            kind: TransactionKind::Hold,
            status: TransactionStatus::Pending,
            description: "hold".to_string(),
        };

        store.append_transaction(&mut uow, hold()).await.unwrap();
        let err = store.append_transaction(&mut uow, hold()).await.unwrap_err();
        store.rollback(uow).await.unwrap();

        assert!(matches!(err, StoreError::DuplicateHold(id) if id == request_id));
    }

    #[tokio::test]
    async fn test_concurrent_approvals_place_exactly_one_hold() {
        let Some(store) = connect().await else { return };
        let store = Arc::new(store);
        let coordinator = coordinator(&store);
        let family_id = Uuid::new_v4();
        coordinator.deposit(family_id, 5_000, None).await.unwrap();
        let request_id = insert_request(&store, family_id, 2_000).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .approve(request_id, family_id, ApproveInput::default())
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(EscrowError::InvalidStateTransition { .. })
                | Err(EscrowError::DuplicateHold(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(successes, 1);

        let mut uow = store.begin().await.unwrap();
        assert_eq!(store.pending_holds(&mut uow, request_id).await.unwrap().len(), 1);
        let wallet = store
            .find_wallet_by_family(&mut uow, family_id)
            .await
            .unwrap()
            .unwrap();
        store.rollback(uow).await.unwrap();
        assert_eq!(wallet.balance_cents, 3_000);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_cannot_overdraw() {
        let Some(store) = connect().await else { return };
        let store = Arc::new(store);
        let coordinator = coordinator(&store);
        let family_id = Uuid::new_v4();
        coordinator.deposit(family_id, 5_000, None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let request_id = insert_request(&store, family_id, 2_000).await;
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .approve(request_id, family_id, ApproveInput::default())
                    .await
            }));
        }

        let mut approved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => approved += 1,
                Err(EscrowError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(approved, 2);

        let summary = coordinator.wallet_summary(family_id).await.unwrap();
        assert_eq!(summary.wallet.unwrap().balance_cents, 1_000);
    }
}
