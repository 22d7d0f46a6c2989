//! Wallet Ledger Service.
//!
//! The only code allowed to change a wallet balance. Every balance write is
//! paired with its ledger row inside the caller's unit of work.
//!
//! In-app payments follow hold-then-settle-or-release: funds leave the
//! spendable balance when a parent approves, and are either settled (no
//! further balance change) or released back.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::models::{NewWalletTransaction, TransactionKind, TransactionStatus, Wallet};
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy)]
pub struct DepositLimits {
    pub min_cents: i64,
    pub max_cents: i64,
}

impl Default for DepositLimits {
    fn default() -> Self {
        Self {
            min_cents: 100,
            max_cents: 100_000,
        }
    }
}

/// Result of a single balance-changing ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub wallet_id: Uuid,
    pub transaction_id: Uuid,
    pub balance_cents: i64,
}

pub struct WalletLedger<S: LedgerStore> {
    store: Arc<S>,
    limits: DepositLimits,
    currency: String,
}

impl<S: LedgerStore> WalletLedger<S> {
    pub fn new(store: Arc<S>, limits: DepositLimits, currency: impl Into<String>) -> Self {
        Self {
            store,
            limits,
            currency: currency.into(),
        }
    }

    /// Adds funds and appends a completed credit
    pub async fn deposit(
        &self,
        uow: &mut S::Uow,
        family_id: Uuid,
        amount_cents: i64,
        description: &str,
    ) -> Result<LedgerReceipt, EscrowError> {
        if amount_cents < self.limits.min_cents || amount_cents > self.limits.max_cents {
            return Err(EscrowError::Validation(format!(
                "Deposit must be between {} and {} cents",
                self.limits.min_cents, self.limits.max_cents
            )));
        }

        let wallet = self.active_wallet(uow, family_id).await?;
        let new_balance = wallet
            .balance_cents
            .checked_add(amount_cents)
            .ok_or_else(|| EscrowError::Validation("Balance overflow".to_string()))?;

        let transaction_id = self
            .store
            .append_transaction(
                uow,
                NewWalletTransaction {
                    wallet_id: wallet.id,
                    external_chore_id: None,
                    amount_cents,
                    kind: TransactionKind::Credit,
                    status: TransactionStatus::Completed,
                    description: description.to_string(),
                },
            )
            .await?;
        self.store
            .update_wallet_balance(uow, wallet.id, new_balance)
            .await?;

        tracing::info!(
            wallet_id = %wallet.id,
            amount_cents,
            balance_cents = new_balance,
            "Deposit recorded"
        );

        Ok(LedgerReceipt {
            wallet_id: wallet.id,
            transaction_id,
            balance_cents: new_balance,
        })
    }

    /// Reserves `amount_cents` against a chore request.
    ///
    /// At most one pending hold may exist per request; a second one is a
    /// caller error rather than being merged.
    pub async fn place_hold(
        &self,
        uow: &mut S::Uow,
        family_id: Uuid,
        amount_cents: i64,
        request_id: Uuid,
        description: &str,
    ) -> Result<LedgerReceipt, EscrowError> {
        if amount_cents <= 0 {
            return Err(EscrowError::Validation(
                "Hold amount must be positive".to_string(),
            ));
        }

        let wallet = self.active_wallet(uow, family_id).await?;

        if !self.store.pending_holds(uow, request_id).await?.is_empty() {
            return Err(EscrowError::DuplicateHold(request_id));
        }

        if amount_cents > wallet.balance_cents {
            return Err(EscrowError::InsufficientFunds {
                requested_cents: amount_cents,
                available_cents: wallet.balance_cents,
            });
        }

        let new_balance = wallet.balance_cents - amount_cents;
        let transaction_id = self
            .store
            .append_transaction(
                uow,
                NewWalletTransaction {
                    wallet_id: wallet.id,
                    external_chore_id: Some(request_id),
                    amount_cents: -amount_cents,
                    kind: TransactionKind::Hold,
                    status: TransactionStatus::Pending,
                    description: description.to_string(),
                },
            )
            .await?;
        self.store
            .update_wallet_balance(uow, wallet.id, new_balance)
            .await?;

        tracing::info!(
            wallet_id = %wallet.id,
            request_id = %request_id,
            amount_cents,
            balance_cents = new_balance,
            "Hold placed"
        );

        Ok(LedgerReceipt {
            wallet_id: wallet.id,
            transaction_id,
            balance_cents: new_balance,
        })
    }

    /// Returns every pending hold for the request to its wallet.
    ///
    /// Idempotent: with no pending hold this is a no-op returning 0, so a retry
    /// after an ambiguous failure can never over-credit.
    pub async fn release_hold(
        &self,
        uow: &mut S::Uow,
        request_id: Uuid,
    ) -> Result<i64, EscrowError> {
        let holds = self.store.pending_holds(uow, request_id).await?;
        let mut released_cents = 0;

        for hold in holds {
            let wallet = self
                .store
                .find_wallet(uow, hold.wallet_id)
                .await?
                .ok_or_else(|| EscrowError::NotFound(format!("wallet {}", hold.wallet_id)))?;

            let amount = hold.amount_cents.abs();
            let new_balance = wallet.balance_cents + amount;

            self.store
                .set_transaction_status(uow, hold.id, TransactionStatus::Cancelled)
                .await?;
            self.store
                .append_transaction(
                    uow,
                    NewWalletTransaction {
                        wallet_id: wallet.id,
                        external_chore_id: Some(request_id),
                        amount_cents: amount,
                        kind: TransactionKind::CancelledHold,
                        status: TransactionStatus::Completed,
                        description: format!("Released hold: {}", hold.description),
                    },
                )
                .await?;
            self.store
                .update_wallet_balance(uow, wallet.id, new_balance)
                .await?;

            tracing::info!(
                wallet_id = %wallet.id,
                request_id = %request_id,
                amount_cents = amount,
                balance_cents = new_balance,
                "Hold released"
            );

            released_cents += amount;
        }

        Ok(released_cents)
    }

    /// Turns the pending hold into the final payment. The funds already left
    /// the balance when the hold was placed, so the balance is untouched.
    ///
    /// Returns `false` when there was no pending hold.
    pub async fn settle_hold(&self, uow: &mut S::Uow, request_id: Uuid) -> Result<bool, EscrowError> {
        let holds = self.store.pending_holds(uow, request_id).await?;
        if holds.is_empty() {
            return Ok(false);
        }

        for hold in &holds {
            self.store
                .set_transaction_status(uow, hold.id, TransactionStatus::Completed)
                .await?;

            tracing::info!(
                wallet_id = %hold.wallet_id,
                request_id = %request_id,
                amount_cents = hold.amount_cents.abs(),
                "Hold settled"
            );
        }

        Ok(true)
    }

    async fn active_wallet(&self, uow: &mut S::Uow, family_id: Uuid) -> Result<Wallet, EscrowError> {
        let wallet = self
            .store
            .get_or_create_wallet(uow, family_id, &self.currency)
            .await?;

        if !wallet.is_active {
            return Err(EscrowError::WalletInactive(wallet.id));
        }

        Ok(wallet)
    }
}
