use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::store::{LedgerStore, StoreError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AuditStats {
    pub wallets_checked: usize,
    pub mismatches: usize,
}

/// Background job that reconciles every wallet balance against its ledger
///
/// For each wallet, in its own unit of work:
/// 1. Lock the wallet row
/// 2. Sum the balance effect of every ledger row
/// 3. Log an error when the sum differs from the stored balance
///
/// Nothing is repaired automatically.
pub async fn audit_wallets<S: LedgerStore>(store: &S) -> Result<AuditStats, StoreError> {
    let mut stats = AuditStats::default();

    let mut uow = store.begin().await?;
    let wallets = store.list_wallets(&mut uow).await?;
    store.rollback(uow).await?;

    tracing::info!(total_wallets = wallets.len(), "Starting ledger audit");

    for wallet in wallets {
        match audit_single_wallet(store, wallet.id).await {
            Ok(AuditResult::Consistent) => stats.wallets_checked += 1,
            Ok(AuditResult::Mismatch) => {
                stats.wallets_checked += 1;
                stats.mismatches += 1;
            }
            Ok(AuditResult::Gone) => {}
            Err(e) => {
                tracing::error!(wallet_id = %wallet.id, error = %e, "Ledger audit failed for wallet");
            }
        }
    }

    tracing::info!(?stats, "Ledger audit completed");

    Ok(stats)
}

enum AuditResult {
    Consistent,
    Mismatch,
    Gone,
}

async fn audit_single_wallet<S: LedgerStore>(
    store: &S,
    wallet_id: Uuid,
) -> Result<AuditResult, StoreError> {
    let mut uow = store.begin().await?;

    let Some(wallet) = store.find_wallet(&mut uow, wallet_id).await? else {
        store.rollback(uow).await?;
        return Ok(AuditResult::Gone);
    };

    let transactions = store.list_transactions(&mut uow, wallet_id, None).await?;
    store.rollback(uow).await?;

    let ledger_balance: i64 = transactions.iter().map(|t| t.balance_effect()).sum();

    if ledger_balance == wallet.balance_cents {
        return Ok(AuditResult::Consistent);
    }

    tracing::error!(
        wallet_id = %wallet.id,
        family_id = %wallet.family_id,
        stored_balance_cents = wallet.balance_cents,
        ledger_balance_cents = ledger_balance,
        "Wallet balance does not match its ledger"
    );

    Ok(AuditResult::Mismatch)
}

/// Schedules [`audit_wallets`] with a six-field cron expression and starts
/// the scheduler. The returned handle must be kept alive.
pub async fn start_scheduler<S: LedgerStore>(
    store: Arc<S>,
    schedule: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_id, _lock| {
        let store = store.clone();
        Box::pin(async move {
            if let Err(e) = audit_wallets(store.as_ref()).await {
                tracing::error!(error = %e, "Ledger audit could not run");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule, "Ledger audit scheduled");

    Ok(scheduler)
}
