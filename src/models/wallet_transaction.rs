use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Hold,
    Debit,
    CancelledHold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Append-mostly ledger row. Only `status` and `processed_at` change after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub external_chore_id: Option<Uuid>,
    pub amount_cents: i64, // positive = credit, negative = hold/debit
    #[sqlx(rename = "type")]
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub wallet_id: Uuid,
    pub external_chore_id: Option<Uuid>,
    pub amount_cents: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub description: String,
}

impl WalletTransaction {
    /// Signed contribution of this row to the wallet balance.
    ///
    /// Cancelled holds contribute nothing and neither do the `cancelled_hold`
    /// entries written when they are released.
    pub fn balance_effect(&self) -> i64 {
        match (self.kind, self.status) {
            (TransactionKind::Credit, TransactionStatus::Completed) => self.amount_cents,
            (TransactionKind::Debit, TransactionStatus::Completed) => self.amount_cents,
            (TransactionKind::Hold, TransactionStatus::Pending) => self.amount_cents,
            (TransactionKind::Hold, TransactionStatus::Completed) => self.amount_cents,
            _ => 0,
        }
    }

    pub async fn insert(
        conn: &mut PgConnection,
        data: NewWalletTransaction,
    ) -> Result<Self, sqlx::Error> {
        let transaction = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO wallet_transactions (
                wallet_id, external_chore_id, amount_cents, type, status, description, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $5 = 'pending' THEN NULL ELSE NOW() END)
            RETURNING *
            "#,
        )
        .bind(data.wallet_id)
        .bind(data.external_chore_id)
        .bind(data.amount_cents)
        .bind(data.kind)
        .bind(data.status)
        .bind(&data.description)
        .fetch_one(conn)
        .await?;

        Ok(transaction)
    }

    /// Pending holds for a chore request, locked for the rest of the transaction
    pub async fn pending_holds_locked(
        conn: &mut PgConnection,
        external_chore_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let holds = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM wallet_transactions
            WHERE external_chore_id = $1 AND type = 'hold' AND status = 'pending'
            ORDER BY created_at
            FOR UPDATE
            "#,
        )
        .bind(external_chore_id)
        .fetch_all(conn)
        .await?;

        Ok(holds)
    }

    pub async fn set_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE wallet_transactions
            SET status = $2, processed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Lists a wallet's ledger rows, newest first
    pub async fn list_by_wallet(
        conn: &mut PgConnection,
        wallet_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let transactions = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(transactions)
    }
}
