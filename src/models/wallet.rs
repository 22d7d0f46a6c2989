use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

/// One wallet per family. Balances are integer minor units (cents).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub family_id: Uuid,
    pub balance_cents: i64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates the family's wallet if it does not exist yet, then locks and returns it.
    ///
    /// `ON CONFLICT DO NOTHING` on the unique `family_id` makes concurrent first use
    /// converge on a single row.
    pub async fn get_or_create_locked(
        conn: &mut PgConnection,
        family_id: Uuid,
        currency: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wallets (family_id, currency)
            VALUES ($1, $2)
            ON CONFLICT (family_id) DO NOTHING
            "#,
        )
        .bind(family_id)
        .bind(currency)
        .execute(&mut *conn)
        .await?;

        Self::find_by_family_locked(conn, family_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Finds a family's wallet and takes a row lock for the rest of the transaction
    pub async fn find_by_family_locked(
        conn: &mut PgConnection,
        family_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let wallet = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM wallets WHERE family_id = $1 FOR UPDATE
            "#,
        )
        .bind(family_id)
        .fetch_optional(conn)
        .await?;

        Ok(wallet)
    }

    /// Finds a wallet by id and takes a row lock for the rest of the transaction
    pub async fn find_by_id_locked(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let wallet = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM wallets WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(wallet)
    }

    pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        let wallets = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM wallets ORDER BY created_at
            "#,
        )
        .fetch_all(conn)
        .await?;

        Ok(wallets)
    }

    /// Writes a new balance. Returns the number of rows touched, which is zero
    /// when the wallet is inactive.
    pub async fn set_balance(
        conn: &mut PgConnection,
        id: Uuid,
        balance_cents: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance_cents = $2, updated_at = NOW()
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(id)
        .bind(balance_cents)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn deactivate(conn: &mut PgConnection, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
