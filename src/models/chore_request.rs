use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChoreStatus {
    AwaitingParent,
    Approved,
    Completed,
    Rejected,
}

impl fmt::Display for ChoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChoreStatus::AwaitingParent => "awaiting_parent",
            ChoreStatus::Approved => "approved",
            ChoreStatus::Completed => "completed",
            ChoreStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    InApp,
    Manual,
}

/// A chore a child performs for a trusted contact outside the family.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExternalChoreRequest {
    pub id: Uuid,
    pub family_id: Uuid,
    pub child_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub title: String,
    pub offered_amount_cents: i64, // fixed at creation
    pub approved_amount_cents: Option<i64>,
    pub payment_mode: PaymentMode,
    pub status: ChoreStatus,
    pub evidence_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExternalChoreRequest {
    /// Finds a request and locks its row so concurrent decisions serialize on it
    pub async fn find_by_id_locked(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let request = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM external_chore_requests WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(request)
    }

    /// Persists the mutable workflow fields. `offered_amount_cents` is never written.
    pub async fn save_workflow_state(
        conn: &mut PgConnection,
        request: &Self,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE external_chore_requests
            SET
                status = $2,
                approved_amount_cents = $3,
                evidence_url = $4,
                completed_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(request.id)
        .bind(request.status)
        .bind(request.approved_amount_cents)
        .bind(&request.evidence_url)
        .bind(request.completed_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
