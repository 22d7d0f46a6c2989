use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Modified,
    Rejected,
}

/// Immutable record of one parent decision on a chore request
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ParentApproval {
    pub id: Uuid,
    pub external_chore_id: Uuid,
    pub parent_family_id: Uuid,
    pub decision: ApprovalDecision,
    pub original_amount_cents: i64,
    pub approved_amount_cents: i64, // 0 when rejected
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewParentApproval {
    pub external_chore_id: Uuid,
    pub parent_family_id: Uuid,
    pub decision: ApprovalDecision,
    pub original_amount_cents: i64,
    pub approved_amount_cents: i64,
    pub notes: Option<String>,
}

impl ParentApproval {
    pub async fn insert(
        conn: &mut PgConnection,
        data: NewParentApproval,
    ) -> Result<Self, sqlx::Error> {
        let approval = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO parent_approvals (
                external_chore_id, parent_family_id, decision,
                original_amount_cents, approved_amount_cents, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.external_chore_id)
        .bind(data.parent_family_id)
        .bind(data.decision)
        .bind(data.original_amount_cents)
        .bind(data.approved_amount_cents)
        .bind(&data.notes)
        .fetch_one(conn)
        .await?;

        Ok(approval)
    }

    /// Decision history for a request, oldest first
    pub async fn list_by_request(
        conn: &mut PgConnection,
        external_chore_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let approvals = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM parent_approvals
            WHERE external_chore_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(external_chore_id)
        .fetch_all(conn)
        .await?;

        Ok(approvals)
    }
}
