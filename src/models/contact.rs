use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// External party who may commission a chore. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrustedContact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_verified: bool,
}

impl TrustedContact {
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let contact = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, name, email, phone, is_verified FROM trusted_contacts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(contact)
    }
}
