use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// Header set by the upstream session layer once it has authenticated the caller
pub const FAMILY_ID_HEADER: &str = "x-family-id";

/// Trusted id of the acting family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for FamilyId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let family_id = parts
            .headers
            .get(FAMILY_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or(AppError::Unauthorized)?;

        Ok(FamilyId(family_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<FamilyId, AppError> {
        let mut builder = Request::builder().uri("/wallet");
        if let Some(value) = header {
            builder = builder.header(FAMILY_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        FamilyId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_family_id() {
        let id = Uuid::new_v4();
        let family = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(family, FamilyId(id));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_family_id_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized)));
        assert!(matches!(
            extract(Some("family-42")).await,
            Err(AppError::Unauthorized)
        ));
    }
}
