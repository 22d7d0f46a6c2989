use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ChoreStatus;
use crate::services::chore_state::ChoreAction;
use crate::store::StoreError;

/// Outcome of every ledger and workflow operation that did not succeed.
/// None of these leave a partial write behind.
#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Insufficient funds: requested {requested_cents}, available {available_cents}")]
    InsufficientFunds {
        requested_cents: i64,
        available_cents: i64,
    },

    #[error("Cannot {action} a request that is {from}")]
    InvalidStateTransition {
        from: ChoreStatus,
        action: ChoreAction,
    },

    #[error("A pending hold already exists for request {0}")]
    DuplicateHold(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Wallet {0} is inactive")]
    WalletInactive(Uuid),

    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for EscrowError {
    fn from(err: StoreError) -> Self {
        match err {
            // Backstop: the ledger checks funds before writing
            StoreError::NegativeBalance { balance_cents, .. } => EscrowError::InsufficientFunds {
                requested_cents: balance_cents.saturating_neg(),
                available_cents: 0,
            },
            StoreError::WalletInactive(id) => EscrowError::WalletInactive(id),
            StoreError::DuplicateHold(request_id) => EscrowError::DuplicateHold(request_id),
            StoreError::RowNotFound(what) => EscrowError::NotFound(what),
            other => EscrowError::Storage(other),
        }
    }
}

impl EscrowError {
    /// Stable code returned to HTTP callers
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::InsufficientFunds { .. } => "InsufficientFunds",
            EscrowError::InvalidStateTransition {
                action: ChoreAction::Complete | ChoreAction::Settle,
                ..
            } => "NotApproved",
            EscrowError::InvalidStateTransition { .. } => "AlreadyDecided",
            EscrowError::DuplicateHold(_) => "DuplicateHold",
            EscrowError::NotFound(_) => "NotFound",
            EscrowError::Validation(_) => "ValidationError",
            EscrowError::WalletInactive(_) => "WalletInactive",
            EscrowError::Storage(_) => "StorageFailure",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EscrowError::InsufficientFunds { .. }
            | EscrowError::InvalidStateTransition { .. }
            | EscrowError::DuplicateHold(_)
            | EscrowError::WalletInactive(_) => StatusCode::CONFLICT,
            EscrowError::NotFound(_) => StatusCode::NOT_FOUND,
            EscrowError::Validation(_) => StatusCode::BAD_REQUEST,
            EscrowError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Escrow(err) => {
                if let EscrowError::Storage(source) = err {
                    tracing::error!(error = %source, "Storage failure");
                }
                (err.status(), err.code(), err.to_string())
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "A trusted family id is required".to_string(),
            ),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_codes_depend_on_action() {
        let approve = EscrowError::InvalidStateTransition {
            from: ChoreStatus::Approved,
            action: ChoreAction::Approve,
        };
        let complete = EscrowError::InvalidStateTransition {
            from: ChoreStatus::AwaitingParent,
            action: ChoreAction::Complete,
        };

        assert_eq!(approve.code(), "AlreadyDecided");
        assert_eq!(complete.code(), "NotApproved");
        assert_eq!(approve.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_errors_map_to_domain_errors() {
        let wallet_id = Uuid::new_v4();

        let err: EscrowError = StoreError::WalletInactive(wallet_id).into();
        assert!(matches!(err, EscrowError::WalletInactive(id) if id == wallet_id));

        let err: EscrowError = StoreError::NegativeBalance {
            wallet_id,
            balance_cents: -250,
        }
        .into();
        assert!(matches!(
            err,
            EscrowError::InsufficientFunds { requested_cents: 250, .. }
        ));

        let request_id = Uuid::new_v4();
        let err: EscrowError = StoreError::DuplicateHold(request_id).into();
        assert!(matches!(err, EscrowError::DuplicateHold(id) if id == request_id));
        assert_eq!(err.code(), "DuplicateHold");

        let err: EscrowError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.code(), "StorageFailure");
    }

    #[test]
    fn test_unauthorized_response_status() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
