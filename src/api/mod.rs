// API module - HTTP endpoints

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::store::EscrowStore;

pub mod chores;
pub mod health;
pub mod middleware;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;

pub use middleware::{AppState, FamilyId, FAMILY_ID_HEADER};

/// Full HTTP surface with request tracing
pub fn app<S: EscrowStore>(state: AppState<S>) -> Router {
    Router::new()
        .merge(health::router::<S>())
        .merge(chores::router::<S>())
        .merge(wallet::router::<S>())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
