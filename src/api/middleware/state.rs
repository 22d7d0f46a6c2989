use std::sync::Arc;

use crate::services::approval::ApprovalCoordinator;
use crate::store::EscrowStore;

/// Application state shared by every handler
pub struct AppState<S: EscrowStore> {
    pub coordinator: Arc<ApprovalCoordinator<S>>,
}

impl<S: EscrowStore> AppState<S> {
    pub fn new(coordinator: ApprovalCoordinator<S>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}

// Manual impl: deriving would require `S: Clone`
impl<S: EscrowStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}
