pub mod body;
pub mod identity;
pub mod state;

pub use body::{JsonBody, OptionalJsonBody};
pub use identity::{FamilyId, FAMILY_ID_HEADER};
pub use state::AppState;
