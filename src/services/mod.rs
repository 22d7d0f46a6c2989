// Services module - Business logic

pub mod approval;
pub mod chore_state;
pub mod ledger;
pub mod notifier;
