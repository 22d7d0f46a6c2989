// Background jobs

pub mod ledger_audit;

pub use ledger_audit::{audit_wallets, start_scheduler, AuditStats};
