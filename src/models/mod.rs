// Models module - Database entity representations

pub mod chore_request;
pub mod contact;
pub mod parent_approval;
pub mod wallet;
pub mod wallet_transaction;

pub use chore_request::{ChoreStatus, ExternalChoreRequest, PaymentMode};
pub use contact::TrustedContact;
pub use parent_approval::{ApprovalDecision, NewParentApproval, ParentApproval};
pub use wallet::Wallet;
pub use wallet_transaction::{
    NewWalletTransaction, TransactionKind, TransactionStatus, WalletTransaction,
};
