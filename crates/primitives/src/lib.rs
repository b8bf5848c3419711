//! Credence primitive types
//!
//! This crate contains the account abstraction (ERC-4337) user operation type together with the
//! records the relayer keeps: queued transactions, smart-account wallets and credentials.

pub mod clock;
pub mod constants;
mod credential;
mod gas;
pub mod provider;
mod transaction;
mod user_operation;
mod utils;
mod wallet;

pub use clock::{Clock, SystemClock};
pub use credential::{
    Credential, CredentialDraft, CredentialId, OnChainCredential, OnChainStatus,
    VerificationDecision, VerificationStatus,
};
pub use gas::{apply_gas_multiplier, div_ceil, Overhead};
pub use transaction::{OperationKind, QueuedTransaction, TransactionId, TransactionStatus};
pub use user_operation::{UserOperationHash, UserOperationSigned};
pub use utils::{as_checksum_addr, as_checksum_addr_opt, get_address};
pub use wallet::{Wallet, WalletStatus};
