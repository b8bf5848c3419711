//! Credence smart contract bindings
//!
//! Bindings for the ERC-4337 v0.6 entry point, the SimpleAccount wallet and its factory, and the
//! credential registry, plus helpers to encode their calls and decode their events.

pub mod account;
pub mod entry_point;
mod error;
mod gen;
pub mod registry;

pub use account::{create_account_call_data, execute_call_data, AccountFactory};
pub use entry_point::{user_operation_outcomes, EntryPoint};
pub use error::{decode_revert_string, ContractCallError};
pub use gen::{function_name, FailedOp, UserOperationEventFilter};
pub use registry::{
    issue_credential_call_data, issued_credentials, revoke_credential_call_data,
    verify_credential_call_data, CredentialIssuedFilter, CredentialRegistry,
};
