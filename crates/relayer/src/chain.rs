//! Narrow view of the chain the relayer needs

use async_trait::async_trait;
use credence_contracts::ContractCallError;
use credence_primitives::{OnChainCredential, UserOperationHash, UserOperationSigned};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Chain error
///
/// Node messages are kept verbatim (see [classify_failure](crate::classify_failure)).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error(transparent)]
    Contract(#[from] ContractCallError),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("{0}")]
    Provider(String),
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    /// Transaction status (`status == 1`)
    pub success: bool,
    /// `UserOperationEvent`s emitted by the entry point
    pub user_operations: Vec<(UserOperationHash, bool)>,
    /// Ids from `CredentialIssued` events
    pub issued_credentials: Vec<U256>,
}

impl ChainReceipt {
    /// Outcome of the given user operation, `None` if the receipt does not mention it
    pub fn user_operation_success(&self, hash: &UserOperationHash) -> Option<bool> {
        self.user_operations.iter().find(|(h, _)| h == hash).map(|(_, success)| *success)
    }
}

/// Reads and writes the relayer performs against the chain
///
/// Writes are signed with the relayer key held by the implementation.
#[async_trait]
pub trait ChainClient: Send + Sync + Debug + 'static {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Entry point nonce of the smart account (key 0)
    async fn get_nonce(&self, sender: &Address) -> Result<U256, ChainError>;

    /// `(max_fee_per_gas, max_priority_fee_per_gas)`
    async fn estimate_fees(&self) -> Result<(U256, U256), ChainError>;

    /// Gas used by the entry point calling the account with `call_data`
    async fn estimate_call_gas(&self, sender: &Address, call_data: &Bytes)
        -> Result<U256, ChainError>;

    /// Broadcasts `handleOps(ops, beneficiary)` and returns the transaction hash
    async fn handle_ops(
        &self,
        ops: Vec<UserOperationSigned>,
        beneficiary: Address,
    ) -> Result<H256, ChainError>;

    /// Broadcasts a plain transaction from the relayer account
    async fn send_transaction(&self, to: Address, value: U256, data: Bytes)
        -> Result<H256, ChainError>;

    /// Receipt of a mined transaction, `None` while pending or unknown
    async fn receipt(&self, tx_hash: &H256) -> Result<Option<ChainReceipt>, ChainError>;

    /// Factory prediction of the smart account address
    async fn get_account_address(&self, owner: &Address, salt: U256)
        -> Result<Address, ChainError>;

    async fn is_deployed(&self, address: &Address) -> Result<bool, ChainError>;

    /// Registry ids issued to `subject`, oldest first
    async fn issued_credentials(&self, subject: &Address) -> Result<Vec<U256>, ChainError>;

    async fn get_credential(&self, id: U256) -> Result<Option<OnChainCredential>, ChainError>;

    async fn owner_of(&self, id: U256) -> Result<Option<Address>, ChainError>;
}
