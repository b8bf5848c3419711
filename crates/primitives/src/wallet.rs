//! Smart account records

use crate::{utils::as_checksum_addr, TransactionId};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Status of a smart account record
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    /// Owner reserved, creation not requested yet
    Pending,
    /// Creation requested (not necessarily deployed)
    Created,
    Failed,
}

/// Smart account owned by an externally owned address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    #[serde(serialize_with = "as_checksum_addr")]
    pub owner_address: Address,
    /// Factory prediction for `(owner_address, salt)`
    #[serde(serialize_with = "as_checksum_addr")]
    pub smart_account_address: Address,
    pub salt: U256,
    pub status: WalletStatus,
    pub creation_transaction_id: Option<TransactionId>,
    pub created_at: u64,
}

impl Wallet {
    /// Whether transactions can be queued on behalf of this wallet
    pub fn is_usable(&self) -> bool {
        self.status != WalletStatus::Failed && !self.smart_account_address.is_zero()
    }
}
