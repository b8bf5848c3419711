//! Queued relayer transactions

use crate::{
    utils::{as_checksum_addr, as_checksum_addr_opt},
    UserOperationHash,
};
use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use rustc_hex::FromHexError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum_macros::{AsRefStr, Display, EnumString};

/// Content-addressed identifier of a queued transaction
#[derive(
    Eq, Hash, PartialEq, Debug, Serialize, Deserialize, Clone, Copy, Default, PartialOrd, Ord,
)]
#[serde(transparent)]
pub struct TransactionId(pub H256);

impl TransactionId {
    /// Derives the identifier from the intent's content and its creation time
    ///
    /// `derivation_nonce` is bumped by the queue in the unlikely case two identical intents are
    /// enqueued within the same millisecond.
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        owner: &Address,
        target: &Address,
        value: &U256,
        call_data: &Bytes,
        kind: OperationKind,
        created_at: u64,
        derivation_nonce: u64,
    ) -> Self {
        let encoded = abi::encode(&[
            Token::Address(*owner),
            Token::Address(*target),
            Token::Uint(*value),
            Token::FixedBytes(keccak256(call_data).to_vec()),
            Token::Uint(U256::from(kind as u8)),
            Token::Uint(U256::from(created_at)),
            Token::Uint(U256::from(derivation_nonce)),
        ]);
        Self(H256::from(keccak256(encoded)))
    }

    #[inline]
    pub const fn as_fixed_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

impl From<H256> for TransactionId {
    fn from(value: H256) -> Self {
        Self(value)
    }
}

impl From<[u8; 32]> for TransactionId {
    fn from(value: [u8; 32]) -> Self {
        Self(H256::from(value))
    }
}

impl FromStr for TransactionId {
    type Err = FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        H256::from_str(s).map(|h| h.into())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Status of a queued transaction
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
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

/// What a queued transaction does on chain
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
#[repr(u8)]
pub enum OperationKind {
    /// Deploys a smart account through the factory (no smart account required)
    AccountCreation = 0,
    CredentialIssuance = 1,
    CredentialVerification = 2,
    CredentialRevocation = 3,
    /// Arbitrary call on behalf of an external collaborator
    Call = 4,
}

impl OperationKind {
    /// Whether the transaction is relayed as a user operation through the entry point
    pub fn is_user_operation(&self) -> bool {
        !matches!(self, OperationKind::AccountCreation)
    }
}

/// One relayer intent and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTransaction {
    pub transaction_id: TransactionId,
    #[serde(serialize_with = "as_checksum_addr")]
    pub owner_address: Address,
    /// Sender of the user operation, `None` for account creation
    #[serde(serialize_with = "as_checksum_addr_opt")]
    pub smart_account_address: Option<Address>,
    #[serde(serialize_with = "as_checksum_addr")]
    pub target: Address,
    pub value: U256,
    pub call_data: Bytes,
    pub operation_kind: OperationKind,
    pub description: String,
    pub status: TransactionStatus,
    pub attempts: u32,
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub user_operation_hash: Option<UserOperationHash>,
    pub last_error: Option<String>,
    /// Set when the confirmed status was established by reconciliation instead of a receipt
    #[serde(default)]
    pub reconciled: bool,
    /// On-chain identifier of the entity the transaction created (e.g. credential id)
    pub entity_id: Option<U256>,
    pub created_at: u64,
    pub processed_at: Option<u64>,
}

impl QueuedTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction_id: TransactionId,
        owner_address: Address,
        smart_account_address: Option<Address>,
        target: Address,
        value: U256,
        call_data: Bytes,
        operation_kind: OperationKind,
        description: String,
        created_at: u64,
    ) -> Self {
        Self {
            transaction_id,
            owner_address,
            smart_account_address,
            target,
            value,
            call_data,
            operation_kind,
            description,
            status: TransactionStatus::Pending,
            attempts: 0,
            tx_hash: None,
            block_number: None,
            user_operation_hash: None,
            last_error: None,
            reconciled: false,
            entity_id: None,
            created_at,
            processed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TransactionStatus::Confirmed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TransactionStatus::Failed
    }

    /// Records a mined, successful inclusion
    pub fn confirm(&mut self, tx_hash: H256, block_number: u64, now: u64) {
        self.status = TransactionStatus::Confirmed;
        self.tx_hash = Some(tx_hash);
        self.block_number = Some(block_number);
        self.processed_at = Some(now);
    }

    /// Records a submission failure, keeping the error text verbatim
    pub fn fail(&mut self, error: impl Into<String>, now: u64) {
        self.status = TransactionStatus::Failed;
        self.last_error = Some(error.into());
        self.processed_at = Some(now);
    }

    /// Flips the record to confirmed on the strength of on-chain evidence
    pub fn mark_reconciled(&mut self, entity_id: Option<U256>, now: u64) {
        self.status = TransactionStatus::Confirmed;
        self.reconciled = true;
        if entity_id.is_some() {
            self.entity_id = entity_id;
        }
        self.processed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(created_at: u64, nonce: u64) -> TransactionId {
        TransactionId::derive(
            &Address::repeat_byte(1),
            &Address::repeat_byte(2),
            &U256::zero(),
            &Bytes::from(vec![0xde, 0xad]),
            OperationKind::Call,
            created_at,
            nonce,
        )
    }

    #[test]
    fn transaction_id_depends_on_content_and_time() {
        assert_eq!(id(1, 0), id(1, 0));
        assert_ne!(id(1, 0), id(2, 0));
        assert_ne!(id(1, 0), id(1, 1));

        let other_kind = TransactionId::derive(
            &Address::repeat_byte(1),
            &Address::repeat_byte(2),
            &U256::zero(),
            &Bytes::from(vec![0xde, 0xad]),
            OperationKind::CredentialIssuance,
            1,
            0,
        );
        assert_ne!(id(1, 0), other_kind);
    }

    #[test]
    fn transaction_id_parses_own_display() {
        let tx_id = id(42, 0);
        assert_eq!(tx_id.to_string().parse::<TransactionId>().unwrap(), tx_id);
    }

    #[test]
    fn status_serialization() {
        assert_eq!(serde_json::to_string(&TransactionStatus::Pending).unwrap(), "\"PENDING\"");
        assert_eq!(
            "ACCOUNT_CREATION".parse::<OperationKind>().unwrap(),
            OperationKind::AccountCreation
        );
        assert_eq!(OperationKind::CredentialRevocation.to_string(), "CREDENTIAL_REVOCATION");
        assert!(!OperationKind::AccountCreation.is_user_operation());
        assert!(OperationKind::Call.is_user_operation());
    }

    #[test]
    fn reconciliation_keeps_known_entity() {
        let mut tx = QueuedTransaction::new(
            id(1, 0),
            Address::repeat_byte(1),
            Some(Address::repeat_byte(3)),
            Address::repeat_byte(2),
            U256::zero(),
            Bytes::default(),
            OperationKind::CredentialIssuance,
            "issue".into(),
            1,
        );
        tx.fail("already known", 2);
        assert!(tx.is_failed());

        tx.mark_reconciled(Some(7.into()), 3);
        tx.mark_reconciled(None, 4);
        assert!(tx.is_confirmed());
        assert!(tx.reconciled);
        assert_eq!(tx.entity_id, Some(7.into()));
        assert_eq!(tx.last_error.as_deref(), Some("already known"));
    }
}
