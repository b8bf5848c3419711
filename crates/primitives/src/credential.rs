//! Credential records and their verification state machine

use crate::{utils::as_checksum_addr, TransactionId};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Caller-visible credential identifier
pub type CredentialId = u64;

/// Lifecycle of a credential
///
/// `PENDING -> PENDING_BLOCKCHAIN -> ISSUED -> PENDING_VERIFICATION -> VERIFIED | REJECTED`,
/// with `REVOKED` reachable from every non-revoked state.
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
pub enum VerificationStatus {
    Pending,
    PendingBlockchain,
    Issued,
    PendingVerification,
    Verified,
    Rejected,
    Revoked,
}

impl VerificationStatus {
    /// Terminal states are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, VerificationStatus::Revoked)
    }
}

/// Outcome passed to the registry's `verifyCredential`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum VerificationDecision {
    Verified = 1,
    Rejected = 2,
}

impl VerificationDecision {
    /// Status the credential reaches once the decision is confirmed on chain
    pub fn final_status(&self) -> VerificationStatus {
        match self {
            VerificationDecision::Verified => VerificationStatus::Verified,
            VerificationDecision::Rejected => VerificationStatus::Rejected,
        }
    }
}

/// Status stored by the credential registry contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnChainStatus {
    Pending,
    Verified,
    Rejected,
    Revoked,
    Unknown(u8),
}

impl From<u8> for OnChainStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => OnChainStatus::Pending,
            1 => OnChainStatus::Verified,
            2 => OnChainStatus::Rejected,
            3 => OnChainStatus::Revoked,
            other => OnChainStatus::Unknown(other),
        }
    }
}

impl OnChainStatus {
    /// Whether the registry reflects the given off-chain decision
    pub fn matches(&self, decision: VerificationDecision) -> bool {
        matches!(
            (self, decision),
            (OnChainStatus::Verified, VerificationDecision::Verified) |
                (OnChainStatus::Rejected, VerificationDecision::Rejected)
        )
    }
}

/// Credential as returned by the registry's `getCredential`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainCredential {
    pub issuer: Address,
    pub subject: Address,
    pub name: String,
    pub description: String,
    pub status: OnChainStatus,
}

/// Issuance request, as received from the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDraft {
    pub issuer: Address,
    pub subject: Address,
    pub title: String,
    pub description: String,
    pub metadata_ref: String,
    pub credential_type: String,
    pub valid_until: U256,
    pub evidence_hash: H256,
    pub revocable: bool,
}

/// Off-chain credential record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub credential_id: CredentialId,
    /// Registry token id, set only once the issuance is confirmed and read back from chain
    pub on_chain_id: Option<U256>,
    #[serde(serialize_with = "as_checksum_addr")]
    pub subject: Address,
    #[serde(serialize_with = "as_checksum_addr")]
    pub issuer: Address,
    pub title: String,
    pub description: String,
    pub metadata_ref: String,
    pub credential_type: String,
    pub valid_until: U256,
    pub evidence_hash: H256,
    pub revocable: bool,
    pub verification_status: VerificationStatus,
    pub issue_transaction_id: Option<TransactionId>,
    pub verify_transaction_id: Option<TransactionId>,
    pub revoke_transaction_id: Option<TransactionId>,
    /// Decision carried by the in-flight verification transaction
    pub pending_decision: Option<VerificationDecision>,
    /// Revocation asked for before the credential reached the chain, queued once it is issued
    #[serde(default)]
    pub revocation_requested: bool,
    /// Rejection or revocation reason
    pub reason: Option<String>,
    pub last_error: Option<String>,
    pub created_at: u64,
    pub verified_at: Option<u64>,
    pub revoked_at: Option<u64>,
}

impl Credential {
    pub fn new(credential_id: CredentialId, draft: CredentialDraft, created_at: u64) -> Self {
        Self {
            credential_id,
            on_chain_id: None,
            subject: draft.subject,
            issuer: draft.issuer,
            title: draft.title,
            description: draft.description,
            metadata_ref: draft.metadata_ref,
            credential_type: draft.credential_type,
            valid_until: draft.valid_until,
            evidence_hash: draft.evidence_hash,
            revocable: draft.revocable,
            verification_status: VerificationStatus::Pending,
            issue_transaction_id: None,
            verify_transaction_id: None,
            revoke_transaction_id: None,
            pending_decision: None,
            revocation_requested: false,
            reason: None,
            last_error: None,
            created_at,
            verified_at: None,
            revoked_at: None,
        }
    }

    /// Transactions queued for this credential
    pub fn transaction_ids(&self) -> impl Iterator<Item = TransactionId> {
        [self.issue_transaction_id, self.verify_transaction_id, self.revoke_transaction_id]
            .into_iter()
            .flatten()
    }

    /// Issuance payload of the credential
    pub fn draft(&self) -> CredentialDraft {
        CredentialDraft {
            issuer: self.issuer,
            subject: self.subject,
            title: self.title.clone(),
            description: self.description.clone(),
            metadata_ref: self.metadata_ref.clone(),
            credential_type: self.credential_type.clone(),
            valid_until: self.valid_until,
            evidence_hash: self.evidence_hash,
            revocable: self.revocable,
        }
    }

    /// Whether the on-chain record describes this credential
    ///
    /// The registry sees the issuer's smart account as issuer, not the owner key.
    pub fn matches_on_chain(&self, on_chain: &OnChainCredential, issuer_account: &Address) -> bool {
        on_chain.issuer == *issuer_account &&
            on_chain.subject == self.subject &&
            on_chain.name == self.title
    }
}
