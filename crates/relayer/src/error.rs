use crate::chain::ChainError;
use credence_primitives::{CredentialId, TransactionId, VerificationStatus};
use credence_storage::StorageError;
use ethers::{signers::WalletError, types::Address};
use thiserror::Error;

/// Configuration error
///
/// Without a valid configuration the relayer refuses to process transactions but still serves
/// reads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing execution client RPC address")]
    MissingRpcUrl,

    #[error("missing {0} contract address")]
    MissingContract(&'static str),

    #[error("missing relayer key")]
    MissingRelayerKey,

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors of the relayer's signing key
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid relayer key: {0}")]
    InvalidKey(String),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Relayer error
#[derive(Debug, Error)]
pub enum RelayerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The owner has no usable smart account
    #[error("unknown smart account for owner {0:?}")]
    UnknownAccount(Address),

    #[error("transaction {0} not found")]
    NotFound(TransactionId),

    #[error("no wallet for owner {0:?}")]
    WalletNotFound(Address),

    #[error("wallet provisioning for {0:?} exhausted its retries")]
    ProvisioningExhausted(Address),

    #[error("queued transaction {0} has no smart account")]
    MissingSender(TransactionId),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Credential lifecycle error
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{caller:?} is not allowed to act on credential {id}")]
    Unauthorized { caller: Address, id: CredentialId },

    #[error("credential {0} has already been issued")]
    AlreadyIssued(CredentialId),

    #[error("credential {0} has already been verified")]
    AlreadyVerified(CredentialId),

    #[error("credential {0} has been revoked")]
    Revoked(CredentialId),

    #[error("credential {0} is not revocable")]
    NotRevocable(CredentialId),

    /// The action needs an issued credential (e.g. issuance not confirmed yet)
    #[error("credential {id} is {status}, expected ISSUED")]
    NotIssued { id: CredentialId, status: VerificationStatus },

    #[error("credential {0} has a revocation in flight")]
    RevocationPending(CredentialId),

    #[error("credential {0} not found")]
    NotFound(CredentialId),

    #[error(transparent)]
    Relayer(#[from] RelayerError),
}

impl CredentialError {
    /// Errors caused by the credential's current lifecycle state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CredentialError::AlreadyIssued(_) |
                CredentialError::AlreadyVerified(_) |
                CredentialError::Revoked(_) |
                CredentialError::NotRevocable(_) |
                CredentialError::NotIssued { .. } |
                CredentialError::RevocationPending(_)
        )
    }
}

impl From<StorageError> for CredentialError {
    fn from(err: StorageError) -> Self {
        CredentialError::Relayer(err.into())
    }
}

impl From<ChainError> for CredentialError {
    fn from(err: ChainError) -> Self {
        CredentialError::Relayer(err.into())
    }
}
