use crate::StorageResult;
use credence_primitives::{
    Credential, CredentialDraft, CredentialId, QueuedTransaction, TransactionId, Wallet,
};
use ethers::types::{Address, U256};
use std::fmt::Debug;

/// Append-only store of queued transactions
pub trait TransactionStore: Send + Sync + Debug {
    /// Inserts a new record
    ///
    /// Fails with [Duplicate](crate::StorageError::Duplicate) if the id is already taken.
    fn insert(&self, tx: QueuedTransaction) -> StorageResult<()>;

    /// Replaces an existing record
    ///
    /// Fails with [NotFound](crate::StorageError::NotFound) if the id is unknown.
    fn update(&self, tx: &QueuedTransaction) -> StorageResult<()>;

    fn get(&self, id: &TransactionId) -> StorageResult<Option<QueuedTransaction>>;

    /// Pending records created at or after `created_since`, oldest first
    ///
    /// At most `limit` records without a `tx_hash` are returned. Records already broadcast are
    /// always included and do not count towards `limit`.
    fn pending(&self, created_since: u64, limit: usize) -> StorageResult<Vec<QueuedTransaction>>;

    /// Every record, oldest first
    fn all(&self) -> StorageResult<Vec<QueuedTransaction>>;
}

/// Smart account wallets, unique by owner
pub trait WalletStore: Send + Sync + Debug {
    /// Inserts a new wallet
    ///
    /// Fails with [Duplicate](crate::StorageError::Duplicate) if the owner already has one.
    fn insert(&self, wallet: Wallet) -> StorageResult<()>;

    /// Replaces the owner's wallet
    fn update(&self, wallet: &Wallet) -> StorageResult<()>;

    fn get(&self, owner: &Address) -> StorageResult<Option<Wallet>>;

    fn all(&self) -> StorageResult<Vec<Wallet>>;
}

/// Credential records
pub trait CredentialStore: Send + Sync + Debug {
    /// Allocates the next credential id and stores a fresh `PENDING` credential
    fn create(&self, draft: CredentialDraft, created_at: u64) -> StorageResult<Credential>;

    /// Replaces an existing credential
    ///
    /// An on-chain id can be held by one credential only; assigning it to a second one fails with
    /// [Duplicate](crate::StorageError::Duplicate).
    fn update(&self, credential: &Credential) -> StorageResult<()>;

    fn get(&self, id: CredentialId) -> StorageResult<Option<Credential>>;

    fn find_by_on_chain_id(&self, on_chain_id: &U256) -> StorageResult<Option<Credential>>;

    /// Credential that queued the transaction, if any
    fn find_by_transaction_id(&self, id: &TransactionId) -> StorageResult<Option<Credential>>;

    fn all(&self) -> StorageResult<Vec<Credential>>;
}
