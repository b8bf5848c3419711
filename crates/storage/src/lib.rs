//! Storage of the relayer's durable state: queued transactions, smart account wallets and
//! credentials.
//!
//! Every store is a trait with an in-memory and an embedded database (redb) implementation.

mod database;
mod error;
mod memory;
mod store;

pub use database::DatabaseStore;
pub use error::{DatabaseError, StorageError, StorageResult};
pub use memory::{MemoryCredentialStore, MemoryTransactionStore, MemoryWalletStore};
pub use store::{CredentialStore, TransactionStore, WalletStore};

use std::{path::Path, sync::Arc};

/// Handles to every store the relayer uses
#[derive(Debug, Clone)]
pub struct Stores {
    pub transactions: Arc<dyn TransactionStore>,
    pub wallets: Arc<dyn WalletStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self {
            transactions: Arc::new(MemoryTransactionStore::default()),
            wallets: Arc::new(MemoryWalletStore::default()),
            credentials: Arc::new(MemoryCredentialStore::default()),
        }
    }

    /// Opens the database file, creating it if needed
    pub fn open(path: &Path) -> StorageResult<Self> {
        let db = Arc::new(DatabaseStore::open(path)?);
        Ok(Self { transactions: db.clone(), wallets: db.clone(), credentials: db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credence_primitives::{
        CredentialDraft, OperationKind, QueuedTransaction, TransactionId, Wallet, WalletStatus,
    };
    use ethers::types::{Address, Bytes, H256, U256};

    fn queued(created_at: u64, nonce: u64) -> QueuedTransaction {
        let owner = Address::repeat_byte(1);
        let target = Address::repeat_byte(2);
        QueuedTransaction::new(
            TransactionId::derive(
                &owner,
                &target,
                &U256::zero(),
                &Bytes::default(),
                OperationKind::Call,
                created_at,
                nonce,
            ),
            owner,
            Some(Address::repeat_byte(3)),
            target,
            U256::zero(),
            Bytes::default(),
            OperationKind::Call,
            "test".into(),
            created_at,
        )
    }

    fn draft() -> CredentialDraft {
        CredentialDraft {
            issuer: Address::repeat_byte(0x11),
            subject: Address::repeat_byte(0xab),
            title: "title".into(),
            description: "description".into(),
            metadata_ref: String::new(),
            credential_type: "TYPE".into(),
            valid_until: U256::zero(),
            evidence_hash: H256::zero(),
            revocable: true,
        }
    }

    fn transactions_test_case(store: Arc<dyn TransactionStore>) {
        let old = queued(100, 0);
        let mid = queued(200, 0);
        let new = queued(300, 0);
        for tx in [new.clone(), old.clone(), mid.clone()] {
            store.insert(tx).unwrap();
        }
        assert!(store.insert(old.clone()).unwrap_err().is_duplicate());

        let pending = store.pending(0, 10).unwrap();
        assert_eq!(
            pending.iter().map(|tx| tx.created_at).collect::<Vec<_>>(),
            vec![100, 200, 300]
        );
        assert_eq!(store.pending(150, 10).unwrap().len(), 2);
        assert_eq!(store.pending(0, 1).unwrap()[0].transaction_id, old.transaction_id);

        // broadcast records do not count towards the limit
        let mut broadcast = old.clone();
        broadcast.tx_hash = Some(H256::repeat_byte(7));
        store.update(&broadcast).unwrap();
        assert_eq!(
            store.pending(0, 1).unwrap().iter().map(|tx| tx.created_at).collect::<Vec<_>>(),
            vec![100, 200]
        );
        assert_eq!(store.pending(0, 0).unwrap(), vec![broadcast]);

        let mut confirmed = mid.clone();
        confirmed.confirm(H256::repeat_byte(9), 10, 400);
        store.update(&confirmed).unwrap();
        assert_eq!(store.pending(0, 10).unwrap().len(), 2);
        assert_eq!(store.get(&mid.transaction_id).unwrap().unwrap(), confirmed);
        assert_eq!(store.all().unwrap().len(), 3);

        let missing = queued(500, 0);
        assert!(matches!(store.update(&missing), Err(StorageError::NotFound { .. })));
        assert!(store.get(&missing.transaction_id).unwrap().is_none());
    }

    fn wallets_test_case(store: Arc<dyn WalletStore>) {
        let mut wallet = Wallet {
            owner_address: Address::repeat_byte(1),
            smart_account_address: Address::repeat_byte(2),
            salt: 7.into(),
            status: WalletStatus::Pending,
            creation_transaction_id: None,
            created_at: 1,
        };
        store.insert(wallet.clone()).unwrap();
        assert!(store.insert(wallet.clone()).unwrap_err().is_duplicate());

        wallet.status = WalletStatus::Created;
        store.update(&wallet).unwrap();
        assert_eq!(
            store.get(&wallet.owner_address).unwrap().unwrap().status,
            WalletStatus::Created
        );
        assert!(store.get(&Address::repeat_byte(5)).unwrap().is_none());
        assert_eq!(store.all().unwrap().len(), 1);
    }

    fn credentials_test_case(store: Arc<dyn CredentialStore>) {
        let mut first = store.create(draft(), 1).unwrap();
        let mut second = store.create(draft(), 2).unwrap();
        assert_eq!(first.credential_id, 1);
        assert_eq!(second.credential_id, 2);

        first.on_chain_id = Some(42.into());
        store.update(&first).unwrap();
        // idempotent re-assignment to the same credential
        store.update(&first).unwrap();
        assert_eq!(
            store.find_by_on_chain_id(&42.into()).unwrap().unwrap().credential_id,
            first.credential_id
        );

        second.on_chain_id = Some(42.into());
        assert!(store.update(&second).unwrap_err().is_duplicate());
        assert!(store.get(2).unwrap().unwrap().on_chain_id.is_none());
        assert!(store.find_by_on_chain_id(&43.into()).unwrap().is_none());

        let issue = TransactionId::from(H256::repeat_byte(1));
        let verify = TransactionId::from(H256::repeat_byte(2));
        second.on_chain_id = None;
        second.issue_transaction_id = Some(issue);
        store.update(&second).unwrap();
        second.verify_transaction_id = Some(verify);
        store.update(&second).unwrap();
        for id in [issue, verify] {
            assert_eq!(
                store.find_by_transaction_id(&id).unwrap().map(|c| c.credential_id),
                Some(second.credential_id)
            );
        }
        assert!(store.find_by_transaction_id(&TransactionId::default()).unwrap().is_none());
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn memory_stores() {
        let stores = Stores::memory();
        transactions_test_case(stores.transactions);
        wallets_test_case(stores.wallets);
        credentials_test_case(stores.credentials);
    }

    #[test]
    fn database_stores() {
        let dir = tempfile::tempdir().unwrap();
        let stores = Stores::open(&dir.path().join("credence.redb")).unwrap();
        transactions_test_case(stores.transactions);
        wallets_test_case(stores.wallets);
        credentials_test_case(stores.credentials);
    }

    #[test]
    fn database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credence.redb");
        let tx = queued(100, 0);
        {
            let stores = Stores::open(&path).unwrap();
            stores.transactions.insert(tx.clone()).unwrap();
            stores.credentials.create(draft(), 1).unwrap();
        }

        let stores = Stores::open(&path).unwrap();
        assert_eq!(stores.transactions.pending(0, 5).unwrap(), vec![tx]);
        assert_eq!(stores.credentials.create(draft(), 2).unwrap().credential_id, 2);
    }
}
