//! In-memory stores, used by tests and `--use-memory`

use crate::{
    store::{CredentialStore, TransactionStore, WalletStore},
    StorageError, StorageResult,
};
use credence_primitives::{
    Credential, CredentialDraft, CredentialId, QueuedTransaction, TransactionId, Wallet,
};
use ethers::types::{Address, U256};
use parking_lot::RwLock;
use std::collections::HashMap;

fn oldest_first(txs: &mut [QueuedTransaction]) {
    txs.sort_by(|a, b| {
        a.created_at.cmp(&b.created_at).then(a.transaction_id.cmp(&b.transaction_id))
    });
}

#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    txs: RwLock<HashMap<TransactionId, QueuedTransaction>>,
}

impl TransactionStore for MemoryTransactionStore {
    fn insert(&self, tx: QueuedTransaction) -> StorageResult<()> {
        let mut txs = self.txs.write();
        if txs.contains_key(&tx.transaction_id) {
            return Err(StorageError::duplicate(tx.transaction_id));
        }
        txs.insert(tx.transaction_id, tx);
        Ok(())
    }

    fn update(&self, tx: &QueuedTransaction) -> StorageResult<()> {
        match self.txs.write().get_mut(&tx.transaction_id) {
            Some(entry) => {
                *entry = tx.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(tx.transaction_id)),
        }
    }

    fn get(&self, id: &TransactionId) -> StorageResult<Option<QueuedTransaction>> {
        Ok(self.txs.read().get(id).cloned())
    }

    fn pending(&self, created_since: u64, limit: usize) -> StorageResult<Vec<QueuedTransaction>> {
        let mut pending: Vec<QueuedTransaction> = self
            .txs
            .read()
            .values()
            .filter(|tx| tx.is_pending() && tx.created_at >= created_since)
            .cloned()
            .collect();
        oldest_first(&mut pending);

        let mut unsubmitted = 0;
        pending.retain(|tx| {
            if tx.tx_hash.is_some() {
                return true;
            }
            unsubmitted += 1;
            unsubmitted <= limit
        });
        Ok(pending)
    }

    fn all(&self) -> StorageResult<Vec<QueuedTransaction>> {
        let mut txs: Vec<QueuedTransaction> = self.txs.read().values().cloned().collect();
        oldest_first(&mut txs);
        Ok(txs)
    }
}

#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    wallets: RwLock<HashMap<Address, Wallet>>,
}

impl WalletStore for MemoryWalletStore {
    fn insert(&self, wallet: Wallet) -> StorageResult<()> {
        let mut wallets = self.wallets.write();
        if wallets.contains_key(&wallet.owner_address) {
            return Err(StorageError::duplicate(format!("wallet {:?}", wallet.owner_address)));
        }
        wallets.insert(wallet.owner_address, wallet);
        Ok(())
    }

    fn update(&self, wallet: &Wallet) -> StorageResult<()> {
        match self.wallets.write().get_mut(&wallet.owner_address) {
            Some(entry) => {
                *entry = wallet.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(format!("wallet {:?}", wallet.owner_address))),
        }
    }

    fn get(&self, owner: &Address) -> StorageResult<Option<Wallet>> {
        Ok(self.wallets.read().get(owner).cloned())
    }

    fn all(&self) -> StorageResult<Vec<Wallet>> {
        let mut wallets: Vec<Wallet> = self.wallets.read().values().cloned().collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }
}

#[derive(Debug, Default)]
struct Credentials {
    next_id: CredentialId,
    by_id: HashMap<CredentialId, Credential>,
    by_on_chain_id: HashMap<U256, CredentialId>,
    by_transaction_id: HashMap<TransactionId, CredentialId>,
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Credentials>,
}

impl CredentialStore for MemoryCredentialStore {
    fn create(&self, draft: CredentialDraft, created_at: u64) -> StorageResult<Credential> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let credential = Credential::new(inner.next_id, draft, created_at);
        inner.by_id.insert(credential.credential_id, credential.clone());
        Ok(credential)
    }

    fn update(&self, credential: &Credential) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let Some(previous) = inner.by_id.get(&credential.credential_id).cloned() else {
            return Err(StorageError::not_found(format!("credential {}", credential.credential_id)));
        };

        if let Some(on_chain_id) = credential.on_chain_id {
            match inner.by_on_chain_id.get(&on_chain_id) {
                Some(holder) if *holder != credential.credential_id => {
                    return Err(StorageError::duplicate(format!(
                        "on-chain credential {on_chain_id}"
                    )));
                }
                _ => {}
            }
        }
        if let Some(old) = previous.on_chain_id {
            if credential.on_chain_id != Some(old) {
                inner.by_on_chain_id.remove(&old);
            }
        }
        if let Some(on_chain_id) = credential.on_chain_id {
            inner.by_on_chain_id.insert(on_chain_id, credential.credential_id);
        }
        for transaction_id in credential.transaction_ids() {
            inner.by_transaction_id.insert(transaction_id, credential.credential_id);
        }
        inner.by_id.insert(credential.credential_id, credential.clone());
        Ok(())
    }

    fn get(&self, id: CredentialId) -> StorageResult<Option<Credential>> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }

    fn find_by_on_chain_id(&self, on_chain_id: &U256) -> StorageResult<Option<Credential>> {
        let inner = self.inner.read();
        Ok(inner.by_on_chain_id.get(on_chain_id).and_then(|id| inner.by_id.get(id)).cloned())
    }

    fn find_by_transaction_id(&self, id: &TransactionId) -> StorageResult<Option<Credential>> {
        let inner = self.inner.read();
        Ok(inner.by_transaction_id.get(id).and_then(|id| inner.by_id.get(id)).cloned())
    }

    fn all(&self) -> StorageResult<Vec<Credential>> {
        let mut credentials: Vec<Credential> = self.inner.read().by_id.values().cloned().collect();
        credentials.sort_by_key(|c| c.credential_id);
        Ok(credentials)
    }
}
