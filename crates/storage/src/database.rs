//! Embedded database stores backed by redb
//!
//! Table layout:
//! - `transactions`: transaction id -> JSON record
//! - `pending_transactions`: `created_at (BE) | transaction id` -> (), pending records only
//! - `wallets`: owner address -> JSON record
//! - `credentials`: credential id -> JSON record
//! - `credentials_by_on_chain_id`: on-chain id (BE) -> credential id
//! - `credentials_by_transaction_id`: transaction id -> credential id
//! - `meta`: counters

use crate::{
    store::{CredentialStore, TransactionStore, WalletStore},
    StorageError, StorageResult,
};
use credence_primitives::{
    Credential, CredentialDraft, CredentialId, QueuedTransaction, TransactionId, Wallet,
};
use ethers::types::{Address, U256};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::{fmt, path::Path, sync::Arc};
use tracing::debug;

const TRANSACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("transactions");
const PENDING_TRANSACTIONS: TableDefinition<&[u8], ()> =
    TableDefinition::new("pending_transactions");
const WALLETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("wallets");
const CREDENTIALS: TableDefinition<u64, &[u8]> = TableDefinition::new("credentials");
const CREDENTIALS_BY_ON_CHAIN_ID: TableDefinition<&[u8], u64> =
    TableDefinition::new("credentials_by_on_chain_id");
const CREDENTIALS_BY_TRANSACTION_ID: TableDefinition<&[u8], u64> =
    TableDefinition::new("credentials_by_transaction_id");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_CREDENTIAL_ID: &str = "next_credential_id";

fn pending_key(tx: &QueuedTransaction) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 32);
    key.extend_from_slice(&tx.created_at.to_be_bytes());
    key.extend_from_slice(tx.transaction_id.as_fixed_bytes());
    key
}

fn on_chain_key(on_chain_id: &U256) -> [u8; 32] {
    let mut key = [0u8; 32];
    on_chain_id.to_big_endian(&mut key);
    key
}

/// Stores sharing one redb database file
#[derive(Clone)]
pub struct DatabaseStore {
    db: Arc<Database>,
}

impl fmt::Debug for DatabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseStore").finish_non_exhaustive()
    }
}

impl DatabaseStore {
    /// Opens (or creates) the database at the given path
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Tables must exist before the first read transaction opens them
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(PENDING_TRANSACTIONS)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(CREDENTIALS)?;
            let _ = write_txn.open_table(CREDENTIALS_BY_ON_CHAIN_ID)?;
            let _ = write_txn.open_table(CREDENTIALS_BY_TRANSACTION_ID)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        debug!("Opened database at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }
}

impl TransactionStore for DatabaseStore {
    fn insert(&self, tx: QueuedTransaction) -> StorageResult<()> {
        let json = serde_json::to_vec(&tx)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRANSACTIONS)?;
            if table.get(tx.transaction_id.as_fixed_bytes().as_slice())?.is_some() {
                return Err(StorageError::duplicate(tx.transaction_id));
            }
            table.insert(tx.transaction_id.as_fixed_bytes().as_slice(), json.as_slice())?;

            if tx.is_pending() {
                let mut pending = write_txn.open_table(PENDING_TRANSACTIONS)?;
                pending.insert(pending_key(&tx).as_slice(), ())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn update(&self, tx: &QueuedTransaction) -> StorageResult<()> {
        let json = serde_json::to_vec(tx)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRANSACTIONS)?;
            if table.get(tx.transaction_id.as_fixed_bytes().as_slice())?.is_none() {
                return Err(StorageError::not_found(tx.transaction_id));
            }
            table.insert(tx.transaction_id.as_fixed_bytes().as_slice(), json.as_slice())?;

            let mut pending = write_txn.open_table(PENDING_TRANSACTIONS)?;
            if tx.is_pending() {
                pending.insert(pending_key(tx).as_slice(), ())?;
            } else {
                pending.remove(pending_key(tx).as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, id: &TransactionId) -> StorageResult<Option<QueuedTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(id.as_fixed_bytes().as_slice())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn pending(&self, created_since: u64, limit: usize) -> StorageResult<Vec<QueuedTransaction>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_TRANSACTIONS)?;
        let table = read_txn.open_table(TRANSACTIONS)?;

        let start = created_since.to_be_bytes();
        let mut txs = Vec::with_capacity(limit);
        let mut unsubmitted = 0;
        for entry in pending.range(start.as_slice()..)? {
            let (key, _) = entry?;
            let id = &key.value()[8..];
            let Some(value) = table.get(id)? else {
                continue;
            };
            let tx: QueuedTransaction = serde_json::from_slice(value.value())?;
            if tx.tx_hash.is_none() {
                if unsubmitted >= limit {
                    continue;
                }
                unsubmitted += 1;
            }
            txs.push(tx);
        }
        Ok(txs)
    }

    fn all(&self) -> StorageResult<Vec<QueuedTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        let mut txs = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            txs.push(serde_json::from_slice::<QueuedTransaction>(value.value())?);
        }
        txs.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then(a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(txs)
    }
}

impl WalletStore for DatabaseStore {
    fn insert(&self, wallet: Wallet) -> StorageResult<()> {
        let json = serde_json::to_vec(&wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(wallet.owner_address.as_bytes())?.is_some() {
                return Err(StorageError::duplicate(format!("wallet {:?}", wallet.owner_address)));
            }
            table.insert(wallet.owner_address.as_bytes(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn update(&self, wallet: &Wallet) -> StorageResult<()> {
        let json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(wallet.owner_address.as_bytes())?.is_none() {
                return Err(StorageError::not_found(format!("wallet {:?}", wallet.owner_address)));
            }
            table.insert(wallet.owner_address.as_bytes(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, owner: &Address) -> StorageResult<Option<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(owner.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn all(&self) -> StorageResult<Vec<Wallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            wallets.push(serde_json::from_slice::<Wallet>(value.value())?);
        }
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }
}

impl CredentialStore for DatabaseStore {
    fn create(&self, draft: CredentialDraft, created_at: u64) -> StorageResult<Credential> {
        let write_txn = self.db.begin_write()?;
        let credential = {
            let mut meta = write_txn.open_table(META)?;
            let id = meta.get(NEXT_CREDENTIAL_ID)?.map(|v| v.value()).unwrap_or(0) + 1;
            meta.insert(NEXT_CREDENTIAL_ID, id)?;

            let credential = Credential::new(id, draft, created_at);
            let json = serde_json::to_vec(&credential)?;
            let mut table = write_txn.open_table(CREDENTIALS)?;
            table.insert(id, json.as_slice())?;
            credential
        };
        write_txn.commit()?;
        Ok(credential)
    }

    fn update(&self, credential: &Credential) -> StorageResult<()> {
        let json = serde_json::to_vec(credential)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CREDENTIALS)?;
            let previous: Credential = match table.get(credential.credential_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => {
                    return Err(StorageError::not_found(format!(
                        "credential {}",
                        credential.credential_id
                    )))
                }
            };

            let mut index = write_txn.open_table(CREDENTIALS_BY_ON_CHAIN_ID)?;
            if let Some(on_chain_id) = credential.on_chain_id {
                let holder = index.get(on_chain_key(&on_chain_id).as_slice())?.map(|v| v.value());
                if holder.is_some_and(|holder| holder != credential.credential_id) {
                    return Err(StorageError::duplicate(format!(
                        "on-chain credential {on_chain_id}"
                    )));
                }
            }
            if let Some(old) = previous.on_chain_id {
                if credential.on_chain_id != Some(old) {
                    index.remove(on_chain_key(&old).as_slice())?;
                }
            }
            if let Some(on_chain_id) = credential.on_chain_id {
                index.insert(on_chain_key(&on_chain_id).as_slice(), credential.credential_id)?;
            }

            let mut by_transaction = write_txn.open_table(CREDENTIALS_BY_TRANSACTION_ID)?;
            for transaction_id in credential.transaction_ids() {
                by_transaction
                    .insert(transaction_id.as_fixed_bytes().as_slice(), credential.credential_id)?;
            }

            table.insert(credential.credential_id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, id: CredentialId) -> StorageResult<Option<Credential>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CREDENTIALS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_on_chain_id(&self, on_chain_id: &U256) -> StorageResult<Option<Credential>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(CREDENTIALS_BY_ON_CHAIN_ID)?;
        let Some(id) = index.get(on_chain_key(on_chain_id).as_slice())?.map(|v| v.value()) else {
            return Ok(None);
        };

        let table = read_txn.open_table(CREDENTIALS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_transaction_id(&self, id: &TransactionId) -> StorageResult<Option<Credential>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(CREDENTIALS_BY_TRANSACTION_ID)?;
        let Some(id) = index.get(id.as_fixed_bytes().as_slice())?.map(|v| v.value()) else {
            return Ok(None);
        };

        let table = read_txn.open_table(CREDENTIALS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn all(&self) -> StorageResult<Vec<Credential>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CREDENTIALS)?;
        let mut credentials = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            credentials.push(serde_json::from_slice::<Credential>(value.value())?);
        }
        Ok(credentials)
    }
}
