use crate::error::RelayerError;
use credence_primitives::{Clock, OperationKind, QueuedTransaction, TransactionId};
use credence_storage::{TransactionStore, WalletStore};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

/// Intent to execute `call_data` against `target` on behalf of `owner_address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    pub owner_address: Address,
    pub target: Address,
    #[serde(default)]
    pub value: U256,
    pub call_data: Bytes,
    pub operation_kind: OperationKind,
    #[serde(default)]
    pub description: String,
}

/// Durable queue of relayer intents
#[derive(Debug, Clone)]
pub struct TransactionQueue {
    transactions: Arc<dyn TransactionStore>,
    wallets: Arc<dyn WalletStore>,
    clock: Arc<dyn Clock>,
}

impl TransactionQueue {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        wallets: Arc<dyn WalletStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { transactions, wallets, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Records a new `PENDING` transaction and returns its id
    ///
    /// Every kind but account creation is sent from the owner's smart account, so the owner must
    /// have a usable wallet. Identical intents are queued twice.
    pub fn enqueue(&self, request: QueueRequest) -> Result<TransactionId, RelayerError> {
        let smart_account_address = if request.operation_kind.is_user_operation() {
            match self.wallets.get(&request.owner_address)? {
                Some(wallet) if wallet.is_usable() => Some(wallet.smart_account_address),
                _ => return Err(RelayerError::UnknownAccount(request.owner_address)),
            }
        } else {
            None
        };

        let created_at = self.clock.now();
        let mut derivation_nonce = 0;
        loop {
            let transaction_id = TransactionId::derive(
                &request.owner_address,
                &request.target,
                &request.value,
                &request.call_data,
                request.operation_kind,
                created_at,
                derivation_nonce,
            );
            let tx = QueuedTransaction::new(
                transaction_id,
                request.owner_address,
                smart_account_address,
                request.target,
                request.value,
                request.call_data.clone(),
                request.operation_kind,
                request.description.clone(),
                created_at,
            );

            match self.transactions.insert(tx) {
                Ok(()) => {
                    info!(
                        %transaction_id,
                        owner = ?request.owner_address,
                        kind = %request.operation_kind,
                        "Queued transaction"
                    );
                    return Ok(transaction_id);
                }
                Err(err) if err.is_duplicate() => {
                    debug!(%transaction_id, "Transaction id taken, bumping derivation nonce");
                    derivation_nonce += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn status_of(&self, id: &TransactionId) -> Result<QueuedTransaction, RelayerError> {
        self.transactions.get(id)?.ok_or(RelayerError::NotFound(*id))
    }

    /// Pending transactions younger than `max_age`, oldest first
    ///
    /// `limit` caps the records still to be submitted; broadcast records waiting for a receipt
    /// come on top of it. Older ones are never returned again and keep their `PENDING` status.
    pub fn next_batch(
        &self,
        limit: usize,
        max_age: Duration,
    ) -> Result<Vec<QueuedTransaction>, RelayerError> {
        let created_since =
            self.clock.now().checked_sub(max_age.as_millis() as u64).map_or(0, |since| since + 1);
        Ok(self.transactions.pending(created_since, limit)?)
    }

    pub fn update(&self, tx: &QueuedTransaction) -> Result<(), RelayerError> {
        Ok(self.transactions.update(tx)?)
    }

    pub fn all(&self) -> Result<Vec<QueuedTransaction>, RelayerError> {
        Ok(self.transactions.all()?)
    }
}
