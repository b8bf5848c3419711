//! Background loop submitting queued transactions

use crate::{
    builder::OperationBuilder,
    chain::{ChainClient, ChainReceipt},
    error::RelayerError,
    queue::TransactionQueue,
    signer::RelayerSigner,
};
use credence_contracts::function_name;
use credence_primitives::{
    constants::relayer::{
        BATCH_SIZE, MAX_AGE, RECEIPT_POLL_INTERVAL, RECEIPT_POLL_RETRIES, RELAY_INTERVAL,
    },
    OperationKind, QueuedTransaction,
};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval, sleep, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Outcome of a processed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "transaction", rename_all = "camelCase")]
pub enum RelayerEvent {
    Confirmed(QueuedTransaction),
    Failed(QueuedTransaction),
}

impl RelayerEvent {
    pub fn transaction(&self) -> &QueuedTransaction {
        match self {
            RelayerEvent::Confirmed(tx) | RelayerEvent::Failed(tx) => tx,
        }
    }
}

/// Result of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running
    Skipped,
    /// Number of queued transactions looked at
    Processed(usize),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub max_age: Duration,
    /// Receives the `handleOps` refunds
    pub beneficiary: Address,
    pub receipt_poll_interval: Duration,
    pub receipt_poll_retries: usize,
}

impl SchedulerConfig {
    pub fn new(beneficiary: Address) -> Self {
        Self {
            interval: Duration::from_secs(RELAY_INTERVAL),
            batch_size: BATCH_SIZE,
            max_age: Duration::from_secs(MAX_AGE),
            beneficiary,
            receipt_poll_interval: Duration::from_millis(RECEIPT_POLL_INTERVAL),
            receipt_poll_retries: RECEIPT_POLL_RETRIES,
        }
    }
}

/// Resets the single-flight flag when a tick ends, whatever the outcome
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Submits pending transactions one at a time with the relayer key
///
/// Ticks never overlap, so the relayer's transaction nonce and the accounts' entry point nonces
/// are consumed in order.
#[derive(Debug)]
pub struct RelayerScheduler {
    queue: TransactionQueue,
    chain: Arc<dyn ChainClient>,
    builder: OperationBuilder,
    signer: RelayerSigner,
    config: SchedulerConfig,
    events: broadcast::Sender<RelayerEvent>,
    running: AtomicBool,
}

impl RelayerScheduler {
    pub fn new(
        queue: TransactionQueue,
        chain: Arc<dyn ChainClient>,
        builder: OperationBuilder,
        signer: RelayerSigner,
        config: SchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self { queue, chain, builder, signer, config, events, running: AtomicBool::new(false) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayerEvent> {
        self.events.subscribe()
    }

    /// Runs ticks on the configured interval until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval = ?self.config.interval,
            batch_size = self.config.batch_size,
            relayer = ?self.signer.address(),
            "Relayer scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Relayer scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Processes one batch of pending transactions
    pub async fn tick(&self) -> TickOutcome {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            trace!("Previous tick still running, skipping");
            return TickOutcome::Skipped;
        }
        let _guard = TickGuard(&self.running);

        let batch = match self.queue.next_batch(self.config.batch_size, self.config.max_age) {
            Ok(batch) => batch,
            Err(err) => {
                error!("Failed to load pending transactions: {err}");
                return TickOutcome::Processed(0);
            }
        };

        if !batch.is_empty() {
            debug!("Processing {} pending transactions", batch.len());
        }

        let processed = batch.len();
        for tx in batch {
            self.process(tx).await;
        }
        TickOutcome::Processed(processed)
    }

    async fn process(&self, mut tx: QueuedTransaction) {
        if let Some(tx_hash) = tx.tx_hash {
            match self.chain.receipt(&tx_hash).await {
                Ok(Some(receipt)) => self.finalize(tx, receipt),
                Ok(None) => trace!(transaction_id = %tx.transaction_id, ?tx_hash, "Not mined yet"),
                Err(err) => warn!(
                    transaction_id = %tx.transaction_id,
                    ?tx_hash,
                    "Receipt lookup failed: {err}"
                ),
            }
            return;
        }

        tx.attempts += 1;
        let tx_hash = match self.submit(&mut tx).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                self.fail(tx, err.to_string());
                return;
            }
        };

        info!(
            transaction_id = %tx.transaction_id,
            kind = %tx.operation_kind,
            function = function_name(&tx.call_data).unwrap_or("unknown"),
            ?tx_hash,
            "Transaction submitted"
        );
        tx.tx_hash = Some(tx_hash);
        if let Err(err) = self.queue.update(&tx) {
            error!(
                transaction_id = %tx.transaction_id,
                "Failed to persist transaction hash: {err}"
            );
        }

        match self.wait_for_receipt(&tx_hash).await {
            Some(receipt) => self.finalize(tx, receipt),
            None => debug!(
                transaction_id = %tx.transaction_id,
                ?tx_hash,
                "No receipt yet, checking next tick"
            ),
        }
    }

    async fn submit(&self, tx: &mut QueuedTransaction) -> Result<H256, RelayerError> {
        if tx.operation_kind == OperationKind::AccountCreation {
            return Ok(self
                .chain
                .send_transaction(tx.target, tx.value, tx.call_data.clone())
                .await?);
        }

        let sender =
            tx.smart_account_address.ok_or(RelayerError::MissingSender(tx.transaction_id))?;
        let uo = self.builder.build(sender, tx.target, tx.value, tx.call_data.clone()).await?;
        let hash = self.builder.hash(&uo).await?;
        let uo = uo.signature(self.signer.sign(&hash).await?);

        tx.user_operation_hash = Some(hash);
        trace!(
            transaction_id = %tx.transaction_id,
            user_operation_hash = %hash,
            "Relaying user operation: {uo:?}"
        );

        Ok(self.chain.handle_ops(vec![uo], self.config.beneficiary).await?)
    }

    async fn wait_for_receipt(&self, tx_hash: &H256) -> Option<ChainReceipt> {
        for attempt in 0..self.config.receipt_poll_retries {
            if attempt > 0 {
                sleep(self.config.receipt_poll_interval).await;
            }
            match self.chain.receipt(tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {}
                Err(err) => warn!(?tx_hash, "Receipt lookup failed: {err}"),
            }
        }
        None
    }

    fn finalize(&self, mut tx: QueuedTransaction, receipt: ChainReceipt) {
        let outcome = match tx.user_operation_hash {
            _ if !receipt.success => Err("transaction reverted"),
            Some(hash) => match receipt.user_operation_success(&hash) {
                Some(true) => Ok(()),
                Some(false) => Err("user operation reverted"),
                None => Err("user operation missing from receipt"),
            },
            None => Ok(()),
        };

        let now = self.queue.clock().now();
        match outcome {
            Ok(()) => {
                tx.confirm(receipt.transaction_hash, receipt.block_number, now);
                if let Some(id) = receipt.issued_credentials.first() {
                    tx.entity_id = Some(*id);
                }
                info!(
                    transaction_id = %tx.transaction_id,
                    tx_hash = ?receipt.transaction_hash,
                    block_number = receipt.block_number,
                    "Transaction confirmed"
                );
                self.persist(RelayerEvent::Confirmed(tx));
            }
            Err(reason) => {
                tx.tx_hash = Some(receipt.transaction_hash);
                tx.block_number = Some(receipt.block_number);
                self.fail(tx, reason.to_string());
            }
        }
    }

    fn fail(&self, mut tx: QueuedTransaction, error: String) {
        warn!(transaction_id = %tx.transaction_id, "Transaction failed: {error}");
        tx.fail(error, self.queue.clock().now());
        self.persist(RelayerEvent::Failed(tx));
    }

    fn persist(&self, event: RelayerEvent) {
        if let Err(err) = self.queue.update(event.transaction()) {
            error!(
                transaction_id = %event.transaction().transaction_id,
                "Failed to persist transaction: {err}"
            );
            return;
        }
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mock::MockChainClient, queue::QueueRequest};
    use credence_primitives::{
        clock::ManualClock, TransactionId, TransactionStatus, Wallet, WalletStatus,
    };
    use credence_storage::Stores;
    use ethers::types::{Bytes, U256};

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn setup() -> (Arc<RelayerScheduler>, Arc<MockChainClient>, TransactionQueue, Stores) {
        let stores = Stores::memory();
        let chain = Arc::new(MockChainClient::new(1337));
        let queue = TransactionQueue::new(
            stores.transactions.clone(),
            stores.wallets.clone(),
            Arc::new(ManualClock::new(1_000)),
        );
        let builder = OperationBuilder::new(chain.clone(), chain.entry_point(), None);
        let mut config = SchedulerConfig::new(Address::repeat_byte(0xbe));
        config.receipt_poll_interval = Duration::from_millis(1);
        config.receipt_poll_retries = 2;
        let scheduler = RelayerScheduler::new(
            queue.clone(),
            chain.clone(),
            builder,
            RelayerSigner::from_private_key(KEY, 1337).unwrap(),
            config,
        );
        (Arc::new(scheduler), chain, queue, stores)
    }

    fn enqueue_call(queue: &TransactionQueue, stores: &Stores) -> TransactionId {
        let owner = Address::repeat_byte(1);
        let _ = stores.wallets.insert(Wallet {
            owner_address: owner,
            smart_account_address: Address::repeat_byte(0xcc),
            salt: U256::zero(),
            status: WalletStatus::Created,
            creation_transaction_id: None,
            created_at: 0,
        });
        queue
            .enqueue(QueueRequest {
                owner_address: owner,
                target: Address::repeat_byte(0x22),
                value: U256::zero(),
                call_data: Bytes::from(vec![1]),
                operation_kind: OperationKind::Call,
                description: "call".into(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn confirms_mined_user_operation() {
        let (scheduler, chain, queue, stores) = setup();
        let mut events = scheduler.subscribe();
        let id = enqueue_call(&queue, &stores);

        assert_eq!(scheduler.tick().await, TickOutcome::Processed(1));

        let tx = queue.status_of(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert_eq!(tx.attempts, 1);
        assert_eq!(tx.tx_hash, Some(H256::from_low_u64_be(1)));
        assert_eq!(tx.block_number, Some(crate::mock::FIRST_BLOCK));

        let calls = chain.handle_ops_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].sender, Address::repeat_byte(0xcc));
        assert_eq!(calls[0][0].signature.len(), 65);
        assert_eq!(tx.user_operation_hash, Some(calls[0][0].hash(&chain.entry_point(), 1337)));

        assert_eq!(events.recv().await.unwrap(), RelayerEvent::Confirmed(tx));
        assert_eq!(scheduler.tick().await, TickOutcome::Processed(0));
    }

    #[tokio::test]
    async fn submission_error_is_recorded_verbatim() {
        let (scheduler, chain, queue, stores) = setup();
        let id = enqueue_call(&queue, &stores);
        chain.fail_next_submission("insufficient funds for gas * price + value");

        scheduler.tick().await;

        let tx = queue.status_of(&id).unwrap();
        assert!(tx.is_failed());
        assert_eq!(tx.last_error.as_deref(), Some("insufficient funds for gas * price + value"));

        // failed records are never retried
        scheduler.tick().await;
        assert_eq!(chain.submissions(), 1);
    }

    #[tokio::test]
    async fn reverted_user_operation_fails() {
        let (scheduler, chain, queue, stores) = setup();
        let id = enqueue_call(&queue, &stores);
        chain.revert_next_user_operation();

        scheduler.tick().await;

        let tx = queue.status_of(&id).unwrap();
        assert!(tx.is_failed());
        assert_eq!(tx.last_error.as_deref(), Some("user operation reverted"));
        assert!(tx.tx_hash.is_some());
    }

    #[tokio::test]
    async fn unmined_transaction_waits_for_next_tick() {
        let (scheduler, chain, queue, stores) = setup();
        let id = enqueue_call(&queue, &stores);
        chain.set_auto_mine(false);

        scheduler.tick().await;
        let tx = queue.status_of(&id).unwrap();
        assert!(tx.is_pending());
        assert!(tx.tx_hash.is_some());

        scheduler.tick().await;
        assert!(queue.status_of(&id).unwrap().is_pending());

        chain.mine();
        scheduler.tick().await;
        assert!(queue.status_of(&id).unwrap().is_confirmed());
        assert_eq!(chain.submissions(), 1);
    }

    #[tokio::test]
    async fn broadcast_records_do_not_hold_back_newer_ones() {
        let (scheduler, chain, queue, stores) = setup();
        chain.set_auto_mine(false);
        let ids = (0..BATCH_SIZE + 1).map(|_| enqueue_call(&queue, &stores)).collect::<Vec<_>>();

        scheduler.tick().await;
        assert_eq!(chain.submissions(), BATCH_SIZE);

        scheduler.tick().await;
        assert_eq!(chain.submissions(), BATCH_SIZE + 1);
        for id in &ids {
            let tx = queue.status_of(id).unwrap();
            assert!(tx.is_pending());
            assert!(tx.tx_hash.is_some());
        }

        chain.mine();
        assert_eq!(scheduler.tick().await, TickOutcome::Processed(BATCH_SIZE + 1));
        assert!(ids.iter().all(|id| queue.status_of(id).unwrap().is_confirmed()));
        assert_eq!(chain.submissions(), BATCH_SIZE + 1);
    }

    #[tokio::test]
    async fn account_creation_is_a_plain_transaction() {
        let (scheduler, chain, queue, _) = setup();
        let factory = Address::repeat_byte(0xfa);
        let owner = Address::repeat_byte(7);
        let id = queue
            .enqueue(QueueRequest {
                owner_address: owner,
                target: factory,
                value: U256::zero(),
                call_data: credence_contracts::create_account_call_data(owner, 5.into()),
                operation_kind: OperationKind::AccountCreation,
                description: "create account".into(),
            })
            .unwrap();

        scheduler.tick().await;

        assert!(queue.status_of(&id).unwrap().is_confirmed());
        assert!(chain.handle_ops_calls().is_empty());
        assert_eq!(chain.transactions()[0].0, factory);
        assert!(chain
            .is_deployed(&MockChainClient::account_address(&owner, 5.into()))
            .await
            .unwrap());
    }
}
