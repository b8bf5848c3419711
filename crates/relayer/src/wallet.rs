//! Smart account provisioning

use crate::{
    chain::ChainClient,
    error::RelayerError,
    queue::{QueueRequest, TransactionQueue},
    reconcile::{Expectation, Reconciler},
};
use credence_contracts::create_account_call_data;
use credence_primitives::{
    constants::wallet::PROVISION_RETRIES, OperationKind, QueuedTransaction, Wallet, WalletStatus,
};
use credence_storage::WalletStore;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Deployment state of an owner's smart account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub wallet: Wallet,
    /// The account creation transaction, reconciled if needed
    pub creation_transaction: Option<QueuedTransaction>,
    /// Whether code exists at the smart account address
    pub deployed: bool,
}

/// Reserves a smart account per owner and requests its deployment
#[derive(Debug, Clone)]
pub struct WalletProvisioner {
    chain: Arc<dyn ChainClient>,
    queue: TransactionQueue,
    wallets: Arc<dyn WalletStore>,
    reconciler: Reconciler,
    factory: Address,
    /// Serializes creation retries of failed wallets
    retry_lock: Arc<Mutex<()>>,
}

impl WalletProvisioner {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        queue: TransactionQueue,
        wallets: Arc<dyn WalletStore>,
        reconciler: Reconciler,
        factory: Address,
    ) -> Self {
        Self { chain, queue, wallets, reconciler, factory, retry_lock: Arc::new(Mutex::new(())) }
    }

    pub fn get(&self, owner: &Address) -> Result<Option<Wallet>, RelayerError> {
        Ok(self.wallets.get(owner)?)
    }

    pub fn all(&self) -> Result<Vec<Wallet>, RelayerError> {
        Ok(self.wallets.all()?)
    }

    /// Returns the owner's wallet, creating it if needed
    ///
    /// A new wallet is reserved as `PENDING` under a time based salt, then its creation is
    /// queued and it becomes `CREATED` (creation requested, not necessarily deployed). If the
    /// creation cannot be queued the wallet is marked `FAILED`, and the next call queues it again
    /// for the same smart account.
    pub async fn provision(&self, owner: Address) -> Result<Wallet, RelayerError> {
        for attempt in 0..PROVISION_RETRIES {
            if let Some(wallet) = self.wallets.get(&owner)? {
                if wallet.status == WalletStatus::Failed {
                    return self.retry_creation(owner).await;
                }
                return Ok(wallet);
            }

            let created_at = self.queue.clock().now();
            let salt = U256::from(created_at) + U256::from(attempt);
            let smart_account_address = self.chain.get_account_address(&owner, salt).await?;

            let wallet = Wallet {
                owner_address: owner,
                smart_account_address,
                salt,
                status: WalletStatus::Pending,
                creation_transaction_id: None,
                created_at,
            };

            match self.wallets.insert(wallet.clone()) {
                Ok(()) => {}
                Err(err) if err.is_duplicate() => {
                    debug!(?owner, attempt, "Owner reserved concurrently, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            return self.request_creation(wallet);
        }

        Err(RelayerError::ProvisioningExhausted(owner))
    }

    async fn retry_creation(&self, owner: Address) -> Result<Wallet, RelayerError> {
        let _lock = self.retry_lock.lock().await;
        let wallet = self.wallets.get(&owner)?.ok_or(RelayerError::WalletNotFound(owner))?;
        if wallet.status != WalletStatus::Failed {
            return Ok(wallet);
        }

        info!(
            ?owner,
            smart_account = ?wallet.smart_account_address,
            "Retrying smart account creation"
        );
        self.request_creation(wallet)
    }

    /// Queues the deployment of the reserved account and records the outcome on the wallet
    fn request_creation(&self, mut wallet: Wallet) -> Result<Wallet, RelayerError> {
        let owner = wallet.owner_address;
        let request = QueueRequest {
            owner_address: owner,
            target: self.factory,
            value: U256::zero(),
            call_data: create_account_call_data(owner, wallet.salt),
            operation_kind: OperationKind::AccountCreation,
            description: "Create smart account".into(),
        };

        match self.queue.enqueue(request) {
            Ok(transaction_id) => {
                wallet.status = WalletStatus::Created;
                wallet.creation_transaction_id = Some(transaction_id);
                self.wallets.update(&wallet)?;
                info!(
                    ?owner,
                    smart_account = ?wallet.smart_account_address,
                    %transaction_id,
                    "Smart account creation requested"
                );
                Ok(wallet)
            }
            Err(err) => {
                warn!(?owner, "Failed to queue smart account creation: {err}");
                wallet.status = WalletStatus::Failed;
                self.wallets.update(&wallet)?;
                Err(err)
            }
        }
    }

    /// Reports whether the owner's smart account is deployed, reconciling its creation
    pub async fn deployment_status(
        &self,
        owner: &Address,
    ) -> Result<DeploymentStatus, RelayerError> {
        let wallet = self.wallets.get(owner)?.ok_or(RelayerError::WalletNotFound(*owner))?;

        let creation_transaction = match &wallet.creation_transaction_id {
            Some(id) => Some(
                self.reconciler
                    .reconcile(
                        id,
                        &Expectation::AccountDeployed { address: wallet.smart_account_address },
                    )
                    .await?,
            ),
            None => None,
        };
        let deployed = self.chain.is_deployed(&wallet.smart_account_address).await?;

        Ok(DeploymentStatus { wallet, creation_transaction, deployed })
    }
}
