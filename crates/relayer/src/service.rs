//! Boundary operations of the relayer

use crate::{
    auth::PrincipalDirectory,
    builder::OperationBuilder,
    chain::ChainClient,
    credential::CredentialLifecycle,
    error::{ConfigError, CredentialError, RelayerError},
    ethereum::ContractAddresses,
    queue::{QueueRequest, TransactionQueue},
    reconcile::Reconciler,
    scheduler::{RelayerScheduler, SchedulerConfig},
    signer::RelayerSigner,
    wallet::{DeploymentStatus, WalletProvisioner},
};
use credence_primitives::{
    constants::credential::{ISSUANCE_POLL_INTERVAL, ISSUANCE_POLL_RETRIES},
    Clock, Credential, CredentialDraft, CredentialId, QueuedTransaction, TransactionId,
    TransactionStatus, UserOperationHash, VerificationStatus, WalletStatus,
};
use credence_storage::Stores;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResponse {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub error: Option<String>,
    pub user_operation_hash: Option<UserOperationHash>,
    pub reconciled: bool,
}

impl From<QueuedTransaction> for TransactionStatusResponse {
    fn from(tx: QueuedTransaction) -> Self {
        Self {
            transaction_id: tx.transaction_id,
            status: tx.status,
            tx_hash: tx.tx_hash,
            block_number: tx.block_number,
            error: tx.last_error,
            user_operation_hash: tx.user_operation_hash,
            reconciled: tx.reconciled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub smart_account_address: Address,
    pub creation_transaction_id: Option<TransactionId>,
    pub status: WalletStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub credential_id: CredentialId,
    pub status: VerificationStatus,
}

impl From<&Credential> for CredentialResponse {
    fn from(credential: &Credential) -> Self {
        Self { credential_id: credential.credential_id, status: credential.verification_status }
    }
}

/// Everything the relayer needs to send transactions
#[derive(Debug, Clone)]
pub struct RelayerSetup {
    pub chain: Arc<dyn ChainClient>,
    pub signer: RelayerSigner,
    pub contracts: ContractAddresses,
    pub paymaster: Option<Address>,
    pub scheduler: SchedulerConfig,
    pub issuance_poll_retries: usize,
    pub issuance_poll_interval: Duration,
}

impl RelayerSetup {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: RelayerSigner,
        contracts: ContractAddresses,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            chain,
            signer,
            contracts,
            paymaster: None,
            scheduler,
            issuance_poll_retries: ISSUANCE_POLL_RETRIES,
            issuance_poll_interval: Duration::from_secs(ISSUANCE_POLL_INTERVAL),
        }
    }
}

#[derive(Debug)]
struct Components {
    scheduler: Arc<RelayerScheduler>,
    provisioner: WalletProvisioner,
    credentials: Arc<CredentialLifecycle>,
}

/// Relayer entry point for collaborators
///
/// Without a valid configuration every read is still served while operations that need the
/// chain fail with [ConfigError].
#[derive(Debug)]
pub struct CredenceService {
    queue: TransactionQueue,
    stores: Stores,
    components: Result<Components, ConfigError>,
}

impl CredenceService {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn PrincipalDirectory>,
        setup: Result<RelayerSetup, ConfigError>,
    ) -> Self {
        let queue =
            TransactionQueue::new(stores.transactions.clone(), stores.wallets.clone(), clock);

        let components = setup.map(|setup| {
            let reconciler =
                Reconciler::new(setup.chain.clone(), queue.clone(), stores.credentials.clone());
            let builder = OperationBuilder::new(
                setup.chain.clone(),
                setup.contracts.entry_point,
                setup.paymaster,
            );
            let scheduler = Arc::new(RelayerScheduler::new(
                queue.clone(),
                setup.chain.clone(),
                builder,
                setup.signer,
                setup.scheduler,
            ));
            let provisioner = WalletProvisioner::new(
                setup.chain.clone(),
                queue.clone(),
                stores.wallets.clone(),
                reconciler.clone(),
                setup.contracts.account_factory,
            );
            let credentials = Arc::new(
                CredentialLifecycle::new(
                    queue.clone(),
                    stores.credentials.clone(),
                    stores.wallets.clone(),
                    setup.chain,
                    reconciler,
                    directory,
                    setup.contracts.credential_registry,
                )
                .with_issuance_poll(setup.issuance_poll_retries, setup.issuance_poll_interval),
            );
            Components { scheduler, provisioner, credentials }
        });

        if let Err(err) = &components {
            warn!("Relayer misconfigured, transactions will not be processed: {err}");
        }

        Self { queue, stores, components }
    }

    fn components(&self) -> Result<&Components, ConfigError> {
        self.components.as_ref().map_err(Clone::clone)
    }

    /// Starts the scheduler loop and the credential observer
    ///
    /// Nothing is started without a valid configuration.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        match &self.components {
            Ok(components) => {
                let events = components.scheduler.subscribe();
                info!("Starting relayer");
                vec![
                    components.credentials.clone().spawn_observer(events, cancel.clone()),
                    components.scheduler.clone().spawn(cancel),
                ]
            }
            Err(_) => vec![],
        }
    }

    pub fn scheduler(&self) -> Option<&Arc<RelayerScheduler>> {
        self.components.as_ref().ok().map(|c| &c.scheduler)
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn queue_transaction(&self, request: QueueRequest) -> Result<QueueResponse, RelayerError> {
        self.components()?;
        let transaction_id = self.queue.enqueue(request)?;
        Ok(QueueResponse { transaction_id, status: TransactionStatus::Pending })
    }

    pub fn transaction_status(
        &self,
        id: &TransactionId,
    ) -> Result<TransactionStatusResponse, RelayerError> {
        Ok(self.queue.status_of(id)?.into())
    }

    pub async fn provision_wallet(&self, owner: Address) -> Result<WalletResponse, RelayerError> {
        let wallet = self.components()?.provisioner.provision(owner).await?;
        Ok(WalletResponse {
            smart_account_address: wallet.smart_account_address,
            creation_transaction_id: wallet.creation_transaction_id,
            status: wallet.status,
        })
    }

    pub async fn wallet_status(&self, owner: &Address) -> Result<DeploymentStatus, RelayerError> {
        self.components()?.provisioner.deployment_status(owner).await
    }

    pub async fn issue_credential(
        &self,
        draft: CredentialDraft,
    ) -> Result<CredentialResponse, CredentialError> {
        let credential = self.lifecycle()?.issue(draft).await?;
        Ok((&credential).into())
    }

    pub async fn verify_credential(
        &self,
        verifier: Address,
        id: CredentialId,
        notes: String,
    ) -> Result<CredentialResponse, CredentialError> {
        let credential = self.lifecycle()?.request_verification(verifier, id, notes).await?;
        Ok((&credential).into())
    }

    pub async fn reject_credential(
        &self,
        verifier: Address,
        id: CredentialId,
        reason: String,
    ) -> Result<CredentialResponse, CredentialError> {
        let credential = self.lifecycle()?.request_rejection(verifier, id, reason).await?;
        Ok((&credential).into())
    }

    pub async fn revoke_credential(
        &self,
        revoker: Address,
        id: CredentialId,
        reason: String,
    ) -> Result<CredentialResponse, CredentialError> {
        let credential = self.lifecycle()?.request_revocation(revoker, id, reason).await?;
        Ok((&credential).into())
    }

    /// Returns the credential, advancing it first when the relayer is configured
    pub async fn get_credential(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        match &self.components {
            Ok(components) => components.credentials.get(id).await,
            Err(_) => self.stores.credentials.get(id)?.ok_or(CredentialError::NotFound(id)),
        }
    }

    pub async fn await_issuance(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        self.lifecycle()?.await_issuance(id).await
    }

    fn lifecycle(&self) -> Result<&Arc<CredentialLifecycle>, RelayerError> {
        Ok(&self.components()?.credentials)
    }
}
