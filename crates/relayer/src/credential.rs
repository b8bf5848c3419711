//! Credential lifecycle driven by relayed registry transactions
//!
//! ```text
//! PENDING -> PENDING_BLOCKCHAIN -> ISSUED -> PENDING_VERIFICATION -> VERIFIED | REJECTED
//!                                     \______________________________________> REVOKED
//! ```
//!
//! Every on-chain step is queued under the issuer's smart account and only advances the
//! credential once its transaction is confirmed, either by receipt or by reconciliation.
//! Ambiguous failures are watched for a bounded window; a decision or revocation still not
//! found on chain after it is abandoned and can be requested again.

use crate::{
    auth::{is_authorized, PrincipalDirectory},
    chain::ChainClient,
    error::{CredentialError, RelayerError},
    queue::{QueueRequest, TransactionQueue},
    reconcile::{is_ambiguous_failure, Expectation, Reconciler},
    scheduler::RelayerEvent,
};
use credence_contracts::{
    issue_credential_call_data, revoke_credential_call_data, verify_credential_call_data,
};
use credence_primitives::{
    constants::credential::{ISSUANCE_POLL_INTERVAL, ISSUANCE_POLL_RETRIES},
    Credential, CredentialDraft, CredentialId, OnChainStatus, OperationKind, QueuedTransaction,
    TransactionId, TransactionStatus, VerificationDecision, VerificationStatus,
};
use credence_storage::{CredentialStore, WalletStore};
use ethers::types::{Address, Bytes, U256};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn is_credential_transaction(tx: &QueuedTransaction) -> bool {
    matches!(
        tx.operation_kind,
        OperationKind::CredentialIssuance |
            OperationKind::CredentialVerification |
            OperationKind::CredentialRevocation
    )
}

fn expected_status(decision: VerificationDecision) -> OnChainStatus {
    match decision {
        VerificationDecision::Verified => OnChainStatus::Verified,
        VerificationDecision::Rejected => OnChainStatus::Rejected,
    }
}

#[derive(Debug)]
pub struct CredentialLifecycle {
    queue: TransactionQueue,
    credentials: Arc<dyn CredentialStore>,
    wallets: Arc<dyn WalletStore>,
    chain: Arc<dyn ChainClient>,
    reconciler: Reconciler,
    directory: Arc<dyn PrincipalDirectory>,
    registry: Address,
    issuance_poll_retries: usize,
    issuance_poll_interval: Duration,
    /// Serializes credential mutations
    lock: Mutex<()>,
}

impl CredentialLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: TransactionQueue,
        credentials: Arc<dyn CredentialStore>,
        wallets: Arc<dyn WalletStore>,
        chain: Arc<dyn ChainClient>,
        reconciler: Reconciler,
        directory: Arc<dyn PrincipalDirectory>,
        registry: Address,
    ) -> Self {
        Self {
            queue,
            credentials,
            wallets,
            chain,
            reconciler,
            directory,
            registry,
            issuance_poll_retries: ISSUANCE_POLL_RETRIES,
            issuance_poll_interval: Duration::from_secs(ISSUANCE_POLL_INTERVAL),
            lock: Mutex::new(()),
        }
    }

    /// Overrides the issuance polling window
    pub fn with_issuance_poll(mut self, retries: usize, interval: Duration) -> Self {
        self.issuance_poll_retries = retries;
        self.issuance_poll_interval = interval;
        self
    }

    /// Stores a new `PENDING` credential
    pub async fn create(&self, draft: CredentialDraft) -> Result<Credential, CredentialError> {
        let _lock = self.lock.lock().await;
        let credential = self.credentials.create(draft, self.queue.clock().now())?;
        debug!(credential_id = credential.credential_id, "Credential created");
        Ok(credential)
    }

    /// Queues the issuance of a `PENDING` credential
    pub async fn request_issuance(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        let _lock = self.lock.lock().await;
        let mut credential = self.load(id)?;

        match credential.verification_status {
            VerificationStatus::Pending => {}
            VerificationStatus::Revoked => return Err(CredentialError::Revoked(id)),
            _ => return Err(CredentialError::AlreadyIssued(id)),
        }

        let transaction_id = self.enqueue(
            &credential,
            issue_credential_call_data(&credential.draft()),
            OperationKind::CredentialIssuance,
            format!("Issue credential {id}"),
        )?;

        credential.issue_transaction_id = Some(transaction_id);
        credential.verification_status = VerificationStatus::PendingBlockchain;
        credential.last_error = None;
        self.credentials.update(&credential)?;

        info!(credential_id = id, %transaction_id, "Credential issuance queued");
        Ok(credential)
    }

    /// Creates the credential and queues its issuance
    ///
    /// Nothing is stored unless the issuer has a usable smart account.
    pub async fn issue(&self, draft: CredentialDraft) -> Result<Credential, CredentialError> {
        self.issuer_account(&draft.issuer)?;
        let credential = self.create(draft).await?;
        self.request_issuance(credential.credential_id).await
    }

    /// Returns the credential after advancing it with the outcome of its transactions
    pub async fn get(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        let _lock = self.lock.lock().await;
        self.sync(id).await
    }

    pub fn all(&self) -> Result<Vec<Credential>, CredentialError> {
        Ok(self.credentials.all()?)
    }

    /// Waits for a queued issuance to be confirmed
    ///
    /// Gives up after the polling window and returns the credential still `PENDING_BLOCKCHAIN`;
    /// it can be picked up again later.
    pub async fn await_issuance(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        let mut credential = self.get(id).await?;
        for _ in 0..self.issuance_poll_retries {
            if credential.verification_status != VerificationStatus::PendingBlockchain {
                return Ok(credential);
            }
            sleep(self.issuance_poll_interval).await;
            credential = self.get(id).await?;
        }

        if credential.verification_status == VerificationStatus::PendingBlockchain {
            warn!(credential_id = id, "Issuance not confirmed in time, leaving it pending");
        }
        Ok(credential)
    }

    /// Queues a positive verification of an `ISSUED` credential
    pub async fn request_verification(
        &self,
        caller: Address,
        id: CredentialId,
        notes: String,
    ) -> Result<Credential, CredentialError> {
        self.request_decision(caller, id, VerificationDecision::Verified, notes).await
    }

    /// Queues the rejection of an `ISSUED` credential
    pub async fn request_rejection(
        &self,
        caller: Address,
        id: CredentialId,
        reason: String,
    ) -> Result<Credential, CredentialError> {
        self.request_decision(caller, id, VerificationDecision::Rejected, reason).await
    }

    async fn request_decision(
        &self,
        caller: Address,
        id: CredentialId,
        decision: VerificationDecision,
        notes: String,
    ) -> Result<Credential, CredentialError> {
        let _lock = self.lock.lock().await;
        let mut credential = self.sync(id).await?;
        self.authorize(&caller, &credential)?;

        let status = credential.verification_status;
        match status {
            VerificationStatus::Issued => {}
            VerificationStatus::Revoked => return Err(CredentialError::Revoked(id)),
            VerificationStatus::Verified => return Err(CredentialError::AlreadyVerified(id)),
            _ => return Err(CredentialError::NotIssued { id, status }),
        }
        if credential.revoke_transaction_id.is_some() {
            return Err(CredentialError::RevocationPending(id));
        }
        let on_chain_id = credential.on_chain_id.ok_or(CredentialError::NotIssued { id, status })?;

        let transaction_id = self.enqueue(
            &credential,
            verify_credential_call_data(on_chain_id, decision, notes.clone()),
            OperationKind::CredentialVerification,
            format!("Record {decision} decision for credential {id}"),
        )?;

        credential.verify_transaction_id = Some(transaction_id);
        credential.pending_decision = Some(decision);
        credential.verification_status = VerificationStatus::PendingVerification;
        credential.last_error = None;
        if decision == VerificationDecision::Rejected {
            credential.reason = Some(notes);
        }
        self.credentials.update(&credential)?;

        info!(credential_id = id, %decision, %transaction_id, ?caller, "Verification queued");
        Ok(credential)
    }

    /// Revokes the credential
    ///
    /// A credential that never reached the chain is revoked at once. One whose issuance is in
    /// flight gets its revocation queued as soon as the issuance is confirmed. Otherwise the
    /// revocation is queued and the credential becomes `REVOKED` once it is confirmed.
    pub async fn request_revocation(
        &self,
        caller: Address,
        id: CredentialId,
        reason: String,
    ) -> Result<Credential, CredentialError> {
        let _lock = self.lock.lock().await;
        let mut credential = self.sync(id).await?;
        self.authorize(&caller, &credential)?;

        let status = credential.verification_status;
        if status == VerificationStatus::Revoked {
            return Err(CredentialError::Revoked(id));
        }
        if !credential.revocable {
            return Err(CredentialError::NotRevocable(id));
        }
        if credential.revoke_transaction_id.is_some() || credential.revocation_requested {
            return Err(CredentialError::RevocationPending(id));
        }

        credential.reason = Some(reason.clone());
        let now = self.queue.clock().now();

        match (status, credential.on_chain_id) {
            (VerificationStatus::Pending, _) => {
                credential.verification_status = VerificationStatus::Revoked;
                credential.revoked_at = Some(now);
                info!(credential_id = id, ?caller, "Credential revoked before issuance");
            }
            (_, Some(on_chain_id)) => {
                let transaction_id = self.enqueue(
                    &credential,
                    revoke_credential_call_data(on_chain_id, reason),
                    OperationKind::CredentialRevocation,
                    format!("Revoke credential {id}"),
                )?;
                credential.revoke_transaction_id = Some(transaction_id);
                credential.last_error = None;
                info!(credential_id = id, %transaction_id, ?caller, "Revocation queued");
            }
            (VerificationStatus::PendingBlockchain, None) => {
                credential.revocation_requested = true;
                info!(credential_id = id, ?caller, "Revocation deferred until issuance confirms");
            }
            (status, None) => return Err(CredentialError::NotIssued { id, status }),
        }

        self.credentials.update(&credential)?;
        Ok(credential)
    }

    /// Advances the credential referencing the transaction of each relayer event
    ///
    /// Ambiguous failures of credential transactions are observed again over the polling window,
    /// so a transaction the node already knew is picked up once it lands.
    pub fn spawn_observer(
        self: Arc<Self>,
        mut events: broadcast::Receiver<RelayerEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };

                match event {
                    Ok(event) => {
                        let tx = event.transaction();
                        match self.observe(&tx.transaction_id).await {
                            Ok(true) => {}
                            Ok(false) if is_credential_transaction(tx) => {
                                self.clone().spawn_watch(tx.transaction_id, cancel.clone());
                            }
                            Ok(false) => {}
                            Err(err) => warn!("Failed to apply relayer event: {err}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Credential observer lagged behind by {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Observes an ambiguously failed transaction until it is settled or the window is over
    fn spawn_watch(self: Arc<Self>, transaction_id: TransactionId, cancel: CancellationToken) {
        debug!(%transaction_id, "Watching ambiguous failure");
        tokio::spawn(async move {
            // one extra round so the last one runs after the window closed
            for _ in 0..=self.issuance_poll_retries {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(self.issuance_poll_interval) => {}
                }
                match self.observe(&transaction_id).await {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(err) => warn!(%transaction_id, "Failed to observe transaction: {err}"),
                }
            }
            warn!(%transaction_id, "Ambiguous failure not found on chain, no longer watching");
        });
    }

    /// Syncs the credential that queued the transaction
    ///
    /// Returns `false` while the transaction is an ambiguous failure not reconciled yet.
    async fn observe(&self, transaction_id: &TransactionId) -> Result<bool, CredentialError> {
        let _lock = self.lock.lock().await;
        if let Some(credential) = self.credentials.find_by_transaction_id(transaction_id)? {
            self.sync(credential.credential_id).await?;
        }
        Ok(!is_ambiguous_failure(&self.queue.status_of(transaction_id)?))
    }

    fn load(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        self.credentials.get(id)?.ok_or(CredentialError::NotFound(id))
    }

    fn issuer_account(&self, issuer: &Address) -> Result<Address, RelayerError> {
        match self.wallets.get(issuer)? {
            Some(wallet) if wallet.is_usable() => Ok(wallet.smart_account_address),
            _ => Err(RelayerError::UnknownAccount(*issuer)),
        }
    }

    /// Whether an ambiguous failure is still inside the window in which it may be reconciled
    fn within_window(&self, tx: &QueuedTransaction, now: u64) -> bool {
        let window = self.issuance_poll_interval.saturating_mul(self.issuance_poll_retries as u32);
        let window = window.as_millis() as u64;
        is_ambiguous_failure(tx) &&
            tx.processed_at.map_or(true, |failed_at| now < failed_at.saturating_add(window))
    }

    fn authorize(&self, caller: &Address, credential: &Credential) -> Result<(), CredentialError> {
        if is_authorized(self.directory.as_ref(), caller, &credential.issuer) {
            Ok(())
        } else {
            Err(CredentialError::Unauthorized { caller: *caller, id: credential.credential_id })
        }
    }

    fn enqueue(
        &self,
        credential: &Credential,
        call_data: Bytes,
        operation_kind: OperationKind,
        description: String,
    ) -> Result<TransactionId, RelayerError> {
        self.queue.enqueue(QueueRequest {
            owner_address: credential.issuer,
            target: self.registry,
            value: U256::zero(),
            call_data,
            operation_kind,
            description,
        })
    }

    /// Smart account that sent the transaction, i.e. the issuer as seen by the registry
    fn sender_of(
        &self,
        tx: &QueuedTransaction,
        credential: &Credential,
    ) -> Result<Address, RelayerError> {
        if let Some(address) = tx.smart_account_address {
            return Ok(address);
        }
        self.wallets
            .get(&credential.issuer)?
            .map(|wallet| wallet.smart_account_address)
            .ok_or(RelayerError::UnknownAccount(credential.issuer))
    }

    /// One observation step, reconciling ambiguous failures on the way
    async fn sync(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        let mut credential = self.load(id)?;
        let before = credential.clone();
        let now = self.queue.clock().now();

        match credential.verification_status {
            VerificationStatus::PendingBlockchain => self.sync_issuance(&mut credential).await?,
            VerificationStatus::PendingVerification => {
                self.sync_verification(&mut credential, now).await?
            }
            _ => {}
        }
        if credential.verification_status != VerificationStatus::Revoked {
            self.sync_revocation(&mut credential, now).await?;
        }
        if credential.revocation_requested &&
            credential.verification_status == VerificationStatus::Issued
        {
            self.queue_deferred_revocation(&mut credential);
        }

        if credential != before {
            match self.credentials.update(&credential) {
                Ok(()) => {}
                Err(err) if err.is_duplicate() => {
                    warn!(credential_id = id, "On-chain id already held by another credential");
                    return Ok(before);
                }
                Err(err) => return Err(err.into()),
            }
            info!(
                credential_id = id,
                from = %before.verification_status,
                to = %credential.verification_status,
                "Credential updated"
            );
        }
        Ok(credential)
    }

    fn queue_deferred_revocation(&self, credential: &mut Credential) {
        let Some(on_chain_id) = credential.on_chain_id else {
            return;
        };
        let reason = credential.reason.clone().unwrap_or_default();
        match self.enqueue(
            credential,
            revoke_credential_call_data(on_chain_id, reason),
            OperationKind::CredentialRevocation,
            format!("Revoke credential {}", credential.credential_id),
        ) {
            Ok(transaction_id) => {
                credential.revoke_transaction_id = Some(transaction_id);
                credential.revocation_requested = false;
                info!(
                    credential_id = credential.credential_id,
                    %transaction_id,
                    "Deferred revocation queued"
                );
            }
            Err(err) => {
                warn!(
                    credential_id = credential.credential_id,
                    "Failed to queue revocation: {err}"
                );
                credential.last_error = Some(err.to_string());
            }
        }
    }

    async fn sync_issuance(&self, credential: &mut Credential) -> Result<(), RelayerError> {
        let Some(tx_id) = credential.issue_transaction_id else {
            return Ok(());
        };
        let tx = self.queue.status_of(&tx_id)?;
        let issuer_account = self.sender_of(&tx, credential)?;

        let tx = self
            .reconciler
            .reconcile(
                &tx_id,
                &Expectation::CredentialIssued {
                    credential: Box::new(credential.clone()),
                    issuer_account,
                },
            )
            .await?;

        match tx.status {
            TransactionStatus::Confirmed => {
                let candidate = match tx.entity_id {
                    Some(id) => Some(id),
                    None => self.reconciler.find_issued(credential, &issuer_account).await?,
                };
                let Some(on_chain_id) = candidate else {
                    debug!(
                        credential_id = credential.credential_id,
                        "Issued credential not found on chain yet"
                    );
                    return Ok(());
                };

                // independent confirmation of the registry state
                let on_chain = self.chain.get_credential(on_chain_id).await?;
                let owner = self.chain.owner_of(on_chain_id).await?;
                let confirmed = on_chain.is_some_and(|on_chain| {
                    credential.matches_on_chain(&on_chain, &issuer_account)
                }) && owner == Some(credential.subject);

                if confirmed {
                    credential.on_chain_id = Some(on_chain_id);
                    credential.verification_status = VerificationStatus::Issued;
                    credential.last_error = None;
                } else {
                    warn!(
                        credential_id = credential.credential_id,
                        %on_chain_id,
                        "On-chain credential does not match the issued one"
                    );
                }
            }
            TransactionStatus::Failed => credential.last_error = tx.last_error,
            TransactionStatus::Pending => {}
        }
        Ok(())
    }

    async fn sync_verification(
        &self,
        credential: &mut Credential,
        now: u64,
    ) -> Result<(), RelayerError> {
        let (Some(tx_id), Some(decision), Some(on_chain_id)) =
            (credential.verify_transaction_id, credential.pending_decision, credential.on_chain_id)
        else {
            return Ok(());
        };

        let tx = self
            .reconciler
            .reconcile(
                &tx_id,
                &Expectation::CredentialStatus { on_chain_id, status: expected_status(decision) },
            )
            .await?;

        match tx.status {
            TransactionStatus::Confirmed => {
                credential.verification_status = decision.final_status();
                credential.pending_decision = None;
                credential.verified_at = Some(now);
            }
            TransactionStatus::Failed if self.within_window(&tx, now) => {
                credential.last_error = tx.last_error;
            }
            TransactionStatus::Failed => {
                if is_ambiguous_failure(&tx) {
                    warn!(
                        credential_id = credential.credential_id,
                        transaction_id = %tx_id,
                        "Decision not found on chain, back to ISSUED"
                    );
                }
                credential.verification_status = VerificationStatus::Issued;
                credential.pending_decision = None;
                credential.last_error = tx.last_error;
            }
            TransactionStatus::Pending => {}
        }
        Ok(())
    }

    async fn sync_revocation(
        &self,
        credential: &mut Credential,
        now: u64,
    ) -> Result<(), RelayerError> {
        let (Some(tx_id), Some(on_chain_id)) =
            (credential.revoke_transaction_id, credential.on_chain_id)
        else {
            return Ok(());
        };

        let tx = self
            .reconciler
            .reconcile(
                &tx_id,
                &Expectation::CredentialStatus { on_chain_id, status: OnChainStatus::Revoked },
            )
            .await?;

        match tx.status {
            TransactionStatus::Confirmed => {
                credential.verification_status = VerificationStatus::Revoked;
                credential.pending_decision = None;
                credential.revoked_at = Some(now);
            }
            TransactionStatus::Failed if self.within_window(&tx, now) => {
                credential.last_error = tx.last_error;
            }
            TransactionStatus::Failed => {
                if is_ambiguous_failure(&tx) {
                    warn!(
                        credential_id = credential.credential_id,
                        transaction_id = %tx_id,
                        "Revocation not found on chain, dropping it"
                    );
                }
                credential.revoke_transaction_id = None;
                credential.last_error = tx.last_error;
            }
            TransactionStatus::Pending => {}
        }
        Ok(())
    }
}
