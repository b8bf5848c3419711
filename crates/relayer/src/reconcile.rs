//! Reconciliation of ambiguous submission failures against on-chain state
//!
//! A submission can fail from the relayer's point of view while the transaction still made it
//! into the chain (the node already knew it, the nonce moved on, ...). Such records are `FAILED`
//! with an error of the [Ambiguous](FailureKind::Ambiguous) kind. The [Reconciler] looks for the
//! entity the transaction was meant to create or update and, when found, flips the record to
//! `CONFIRMED`.

use crate::{chain::ChainClient, error::RelayerError, queue::TransactionQueue};
use credence_primitives::{Credential, OnChainStatus, QueuedTransaction, TransactionId};
use credence_storage::CredentialStore;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Error messages meaning the transaction may have been included anyway
const AMBIGUOUS_ERRORS: [&str; 6] = [
    "already known",
    "known transaction",
    "already imported",
    "nonce too low",
    "replacement transaction underpriced",
    "aa25 invalid account nonce",
];

/// Kind of a recorded submission failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transaction never reached the chain
    Submission,
    /// The transaction possibly reached the chain
    Ambiguous,
}

/// Classifies the raw error text of a failed submission
pub fn classify_failure(error: &str) -> FailureKind {
    let error = error.to_lowercase();
    if AMBIGUOUS_ERRORS.iter().any(|pattern| error.contains(pattern)) {
        FailureKind::Ambiguous
    } else {
        FailureKind::Submission
    }
}

/// Whether the failed record may be flipped by reconciliation
pub fn is_ambiguous_failure(tx: &QueuedTransaction) -> bool {
    tx.is_failed() &&
        tx.last_error.as_deref().map(classify_failure) == Some(FailureKind::Ambiguous)
}

/// On-chain evidence that a transaction went through
#[derive(Debug, Clone)]
pub enum Expectation {
    /// The smart account has code
    AccountDeployed { address: Address },
    /// The registry holds the credential, issued by `issuer_account` to its subject
    CredentialIssued { credential: Box<Credential>, issuer_account: Address },
    /// The registry reports the credential with `status`
    CredentialStatus { on_chain_id: U256, status: OnChainStatus },
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    chain: Arc<dyn ChainClient>,
    queue: TransactionQueue,
    credentials: Arc<dyn CredentialStore>,
}

impl Reconciler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        queue: TransactionQueue,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self { chain, queue, credentials }
    }

    /// Reconciles the transaction against the expected on-chain state
    ///
    /// Only ambiguous failures are touched; every other record is returned as stored. Running it
    /// again on a reconciled record is a no-op.
    pub async fn reconcile(
        &self,
        id: &TransactionId,
        expectation: &Expectation,
    ) -> Result<QueuedTransaction, RelayerError> {
        let mut tx = self.queue.status_of(id)?;
        if !is_ambiguous_failure(&tx) {
            return Ok(tx);
        }

        let found = match expectation {
            Expectation::AccountDeployed { address } => {
                self.chain.is_deployed(address).await?.then_some(None)
            }
            Expectation::CredentialIssued { credential, issuer_account } => {
                self.find_issued(credential, issuer_account).await?.map(Some)
            }
            Expectation::CredentialStatus { on_chain_id, status } => self
                .chain
                .get_credential(*on_chain_id)
                .await?
                .filter(|on_chain| on_chain.status == *status)
                .map(|_| None),
        };

        match found {
            Some(entity_id) => {
                tx.mark_reconciled(entity_id, self.queue.clock().now());
                self.queue.update(&tx)?;
                info!(
                    transaction_id = %tx.transaction_id,
                    entity_id = ?tx.entity_id,
                    "Reconciled failed transaction as confirmed"
                );
            }
            None => {
                debug!(
                    transaction_id = %tx.transaction_id,
                    "No on-chain evidence for failed transaction"
                );
            }
        }

        Ok(tx)
    }

    /// Looks for an on-chain credential matching `credential` that no other record holds
    pub(crate) async fn find_issued(
        &self,
        credential: &Credential,
        issuer_account: &Address,
    ) -> Result<Option<U256>, RelayerError> {
        for id in self.chain.issued_credentials(&credential.subject).await? {
            if let Some(holder) = self.credentials.find_by_on_chain_id(&id)? {
                if holder.credential_id == credential.credential_id {
                    return Ok(Some(id));
                }
                continue;
            }

            let Some(on_chain) = self.chain.get_credential(id).await? else {
                continue;
            };
            if !credential.matches_on_chain(&on_chain, issuer_account) {
                continue;
            }
            if self.chain.owner_of(id).await? == Some(credential.subject) {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }
}
