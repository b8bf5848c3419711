//! [ChainClient] backed by an ethers provider

use crate::{
    chain::{ChainClient, ChainError, ChainReceipt},
    signer::RelayerSigner,
};
use async_trait::async_trait;
use credence_contracts::{
    issued_credentials, user_operation_outcomes, AccountFactory, ContractCallError,
    CredentialRegistry, EntryPoint,
};
use credence_primitives::{
    constants::entry_point::NONCE_KEY, OnChainCredential, UserOperationSigned,
};
use ethers::{
    middleware::SignerMiddleware,
    prelude::k256::ecdsa::SigningKey,
    providers::Middleware,
    signers::Wallet,
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes,
        Eip1559TransactionRequest, H256, U256, U64,
    },
};
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tracing::trace;

type Client<M> = SignerMiddleware<Arc<M>, Wallet<SigningKey>>;

/// Contract addresses the chain client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub entry_point: Address,
    pub account_factory: Address,
    pub credential_registry: Address,
}

/// Chain client over an ethers [Middleware]
///
/// Transactions are signed with the relayer key. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct EthersChainClient<M: Middleware + 'static> {
    eth_client: Arc<Client<M>>,
    entry_point: EntryPoint<Client<M>>,
    factory: AccountFactory<Client<M>>,
    registry: CredentialRegistry<Client<M>>,
    from: Address,
    chain_id: u64,
    timeout: Duration,
}

impl<M: Middleware + 'static> fmt::Debug for EthersChainClient<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthersChainClient")
            .field("entry_point", &self.entry_point.address())
            .field("account_factory", &self.factory.address())
            .field("credential_registry", &self.registry.address())
            .field("from", &self.from)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl<M: Middleware + 'static> EthersChainClient<M> {
    pub fn new(
        eth_client: Arc<M>,
        signer: &RelayerSigner,
        contracts: ContractAddresses,
        timeout: Duration,
    ) -> Self {
        let eth_client = Arc::new(signer.middleware(eth_client));
        Self {
            entry_point: EntryPoint::new(eth_client.clone(), contracts.entry_point),
            factory: AccountFactory::new(eth_client.clone(), contracts.account_factory),
            registry: CredentialRegistry::new(eth_client.clone(), contracts.credential_registry),
            eth_client,
            from: signer.address(),
            chain_id: signer.chain_id(),
            timeout,
        }
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ContractCallError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(ChainError::from),
            Err(_) => Err(ChainError::Timeout { operation, seconds: self.timeout.as_secs() }),
        }
    }

    /// Fills gas, fees and nonce the way a bundler fills its bundle transaction, then broadcasts
    async fn send(&self, tx: TypedTransaction) -> Result<H256, ChainError> {
        let client = self.eth_client.clone();
        let from = self.from;
        let chain_id = self.chain_id;

        self.timed("send transaction", async move {
            let nonce = client
                .get_transaction_count(from, Some(BlockNumber::Pending.into()))
                .await
                .map_err(ContractCallError::from_middleware_error::<Client<M>>)?;
            let gas = client
                .estimate_gas(&tx, None)
                .await
                .map_err(ContractCallError::from_middleware_error::<Client<M>>)?;
            let (max_fee_per_gas, max_priority_fee) = client
                .estimate_eip1559_fees(None)
                .await
                .map_err(ContractCallError::from_middleware_error::<Client<M>>)?;

            let tx = TypedTransaction::Eip1559(Eip1559TransactionRequest {
                to: tx.to().cloned(),
                from: Some(from),
                data: tx.data().cloned(),
                chain_id: Some(U64::from(chain_id)),
                max_priority_fee_per_gas: Some(max_priority_fee),
                max_fee_per_gas: Some(max_fee_per_gas),
                gas: Some(gas),
                nonce: Some(nonce),
                value: tx.value().cloned(),
                access_list: Default::default(),
            });

            trace!("Sending transaction to the execution client: {tx:?}");

            let pending = client
                .send_transaction(tx, None)
                .await
                .map_err(ContractCallError::from_middleware_error::<Client<M>>)?;
            Ok(pending.tx_hash())
        })
        .await
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for EthersChainClient<M> {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn get_nonce(&self, sender: &Address) -> Result<U256, ChainError> {
        self.timed("getNonce", self.entry_point.get_nonce(sender, NONCE_KEY.into())).await
    }

    async fn estimate_fees(&self) -> Result<(U256, U256), ChainError> {
        self.timed("estimate fees", async {
            self.eth_client
                .estimate_eip1559_fees(None)
                .await
                .map_err(ContractCallError::from_middleware_error::<Client<M>>)
        })
        .await
    }

    async fn estimate_call_gas(
        &self,
        sender: &Address,
        call_data: &Bytes,
    ) -> Result<U256, ChainError> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(self.entry_point.address())
            .to(*sender)
            .data(call_data.clone())
            .into();
        self.timed("estimate call gas", async {
            self.eth_client
                .estimate_gas(&tx, None)
                .await
                .map_err(ContractCallError::from_middleware_error::<Client<M>>)
        })
        .await
    }

    async fn handle_ops(
        &self,
        ops: Vec<UserOperationSigned>,
        beneficiary: Address,
    ) -> Result<H256, ChainError> {
        let tx = self.entry_point.handle_ops_tx(ops, beneficiary);
        self.send(tx).await
    }

    async fn send_transaction(
        &self,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<H256, ChainError> {
        let tx: TypedTransaction =
            Eip1559TransactionRequest::new().to(to).value(value).data(data).into();
        self.send(tx).await
    }

    async fn receipt(&self, tx_hash: &H256) -> Result<Option<ChainReceipt>, ChainError> {
        let receipt = self
            .timed("receipt", async {
                self.eth_client
                    .get_transaction_receipt(*tx_hash)
                    .await
                    .map_err(ContractCallError::from_middleware_error::<Client<M>>)
            })
            .await?;

        Ok(receipt.and_then(|receipt| {
            let block_number = receipt.block_number?.as_u64();
            Some(ChainReceipt {
                transaction_hash: receipt.transaction_hash,
                block_number,
                success: receipt.status == Some(U64::one()),
                user_operations: user_operation_outcomes(&receipt),
                issued_credentials: issued_credentials(&receipt),
            })
        }))
    }

    async fn get_account_address(
        &self,
        owner: &Address,
        salt: U256,
    ) -> Result<Address, ChainError> {
        self.timed("getAddress", self.factory.get_address(owner, salt)).await
    }

    async fn is_deployed(&self, address: &Address) -> Result<bool, ChainError> {
        self.timed("getCode", self.factory.is_deployed(address)).await
    }

    async fn issued_credentials(&self, subject: &Address) -> Result<Vec<U256>, ChainError> {
        self.timed("CredentialIssued logs", self.registry.issued_to(subject)).await
    }

    async fn get_credential(&self, id: U256) -> Result<Option<OnChainCredential>, ChainError> {
        self.timed("getCredential", self.registry.get_credential(id)).await
    }

    async fn owner_of(&self, id: U256) -> Result<Option<Address>, ChainError> {
        self.timed("ownerOf", self.registry.owner_of(id)).await
    }
}
