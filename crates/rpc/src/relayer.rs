use crate::{error::JsonRpcError, relayer_api::RelayerApiServer};
use async_trait::async_trait;
use credence_primitives::TransactionId;
use credence_relayer::{
    CredenceService, DeploymentStatus, QueueRequest, QueueResponse, TransactionStatusResponse,
    WalletResponse,
};
use ethers::types::Address;
use jsonrpsee::core::RpcResult;
use std::sync::Arc;
use tracing::trace;

pub struct RelayerApiServerImpl {
    pub service: Arc<CredenceService>,
}

#[async_trait]
impl RelayerApiServer for RelayerApiServerImpl {
    async fn queue_transaction(&self, request: QueueRequest) -> RpcResult<QueueResponse> {
        trace!("Received transaction {request:?}");
        self.service.queue_transaction(request).map_err(|err| JsonRpcError::from(err).into())
    }

    async fn get_transaction_status(
        &self,
        transaction_id: TransactionId,
    ) -> RpcResult<TransactionStatusResponse> {
        self.service
            .transaction_status(&transaction_id)
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn provision_wallet(&self, owner: Address) -> RpcResult<WalletResponse> {
        self.service.provision_wallet(owner).await.map_err(|err| JsonRpcError::from(err).into())
    }

    async fn get_wallet_status(&self, owner: Address) -> RpcResult<DeploymentStatus> {
        self.service.wallet_status(&owner).await.map_err(|err| JsonRpcError::from(err).into())
    }
}
