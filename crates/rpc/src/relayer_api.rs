use credence_primitives::TransactionId;
use credence_relayer::{
    DeploymentStatus, QueueRequest, QueueResponse, TransactionStatusResponse, WalletResponse,
};
use ethers::types::Address;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// The `relayer` namespace RPC methods trait
#[rpc(server, client, namespace = "relayer")]
pub trait RelayerApi {
    /// Queue a transaction to be relayed from the owner's smart account.
    ///
    /// Returns as soon as the record is stored; the transaction is submitted by the scheduler.
    #[method(name = "queueTransaction")]
    async fn queue_transaction(&self, request: QueueRequest) -> RpcResult<QueueResponse>;

    /// Current state of a queued transaction.
    #[method(name = "getTransactionStatus")]
    async fn get_transaction_status(
        &self,
        transaction_id: TransactionId,
    ) -> RpcResult<TransactionStatusResponse>;

    /// Provision a smart account for the owner, queueing its deployment.
    ///
    /// Provisioning an owner that already has a wallet returns the existing one.
    #[method(name = "provisionWallet")]
    async fn provision_wallet(&self, owner: Address) -> RpcResult<WalletResponse>;

    /// Whether the owner's smart account is deployed.
    #[method(name = "getWalletStatus")]
    async fn get_wallet_status(&self, owner: Address) -> RpcResult<DeploymentStatus>;
}
