use credence_primitives::{Credential, CredentialDraft, CredentialId};
use credence_relayer::CredentialResponse;
use ethers::types::Address;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// The `credential` namespace RPC methods trait
///
/// Callers identify themselves by address; authorization is checked against the principal
/// directory the node was started with.
#[rpc(server, client, namespace = "credential")]
pub trait CredentialApi {
    /// Create a credential and queue its issuance from the issuer's smart account.
    #[method(name = "issue")]
    async fn issue(&self, draft: CredentialDraft) -> RpcResult<CredentialResponse>;

    /// Queue a positive verification of an `ISSUED` credential.
    #[method(name = "verify")]
    async fn verify(
        &self,
        verifier: Address,
        credential_id: CredentialId,
        notes: Option<String>,
    ) -> RpcResult<CredentialResponse>;

    /// Queue the rejection of an `ISSUED` credential.
    #[method(name = "reject")]
    async fn reject(
        &self,
        verifier: Address,
        credential_id: CredentialId,
        reason: String,
    ) -> RpcResult<CredentialResponse>;

    #[method(name = "revoke")]
    async fn revoke(
        &self,
        revoker: Address,
        credential_id: CredentialId,
        reason: String,
    ) -> RpcResult<CredentialResponse>;

    /// Current credential record, advanced with the outcome of its transactions.
    #[method(name = "get")]
    async fn get(&self, credential_id: CredentialId) -> RpcResult<Credential>;

    /// Wait a bounded time for the issuance to be confirmed.
    #[method(name = "awaitIssuance")]
    async fn await_issuance(&self, credential_id: CredentialId) -> RpcResult<Credential>;
}
