use crate::{credential_api::CredentialApiServer, error::JsonRpcError};
use async_trait::async_trait;
use credence_primitives::{Credential, CredentialDraft, CredentialId};
use credence_relayer::{CredenceService, CredentialResponse};
use ethers::types::Address;
use jsonrpsee::core::RpcResult;
use std::sync::Arc;
use tracing::trace;

pub struct CredentialApiServerImpl {
    pub service: Arc<CredenceService>,
}

#[async_trait]
impl CredentialApiServer for CredentialApiServerImpl {
    async fn issue(&self, draft: CredentialDraft) -> RpcResult<CredentialResponse> {
        trace!("Received credential {draft:?}");
        self.service.issue_credential(draft).await.map_err(|err| JsonRpcError::from(err).into())
    }

    async fn verify(
        &self,
        verifier: Address,
        credential_id: CredentialId,
        notes: Option<String>,
    ) -> RpcResult<CredentialResponse> {
        self.service
            .verify_credential(verifier, credential_id, notes.unwrap_or_default())
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn reject(
        &self,
        verifier: Address,
        credential_id: CredentialId,
        reason: String,
    ) -> RpcResult<CredentialResponse> {
        self.service
            .reject_credential(verifier, credential_id, reason)
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn revoke(
        &self,
        revoker: Address,
        credential_id: CredentialId,
        reason: String,
    ) -> RpcResult<CredentialResponse> {
        self.service
            .revoke_credential(revoker, credential_id, reason)
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn get(&self, credential_id: CredentialId) -> RpcResult<Credential> {
        self.service
            .get_credential(credential_id)
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn await_issuance(&self, credential_id: CredentialId) -> RpcResult<Credential> {
        self.service
            .await_issuance(credential_id)
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }
}
