//! Credential registry bindings

pub use super::gen::{
    credential_registry_api::{IssueCredentialCall, RevokeCredentialCall, VerifyCredentialCall},
    CredentialIssuedFilter, CredentialRegistryAPI,
};
use crate::error::ContractCallError;
use credence_primitives::{CredentialDraft, OnChainCredential, VerificationDecision};
use ethers::{
    abi::AbiEncode,
    contract::parse_log,
    providers::Middleware,
    types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256},
};
use std::sync::Arc;

/// Call data issuing the drafted credential
pub fn issue_credential_call_data(draft: &CredentialDraft) -> Bytes {
    IssueCredentialCall {
        subject: draft.subject,
        name: draft.title.clone(),
        description: draft.description.clone(),
        metadata_ref: draft.metadata_ref.clone(),
        credential_type: draft.credential_type.clone(),
        valid_until: draft.valid_until,
        evidence_hash: draft.evidence_hash.0,
        revocable: draft.revocable,
    }
    .encode()
    .into()
}

/// Call data recording a verification decision
pub fn verify_credential_call_data(
    credential_id: U256,
    decision: VerificationDecision,
    notes: String,
) -> Bytes {
    VerifyCredentialCall { credential_id, status: decision as u8, notes }.encode().into()
}

/// Call data revoking a credential
pub fn revoke_credential_call_data(credential_id: U256, reason: String) -> Bytes {
    RevokeCredentialCall { credential_id, reason }.encode().into()
}

/// Ids of the credentials whose issuance is recorded in the receipt
pub fn issued_credentials(receipt: &TransactionReceipt) -> Vec<U256> {
    receipt
        .logs
        .iter()
        .filter_map(|log| parse_log::<CredentialIssuedFilter>(log.clone()).ok())
        .map(|event| event.credential_id)
        .collect()
}

#[derive(Clone)]
pub struct CredentialRegistry<M: Middleware + 'static> {
    address: Address,
    registry_api: CredentialRegistryAPI<M>,
}

impl<M: Middleware + 'static> CredentialRegistry<M> {
    pub fn new(eth_client: Arc<M>, address: Address) -> Self {
        let registry_api = CredentialRegistryAPI::new(address, eth_client);
        Self { address, registry_api }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Reads the credential, `None` if the registry reverts (unknown id)
    pub async fn get_credential(
        &self,
        credential_id: U256,
    ) -> Result<Option<OnChainCredential>, ContractCallError> {
        match self.registry_api.get_credential(credential_id).call().await {
            Ok((issuer, subject, name, description, status)) => Ok(Some(OnChainCredential {
                issuer,
                subject,
                name,
                description,
                status: status.into(),
            })),
            Err(err) => match ContractCallError::from_contract_error(err) {
                ContractCallError::ExecutionReverted(_) => Ok(None),
                err => Err(err),
            },
        }
    }

    /// Holder of the credential token, `None` if it does not exist
    pub async fn owner_of(
        &self,
        credential_id: U256,
    ) -> Result<Option<Address>, ContractCallError> {
        match self.registry_api.owner_of(credential_id).call().await {
            Ok(owner) if owner.is_zero() => Ok(None),
            Ok(owner) => Ok(Some(owner)),
            Err(err) => match ContractCallError::from_contract_error(err) {
                ContractCallError::ExecutionReverted(_) => Ok(None),
                err => Err(err),
            },
        }
    }

    /// Ids of every credential issued to `subject`, oldest first
    pub async fn issued_to(&self, subject: &Address) -> Result<Vec<U256>, ContractCallError> {
        self.registry_api
            .credential_issued_filter()
            .topic3(H256::from(*subject))
            .from_block(BlockNumber::Earliest)
            .query()
            .await
            .map(|events| events.into_iter().map(|event| event.credential_id).collect())
            .map_err(ContractCallError::from_contract_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::{abi::AbiDecode, contract::EthEvent, types::Log};

    #[test]
    fn issue_call_data_carries_draft() {
        let draft = CredentialDraft {
            issuer: Address::repeat_byte(1),
            subject: Address::repeat_byte(0xab),
            title: "Title".into(),
            description: "Description".into(),
            metadata_ref: "ipfs://x".into(),
            credential_type: "DIPLOMA".into(),
            valid_until: 1_900_000_000.into(),
            evidence_hash: H256::repeat_byte(5),
            revocable: false,
        };
        let decoded = IssueCredentialCall::decode(issue_credential_call_data(&draft)).unwrap();
        assert_eq!(decoded.subject, draft.subject);
        assert_eq!(decoded.name, "Title");
        assert_eq!(decoded.evidence_hash, [5u8; 32]);
        assert!(!decoded.revocable);
    }

    #[test]
    fn verify_call_data_encodes_decision() {
        let data =
            verify_credential_call_data(9.into(), VerificationDecision::Rejected, "bad".into());
        let decoded = VerifyCredentialCall::decode(data).unwrap();
        assert_eq!(decoded.credential_id, 9.into());
        assert_eq!(decoded.status, 2);
        assert_eq!(decoded.notes, "bad");
    }

    #[test]
    fn issued_credentials_from_receipt() {
        let log = Log {
            topics: vec![
                CredentialIssuedFilter::signature(),
                H256::from_low_u64_be(17),
                H256::from(Address::repeat_byte(1)),
                H256::from(Address::repeat_byte(0xab)),
            ],
            ..Default::default()
        };
        let receipt = TransactionReceipt { logs: vec![Log::default(), log], ..Default::default() };
        assert_eq!(issued_credentials(&receipt), vec![U256::from(17)]);
    }
}
