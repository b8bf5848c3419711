use crate::chain::{ChainClient, ChainError};
use credence_contracts::execute_call_data;
use credence_primitives::{
    apply_gas_multiplier,
    constants::gas::{FALLBACK_CALL_GAS, VERIFICATION_GAS},
    Overhead, UserOperationHash, UserOperationSigned,
};
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds unsigned user operations executing a call through the sender's smart account
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    chain: Arc<dyn ChainClient>,
    entry_point: Address,
    paymaster: Option<Address>,
}

impl OperationBuilder {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        entry_point: Address,
        paymaster: Option<Address>,
    ) -> Self {
        Self { chain, entry_point, paymaster }
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Builds the user operation making `sender` call `target` with `value` and `call_data`
    ///
    /// The sender is expected to be a provisioned smart account. The nonce is read from the entry
    /// point on every call.
    pub async fn build(
        &self,
        sender: Address,
        target: Address,
        value: U256,
        call_data: Bytes,
    ) -> Result<UserOperationSigned, ChainError> {
        let nonce = self.chain.get_nonce(&sender).await?;
        let call_data = execute_call_data(target, value, call_data);
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.chain.estimate_fees().await?;

        let call_gas_limit = match self.chain.estimate_call_gas(&sender, &call_data).await {
            Ok(gas) => apply_gas_multiplier(gas),
            Err(err) => {
                warn!(?sender, "Call gas estimation failed, using fallback: {err}");
                U256::from(FALLBACK_CALL_GAS)
            }
        };

        let paymaster_and_data = self
            .paymaster
            .map(|paymaster| Bytes::from(paymaster.as_bytes().to_vec()))
            .unwrap_or_default();

        let uo = UserOperationSigned::default()
            .sender(sender)
            .nonce(nonce)
            .call_data(call_data)
            .call_gas_limit(call_gas_limit)
            .verification_gas_limit(VERIFICATION_GAS.into())
            .max_fee_per_gas(max_fee_per_gas)
            .max_priority_fee_per_gas(max_priority_fee_per_gas)
            .paymaster_and_data(paymaster_and_data);

        let pre_verification_gas = Overhead::default().calculate_pre_verification_gas(&uo);
        let uo = uo.pre_verification_gas(pre_verification_gas);

        debug!(?sender, %nonce, %call_gas_limit, %pre_verification_gas, "Built user operation");

        Ok(uo)
    }

    /// Hash of the user operation on the connected chain
    pub async fn hash(&self, uo: &UserOperationSigned) -> Result<UserOperationHash, ChainError> {
        let chain_id = self.chain.chain_id().await?;
        Ok(uo.hash(&self.entry_point, chain_id))
    }
}
