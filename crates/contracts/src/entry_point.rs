pub use super::gen::{EntryPointAPI, EntryPointAPIEvents, UserOperationEventFilter};
use crate::{error::ContractCallError, gen::entry_point_api};
use credence_primitives::{UserOperationHash, UserOperationSigned};
use ethers::{
    contract::parse_log,
    providers::Middleware,
    types::{transaction::eip2718::TypedTransaction, Address, TransactionReceipt, U256},
};
use std::sync::Arc;

impl From<UserOperationSigned> for entry_point_api::UserOperation {
    fn from(uo: UserOperationSigned) -> Self {
        Self {
            sender: uo.sender,
            nonce: uo.nonce,
            init_code: uo.init_code,
            call_data: uo.call_data,
            call_gas_limit: uo.call_gas_limit,
            verification_gas_limit: uo.verification_gas_limit,
            pre_verification_gas: uo.pre_verification_gas,
            max_fee_per_gas: uo.max_fee_per_gas,
            max_priority_fee_per_gas: uo.max_priority_fee_per_gas,
            paymaster_and_data: uo.paymaster_and_data,
            signature: uo.signature,
        }
    }
}

#[derive(Clone)]
pub struct EntryPoint<M: Middleware + 'static> {
    address: Address,
    entry_point_api: EntryPointAPI<M>,
}

impl<M: Middleware + 'static> EntryPoint<M> {
    pub fn new(eth_client: Arc<M>, address: Address) -> Self {
        let entry_point_api = EntryPointAPI::new(address, eth_client);
        Self { address, entry_point_api }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn get_nonce(&self, sender: &Address, key: U256) -> Result<U256, ContractCallError> {
        self.entry_point_api
            .get_nonce(*sender, key)
            .call()
            .await
            .map_err(ContractCallError::from_contract_error)
    }

    /// Transaction calling `handleOps` (not sent)
    pub fn handle_ops_tx<U: Into<entry_point_api::UserOperation>>(
        &self,
        uos: Vec<U>,
        beneficiary: Address,
    ) -> TypedTransaction {
        self.entry_point_api.handle_ops(uos.into_iter().map(|u| u.into()).collect(), beneficiary).tx
    }
}

/// Extracts the outcome of every user operation included in the receipt
pub fn user_operation_outcomes(receipt: &TransactionReceipt) -> Vec<(UserOperationHash, bool)> {
    receipt
        .logs
        .iter()
        .filter_map(|log| parse_log::<UserOperationEventFilter>(log.clone()).ok())
        .map(|event| (UserOperationHash::from(event.user_op_hash), event.success))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::{
        abi::{self, Token},
        contract::EthEvent,
        types::{Log, H256},
    };

    fn user_operation_log(hash: H256, success: bool) -> Log {
        Log {
            topics: vec![
                UserOperationEventFilter::signature(),
                hash,
                H256::from(Address::repeat_byte(0x11)),
                H256::zero(),
            ],
            data: abi::encode(&[
                Token::Uint(U256::zero()),
                Token::Bool(success),
                Token::Uint(U256::from(1_000)),
                Token::Uint(U256::from(50_000)),
            ])
            .into(),
            ..Default::default()
        }
    }

    #[test]
    fn user_operation_outcomes_from_receipt() {
        let receipt = TransactionReceipt {
            logs: vec![
                user_operation_log(H256::repeat_byte(1), true),
                Log::default(),
                user_operation_log(H256::repeat_byte(2), false),
            ],
            ..Default::default()
        };

        assert_eq!(
            user_operation_outcomes(&receipt),
            vec![
                (UserOperationHash::from(H256::repeat_byte(1)), true),
                (UserOperationHash::from(H256::repeat_byte(2)), false),
            ]
        );
    }

    #[test]
    fn user_operation_conversion() {
        let uo = UserOperationSigned::default()
            .sender(Address::repeat_byte(3))
            .nonce(5.into())
            .call_gas_limit(70_000.into());
        let converted: entry_point_api::UserOperation = uo.clone().into();
        assert_eq!(converted.sender, uo.sender);
        assert_eq!(converted.nonce, uo.nonce);
        assert_eq!(converted.call_gas_limit, uo.call_gas_limit);
    }
}
