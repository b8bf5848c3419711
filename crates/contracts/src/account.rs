//! Smart account and factory bindings

pub use super::gen::{
    simple_account_api::ExecuteCall, simple_account_factory_api::CreateAccountCall,
    SimpleAccountAPI, SimpleAccountFactoryAPI,
};
use crate::error::ContractCallError;
use ethers::{
    abi::AbiEncode,
    providers::Middleware,
    types::{Address, Bytes, U256},
};
use std::sync::Arc;

/// Call data making the account invoke `target` with `value` and `data`
pub fn execute_call_data(target: Address, value: U256, data: Bytes) -> Bytes {
    ExecuteCall { dest: target, value, func: data }.encode().into()
}

/// Call data deploying the account for `(owner, salt)` through the factory
pub fn create_account_call_data(owner: Address, salt: U256) -> Bytes {
    CreateAccountCall { owner, salt }.encode().into()
}

#[derive(Clone)]
pub struct AccountFactory<M: Middleware + 'static> {
    eth_client: Arc<M>,
    address: Address,
    factory_api: SimpleAccountFactoryAPI<M>,
}

impl<M: Middleware + 'static> AccountFactory<M> {
    pub fn new(eth_client: Arc<M>, address: Address) -> Self {
        let factory_api = SimpleAccountFactoryAPI::new(address, eth_client.clone());
        Self { eth_client, address, factory_api }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Counterfactual address of the account for `(owner, salt)`
    pub async fn get_address(
        &self,
        owner: &Address,
        salt: U256,
    ) -> Result<Address, ContractCallError> {
        self.factory_api
            .get_address(*owner, salt)
            .call()
            .await
            .map_err(ContractCallError::from_contract_error)
    }

    /// Whether code has been deployed at the address
    pub async fn is_deployed(&self, address: &Address) -> Result<bool, ContractCallError> {
        self.eth_client
            .get_code(*address, None)
            .await
            .map(|code| !code.is_empty())
            .map_err(ContractCallError::from_middleware_error::<M>)
    }
}
