use ethers::{
    contract::{abigen, EthCall},
    types::Selector,
};
use lazy_static::lazy_static;
use std::collections::HashMap;

abigen!(
    EntryPointAPI,
    r#"[
        struct UserOperation {address sender;uint256 nonce;bytes initCode;bytes callData;uint256 callGasLimit;uint256 verificationGasLimit;uint256 preVerificationGas;uint256 maxFeePerGas;uint256 maxPriorityFeePerGas;bytes paymasterAndData;bytes signature;}
        function handleOps(UserOperation[] calldata ops, address payable beneficiary) external
        function getUserOpHash(UserOperation calldata userOp) external view returns (bytes32)
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
        function balanceOf(address account) external view returns (uint256)
        error FailedOp(uint256 opIndex, string reason)
        event UserOperationEvent(bytes32 indexed userOpHash, address indexed sender, address indexed paymaster, uint256 nonce, bool success, uint256 actualGasCost, uint256 actualGasUsed)
        event UserOperationRevertReason(bytes32 indexed userOpHash, address indexed sender, uint256 nonce, bytes revertReason)
    ]"#
);

abigen!(
    SimpleAccountAPI,
    r#"[
        function execute(address dest, uint256 value, bytes calldata func) external
        function executeBatch(address[] calldata dest, bytes[] calldata func) external
        function owner() external view returns (address)
    ]"#
);

abigen!(
    SimpleAccountFactoryAPI,
    r#"[
        function createAccount(address owner, uint256 salt) external returns (address ret)
        function getAddress(address owner, uint256 salt) external view returns (address)
    ]"#
);

abigen!(
    CredentialRegistryAPI,
    r#"[
        function issueCredential(address subject, string name, string description, string metadataRef, string credentialType, uint256 validUntil, bytes32 evidenceHash, bool revocable) external returns (uint256)
        function verifyCredential(uint256 credentialId, uint8 status, string notes) external
        function revokeCredential(uint256 credentialId, string reason) external returns (bool)
        function getCredential(uint256 credentialId) external view returns (address issuer, address subject, string name, string description, uint8 status)
        function ownerOf(uint256 tokenId) external view returns (address)
        event CredentialIssued(uint256 indexed credentialId, address indexed issuer, address indexed subject)
    ]"#
);

lazy_static! {
    pub static ref SELECTORS_NAMES: HashMap<Selector, String> = {
        let mut map = HashMap::new();
        // entry point
        map.insert(entry_point_api::HandleOpsCall::selector(), entry_point_api::HandleOpsCall::function_name().into());
        // account
        map.insert(simple_account_api::ExecuteCall::selector(), simple_account_api::ExecuteCall::function_name().into());
        map.insert(simple_account_api::ExecuteBatchCall::selector(), simple_account_api::ExecuteBatchCall::function_name().into());
        // factory
        map.insert(simple_account_factory_api::CreateAccountCall::selector(), simple_account_factory_api::CreateAccountCall::function_name().into());
        // credential registry
        map.insert(credential_registry_api::IssueCredentialCall::selector(), credential_registry_api::IssueCredentialCall::function_name().into());
        map.insert(credential_registry_api::VerifyCredentialCall::selector(), credential_registry_api::VerifyCredentialCall::function_name().into());
        map.insert(credential_registry_api::RevokeCredentialCall::selector(), credential_registry_api::RevokeCredentialCall::function_name().into());

        map
    };
}

/// Name of the function the call data invokes, if it is one the relayer knows about
pub fn function_name(call_data: &[u8]) -> Option<&'static str> {
    if call_data.len() < 4 {
        return None;
    }
    let mut selector = Selector::default();
    selector.copy_from_slice(&call_data[..4]);
    SELECTORS_NAMES.get(&selector).map(String::as_str)
}
