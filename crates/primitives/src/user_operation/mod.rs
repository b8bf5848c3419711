//! Account abstraction (ERC-4337) user operation as submitted to the v0.6 entry point

mod hash;

use crate::utils::as_checksum_addr;
use ethers::{
    abi::AbiEncode,
    contract::{EthAbiCodec, EthAbiType},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
pub use hash::UserOperationHash;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// User operation (entry point v0.6 layout)
#[derive(
    Default, Clone, Debug, PartialEq, Eq, EthAbiCodec, EthAbiType, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationSigned {
    /// Smart account that executes the operation
    #[serde(serialize_with = "as_checksum_addr")]
    pub sender: Address,

    /// Entry point nonce of the sender (key 0)
    pub nonce: U256,

    /// Factory address followed by factory call data, empty for deployed accounts
    pub init_code: Bytes,

    /// Call data executed by the sender, `execute(target, value, data)` for the relayer
    pub call_data: Bytes,

    /// Gas allocated to the main execution call
    pub call_gas_limit: U256,

    /// Gas allocated to the verification step
    pub verification_gas_limit: U256,

    /// Gas paid to the bundler for pre-verification execution and calldata
    pub pre_verification_gas: U256,

    /// Maximum fee per gas (EIP-1559)
    pub max_fee_per_gas: U256,

    /// Maximum priority fee per gas (EIP-1559)
    pub max_priority_fee_per_gas: U256,

    /// Paymaster address followed by paymaster specific data (can be empty)
    pub paymaster_and_data: Bytes,

    /// Signature over the user operation hash
    pub signature: Bytes,
}

/// Layout hashed by the entry point: dynamic fields replaced by their keccak digests, no
/// signature
#[derive(EthAbiCodec, EthAbiType)]
struct UserOperationHashInput {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: H256,
    pub call_data: H256,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: H256,
}

impl From<&UserOperationSigned> for UserOperationHashInput {
    fn from(value: &UserOperationSigned) -> Self {
        Self {
            sender: value.sender,
            nonce: value.nonce,
            init_code: keccak256(value.init_code.deref()).into(),
            call_data: keccak256(value.call_data.deref()).into(),
            call_gas_limit: value.call_gas_limit,
            verification_gas_limit: value.verification_gas_limit,
            pre_verification_gas: value.pre_verification_gas,
            max_fee_per_gas: value.max_fee_per_gas,
            max_priority_fee_per_gas: value.max_priority_fee_per_gas,
            paymaster_and_data: keccak256(value.paymaster_and_data.deref()).into(),
        }
    }
}

impl UserOperationSigned {
    /// ABI encodes the full user operation (used for calldata cost estimation)
    pub fn pack(&self) -> Bytes {
        self.clone().encode().into()
    }

    /// ABI encodes the user operation in the layout the entry point hashes
    pub fn pack_for_hash(&self) -> Bytes {
        UserOperationHashInput::from(self).encode().into()
    }

    /// Calculates the hash the entry point's `getUserOpHash` returns for this operation
    ///
    /// `keccak256(abi.encode(keccak256(pack_for_hash), entry_point, chain_id))`
    pub fn hash(&self, entry_point: &Address, chain_id: u64) -> UserOperationHash {
        H256::from_slice(
            keccak256(
                [
                    keccak256(self.pack_for_hash().deref()).to_vec(),
                    entry_point.encode(),
                    U256::from(chain_id).encode(),
                ]
                .concat(),
            )
            .as_slice(),
        )
        .into()
    }

    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn call_data(mut self, call_data: Bytes) -> Self {
        self.call_data = call_data;
        self
    }

    pub fn call_gas_limit(mut self, call_gas_limit: U256) -> Self {
        self.call_gas_limit = call_gas_limit;
        self
    }

    pub fn verification_gas_limit(mut self, verification_gas_limit: U256) -> Self {
        self.verification_gas_limit = verification_gas_limit;
        self
    }

    pub fn pre_verification_gas(mut self, pre_verification_gas: U256) -> Self {
        self.pre_verification_gas = pre_verification_gas;
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee_per_gas: U256) -> Self {
        self.max_fee_per_gas = max_fee_per_gas;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, max_priority_fee_per_gas: U256) -> Self {
        self.max_priority_fee_per_gas = max_priority_fee_per_gas;
        self
    }

    pub fn paymaster_and_data(mut self, paymaster_and_data: Bytes) -> Self {
        self.paymaster_and_data = paymaster_and_data;
        self
    }

    pub fn signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

    // Expected values were produced by `EntryPoint.getUserOpHash` (v0.6) on chain 80001.
    #[test]
    fn hash_matches_entry_point() {
        let ep: Address = ENTRY_POINT.parse().unwrap();

        let empty = UserOperationSigned::default()
            .verification_gas_limit(100_000.into())
            .pre_verification_gas(21_000.into())
            .max_priority_fee_per_gas(1_000_000_000.into());
        assert_eq!(
            empty.hash(&ep, 80_001),
            "0x95418c07086df02ff6bc9e8bdc150b380cb761beecc098630440bcec6e862702"
                .parse::<UserOperationHash>()
                .unwrap()
        );

        let deploying = UserOperationSigned {
            sender: "0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap(),
            nonce: U256::zero(),
            init_code: "0x9406cc6185a346906296840746125a0e449764545fbfb9cf000000000000000000000000ce0fefa6f7979c4c9b5373e0f5105b7259092c6d0000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_data: "0xb61d27f60000000000000000000000009c5754de1443984659e1b3a8d1931d83475ba29c00000000000000000000000000000000000000000000000000005af3107a400000000000000000000000000000000000000000000000000000000000000000600000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_gas_limit: 33_100.into(),
            verification_gas_limit: 361_460.into(),
            pre_verification_gas: 44_980.into(),
            max_fee_per_gas: 1_695_000_030_u64.into(),
            max_priority_fee_per_gas: 1_695_000_000.into(),
            paymaster_and_data: Bytes::default(),
            signature: "0xebfd4657afe1f1c05c1ec65f3f9cc992a3ac083c424454ba61eab93152195e1400d74df01fc9fa53caadcb83a891d478b713016bcc0c64307c1ad3d7ea2e2d921b".parse().unwrap(),
        };
        assert_eq!(
            deploying.hash(&ep, 80_001),
            "0x7c1b8c9df49a9e09ecef0f0fe6841d895850d29820f9a4b494097764085dcd7e"
                .parse::<UserOperationHash>()
                .unwrap()
        );
    }

    #[test]
    fn hash_ignores_signature() {
        let ep: Address = ENTRY_POINT.parse().unwrap();
        let uo = UserOperationSigned::default()
            .sender(Address::repeat_byte(0x11))
            .nonce(7.into())
            .call_gas_limit(50_000.into());
        let signed = uo.clone().signature(Bytes::from(vec![1u8; 65]));

        assert_eq!(uo.hash(&ep, 1), signed.hash(&ep, 1));
        assert_ne!(uo.hash(&ep, 1), uo.hash(&ep, 5));
        assert_ne!(uo.hash(&ep, 1), uo.hash(&Address::repeat_byte(0x22), 1));
    }

    #[test]
    fn pack_for_hash_digests_dynamic_fields() {
        let uo = UserOperationSigned::default();
        let packed = uo.pack_for_hash();

        // ten static words, no offsets
        assert_eq!(packed.len(), 10 * 32);
        // keccak256 of empty bytes
        assert_eq!(
            &packed[64..96],
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
                .parse::<H256>()
                .unwrap()
                .as_bytes()
        );
    }
}
