use crate::{constants::gas::{MULTIPLIER_DENOMINATOR, MULTIPLIER_NUMERATOR}, UserOperationSigned};
use ethers::types::U256;
use std::ops::Deref;

/// Struct to calculate the pre-verification gas of a user operation
// https://github.com/eth-infinitism/bundler/blob/main/packages/sdk/src/calcPreVerificationGas.ts#L44-L51
pub struct Overhead {
    pub fixed: U256,
    pub per_user_op: U256,
    pub per_user_op_word: U256,
    pub zero_byte: U256,
    pub non_zero_byte: U256,
    pub bundle_size: U256,
    pub sig_size: U256,
}

impl Default for Overhead {
    fn default() -> Self {
        Self {
            fixed: U256::from(21000),
            per_user_op: U256::from(18300),
            per_user_op_word: U256::from(4),
            zero_byte: U256::from(4),
            non_zero_byte: U256::from(16),
            bundle_size: U256::from(1),
            sig_size: U256::from(65),
        }
    }
}

impl Overhead {
    /// Calculates the pre-verification gas of a [UserOperation](UserOperationSigned)
    ///
    /// An unsigned operation is costed as if it carried a `sig_size` signature of non-zero bytes,
    /// so the value stays valid once the relayer signs it.
    pub fn calculate_pre_verification_gas(&self, uo: &UserOperationSigned) -> U256 {
        let uo_pack = if uo.signature.is_empty() {
            uo.clone().signature(vec![1u8; self.sig_size.as_usize()].into()).pack()
        } else {
            uo.pack()
        };

        let call_data = uo_pack.deref().iter().fold(U256::zero(), |acc, &x| {
            let byte_cost = if x == 0 { &self.zero_byte } else { &self.non_zero_byte };
            acc.saturating_add(*byte_cost)
        });

        let word_cost = div_ceil(
            self.per_user_op_word.saturating_mul(U256::from(uo_pack.len() + 31)),
            U256::from(32),
        );

        div_ceil(self.fixed, self.bundle_size)
            .saturating_add(call_data)
            .saturating_add(self.per_user_op)
            .saturating_add(word_cost)
    }
}

/// Applies the relayer's safety multiplier (x1.2, rounded up) to a gas estimate
///
/// Saturates at `U256::MAX`.
pub fn apply_gas_multiplier(gas: U256) -> U256 {
    let numerator = U256::from(MULTIPLIER_NUMERATOR);
    let denominator = U256::from(MULTIPLIER_DENOMINATOR);
    (gas / denominator)
        .saturating_mul(numerator)
        .saturating_add(div_ceil((gas % denominator) * numerator, denominator))
}

/// Performs division and rounds up to the nearest integer; division by zero yields zero
pub fn div_ceil(numerator: U256, denominator: U256) -> U256 {
    let rounding_const =
        U256::from(if numerator.checked_rem(denominator).unwrap_or_default() > U256::zero() {
            1
        } else {
            0
        });
    numerator.checked_div(denominator).unwrap_or_default().saturating_add(rounding_const)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, Bytes};

    #[test]
    fn pre_verification_gas_calculation() {
        let gas_oh = Overhead::default();
        let uo = UserOperationSigned {
            sender: "0xAB7e2cbFcFb6A5F33A75aD745C3E5fB48d689B54".parse().unwrap(),
            nonce: U256::zero(),
            init_code: Bytes::default(),
            call_data: "0xb61d27f6000000000000000000000000ab7e2cbfcfb6a5f33a75ad745c3e5fb48d689b54000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000600000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_gas_limit: 22_016.into(),
            verification_gas_limit: 413_910.into(),
            pre_verification_gas: 48_480.into(),
            max_fee_per_gas: 2_000_000_000_u64.into(),
            max_priority_fee_per_gas: 1_000_000_000.into(),
            paymaster_and_data: Bytes::default(),
            signature: "0xeb99f2f72c16b3eb5bdeadb243dd38a6e54771f1dd9b3d1d08e99e3e0840717331e6c8e8457c6c98e7bba5ce8c3f9c8e1df41218a5b8d6cc0f71fe9a33e2bbda1b".parse().unwrap(),
        };

        // 11 head words, then length words for the 4 dynamic fields and their padded contents
        assert_eq!(uo.pack().len(), 736);

        let zero = uo.pack().iter().filter(|b| **b == 0).count() as u64;
        let non_zero = 736 - zero;
        let expected =
            21_000 + zero * 4 + non_zero * 16 + 18_300 + (4u64 * (736 + 31)).div_ceil(32);
        assert_eq!(gas_oh.calculate_pre_verification_gas(&uo), expected.into());
    }

    #[test]
    fn pre_verification_gas_counts_missing_signature() {
        let gas_oh = Overhead::default();
        let uo = UserOperationSigned::default().sender(Address::repeat_byte(0x42));
        let signed = uo.clone().signature(vec![1u8; 65].into());

        assert_eq!(
            gas_oh.calculate_pre_verification_gas(&uo),
            gas_oh.calculate_pre_verification_gas(&signed)
        );
    }

    #[test]
    fn pre_verification_gas_saturates() {
        let gas_oh = Overhead::default();
        let uo = UserOperationSigned {
            nonce: U256::max_value(),
            init_code: Bytes::from(vec![255; 1024]),
            call_data: Bytes::from(vec![255; 1024]),
            call_gas_limit: U256::max_value(),
            paymaster_and_data: Bytes::from(vec![255; 1024]),
            signature: Bytes::from(vec![255; 1024]),
            ..Default::default()
        };
        assert!(gas_oh.calculate_pre_verification_gas(&uo) > U256::from(21_000));
    }

    #[test]
    fn gas_multiplier_rounds_up() {
        assert_eq!(apply_gas_multiplier(100_000.into()), 120_000.into());
        assert_eq!(apply_gas_multiplier(7.into()), 9.into());
        assert_eq!(apply_gas_multiplier(U256::max_value()), U256::max_value());
        assert_eq!(apply_gas_multiplier(U256::max_value() / 2), U256::max_value());

        let large = U256::from(u128::MAX) * 10;
        assert_eq!(apply_gas_multiplier(large), U256::from(u128::MAX) * 12);
    }

    #[test]
    fn div_ceil_calculation() {
        assert_eq!(div_ceil(U256::from(10), U256::from(2)), 5.into());
        assert_eq!(div_ceil(U256::from(10), U256::from(3)), 4.into());
        assert_eq!(div_ceil(U256::from(10), U256::zero()), 0.into());
    }
}
