use crate::gen::FailedOp;
use ethers::{
    abi::AbiDecode,
    contract::ContractError,
    providers::{JsonRpcError, Middleware, MiddlewareError, ProviderError},
    types::Bytes,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref HEX_DATA: Regex = Regex::new(r"0x[0-9a-fA-F]+").expect("Regex rules valid");
}

/// Errors returned by contract calls
///
/// Node-reported messages are kept verbatim so callers can classify them (e.g. `already known`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractCallError {
    /// The entry point rejected a user operation
    #[error("FailedOp({}, {})", .0.op_index, .0.reason)]
    FailedOp(FailedOp),

    /// Call reverted
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    /// Provider or node error
    #[error("{inner}")]
    Provider {
        /// The message returned by the node
        inner: String,
    },

    /// ABI encoding or decoding error
    #[error("abi error: {inner}")]
    Abi {
        /// The inner error message
        inner: String,
    },

    /// Any other error
    #[error("other error: {inner}")]
    Other {
        /// The inner error message
        inner: String,
    },
}

impl ContractCallError {
    pub fn from_contract_error<M: Middleware>(err: ContractError<M>) -> Self {
        match err {
            ContractError::DecodingError(e) => Self::Abi { inner: e.to_string() },
            ContractError::AbiError(e) => Self::Abi { inner: e.to_string() },
            ContractError::MiddlewareError { e } => Self::from_middleware_error::<M>(e),
            ContractError::ProviderError { e } => Self::from_provider_error(&e),
            ContractError::Revert(data) => Self::from_revert_data(data),
            _ => Self::Other { inner: err.to_string() },
        }
    }

    pub fn from_middleware_error<M: Middleware>(err: M::Error) -> Self {
        if let Some(err) = err.as_error_response() {
            return Self::from_json_rpc_error(err);
        }

        if let Some(err) = err.as_provider_error() {
            return Self::from_provider_error(err);
        }

        Self::Provider { inner: err.to_string() }
    }

    pub fn from_provider_error(err: &ProviderError) -> Self {
        match err {
            ProviderError::JsonRpcClientError(inner) => inner
                .as_error_response()
                .map(Self::from_json_rpc_error)
                .unwrap_or_else(|| Self::Provider { inner: inner.to_string() }),
            _ => Self::Provider { inner: err.to_string() },
        }
    }

    /// Decodes the revert payload carried in the `data` field, or keeps the node message
    pub fn from_json_rpc_error(err: &JsonRpcError) -> Self {
        if let Some(serde_json::Value::String(data)) = &err.data {
            if let Some(bytes) =
                HEX_DATA.find(data).and_then(|hex| Bytes::from_str(hex.as_str()).ok())
            {
                return Self::from_revert_data(bytes);
            }
        }

        Self::Provider { inner: err.message.clone() }
    }

    pub fn from_revert_data(data: Bytes) -> Self {
        decode_revert_error(data.clone())
            .unwrap_or_else(|| Self::ExecutionReverted(format!("{data}")))
    }
}

// ethers-rs could not handle `require (true, "reason")` or `revert("test failed")` well in this
// case revert with `require` error would ends up with error event signature `0x08c379a0`
// we need to handle it manually
pub fn decode_revert_string(data: Bytes) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (error_sig, reason) = data.split_at(4);
    if error_sig == [0x08, 0xc3, 0x79, 0xa0] {
        <String as AbiDecode>::decode(reason).ok()
    } else {
        None
    }
}

fn decode_revert_error(data: Bytes) -> Option<ContractCallError> {
    if let Ok(op) = <FailedOp as AbiDecode>::decode(data.as_ref()) {
        return Some(ContractCallError::FailedOp(op));
    }
    decode_revert_string(data).map(ContractCallError::ExecutionReverted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_failed_op() -> eyre::Result<()> {
        let data = Bytes::from_str("0x220266b600000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000001e41413430206f76657220766572696669636174696f6e4761734c696d69740000")?;
        let err = ContractCallError::from_revert_data(data);
        assert_eq!(err.to_string(), "FailedOp(0, AA40 over verificationGasLimit)");
        Ok(())
    }

    #[test]
    fn decodes_require_string() -> eyre::Result<()> {
        let data = Bytes::from_str("0x08c379a00000000000000000000000000000000000000000000000000000000000000020000000000000000000000000000000000000000000000000000000000000001841413934206761732076616c756573206f766572666c6f770000000000000000")?;
        assert_eq!(decode_revert_string(data.clone()).as_deref(), Some("AA94 gas values overflow"));
        assert_eq!(
            ContractCallError::from_revert_data(data),
            ContractCallError::ExecutionReverted("AA94 gas values overflow".into())
        );
        Ok(())
    }

    #[test]
    fn keeps_node_message() {
        let err = JsonRpcError { code: -32000, message: "already known".into(), data: None };
        assert_eq!(ContractCallError::from_json_rpc_error(&err).to_string(), "already known");

        let err = JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: Some(serde_json::Value::String("0x1234".into())),
        };
        assert_eq!(
            ContractCallError::from_json_rpc_error(&err),
            ContractCallError::ExecutionReverted("0x1234".into())
        );
    }

    #[test]
    fn short_revert_data() {
        assert_eq!(decode_revert_string(Bytes::from(vec![0x08])), None);
        assert_eq!(
            ContractCallError::from_revert_data(Bytes::from(vec![0x01, 0x02])).to_string(),
            "execution reverted: 0x0102"
        );
    }
}
