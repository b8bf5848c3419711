use credence_primitives::constants::rpc_error_codes::{
    CONFIG, CONFLICT, INTERNAL, NOT_FOUND, UNAUTHORIZED, UNKNOWN_ACCOUNT,
};
use credence_relayer::{CredentialError, RelayerError};
use jsonrpsee::types::{ErrorObject, ErrorObjectOwned};
use serde_json::json;

/// A wrapper for the [ErrorObjectOwned](ErrorObjectOwned) type.
#[derive(Debug)]
pub struct JsonRpcError(pub ErrorObjectOwned);

impl From<JsonRpcError> for ErrorObjectOwned {
    fn from(err: JsonRpcError) -> Self {
        err.0
    }
}

impl From<RelayerError> for JsonRpcError {
    fn from(err: RelayerError) -> Self {
        let message = err.to_string();
        JsonRpcError(match err {
            RelayerError::Config(_) => ErrorObject::owned(CONFIG, message, None::<bool>),
            RelayerError::UnknownAccount(owner) | RelayerError::WalletNotFound(owner) => {
                ErrorObject::owned(UNKNOWN_ACCOUNT, message, Some(json!({ "owner": owner })))
            }
            RelayerError::NotFound(id) => {
                ErrorObject::owned(NOT_FOUND, message, Some(json!({ "transactionId": id })))
            }
            RelayerError::ProvisioningExhausted(_) => {
                ErrorObject::owned(CONFLICT, message, None::<bool>)
            }
            RelayerError::MissingSender(_) |
            RelayerError::Chain(_) |
            RelayerError::Signing(_) |
            RelayerError::Storage(_) => ErrorObject::owned(INTERNAL, message, None::<bool>),
        })
    }
}

impl From<CredentialError> for JsonRpcError {
    fn from(err: CredentialError) -> Self {
        if err.is_conflict() {
            return JsonRpcError(ErrorObject::owned(CONFLICT, err.to_string(), None::<bool>));
        }

        let message = err.to_string();
        JsonRpcError(match err {
            CredentialError::Unauthorized { caller, id } => ErrorObject::owned(
                UNAUTHORIZED,
                message,
                Some(json!({ "caller": caller, "credentialId": id })),
            ),
            CredentialError::NotFound(id) => {
                ErrorObject::owned(NOT_FOUND, message, Some(json!({ "credentialId": id })))
            }
            CredentialError::Relayer(err) => return err.into(),
            _ => ErrorObject::owned(CONFLICT, message, None::<bool>),
        })
    }
}
