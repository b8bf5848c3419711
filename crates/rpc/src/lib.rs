//! JSON-RPC boundary of the relayer: `relayer_*` and `credential_*` namespaces

mod credential;
mod credential_api;
pub mod error;
mod relayer;
mod relayer_api;
mod rpc;

pub use credential::CredentialApiServerImpl;
pub use credential_api::{CredentialApiClient, CredentialApiServer};
pub use relayer::RelayerApiServerImpl;
pub use relayer_api::{RelayerApiClient, RelayerApiServer};
pub use rpc::JsonRpcServer;
