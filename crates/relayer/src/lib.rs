//! Credence relayer
//!
//! Queues application intents (smart account creation, credential issuance, verification and
//! revocation), relays them as ERC-4337 user operations signed by a single relayer key, and keeps
//! the off-chain records consistent with what eventually lands on chain.

pub mod auth;
mod builder;
mod chain;
pub mod config;
mod credential;
mod error;
mod ethereum;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod queue;
mod reconcile;
mod scheduler;
mod service;
mod signer;
mod wallet;

pub use builder::OperationBuilder;
pub use chain::{ChainClient, ChainError, ChainReceipt};
pub use credential::CredentialLifecycle;
pub use error::{ConfigError, CredentialError, RelayerError, SigningError};
pub use ethereum::{ContractAddresses, EthersChainClient};
pub use queue::{QueueRequest, TransactionQueue};
pub use reconcile::{classify_failure, is_ambiguous_failure, Expectation, FailureKind, Reconciler};
pub use scheduler::{RelayerEvent, RelayerScheduler, SchedulerConfig, TickOutcome};
pub use service::{
    CredenceService, CredentialResponse, QueueResponse, RelayerSetup, TransactionStatusResponse,
    WalletResponse,
};
pub use signer::RelayerSigner;
pub use wallet::{DeploymentStatus, WalletProvisioner};
