//! Relayer configuration and its validation

use crate::{error::ConfigError, ethereum::ContractAddresses, scheduler::SchedulerConfig};
use credence_primitives::constants::{
    credential::{ISSUANCE_POLL_INTERVAL, ISSUANCE_POLL_RETRIES},
    entry_point,
    relayer::{
        BATCH_SIZE, MAX_AGE, RECEIPT_POLL_INTERVAL, RECEIPT_POLL_RETRIES, RELAY_INTERVAL,
        RPC_TIMEOUT,
    },
};
use ethers::types::Address;
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

/// Where the relayer key comes from
#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Hex encoded private key
    PrivateKey(String),
    /// File holding a mnemonic phrase
    MnemonicFile(PathBuf),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::PrivateKey(_) => f.write_str("PrivateKey(..)"),
            KeySource::MnemonicFile(path) => {
                f.debug_tuple("MnemonicFile").field(&path.display()).finish()
            }
        }
    }
}

/// Relayer configuration
///
/// Anything the relayer needs to send transactions is optional here, so that a misconfigured
/// node still serves reads. [validate](RelayerConfig::validate) tells whether transactions can be
/// processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerConfig {
    /// Ethereum execution client RPC address
    pub eth_client_address: Option<String>,
    pub entry_point: Address,
    pub account_factory: Option<Address>,
    pub credential_registry: Option<Address>,
    pub paymaster: Option<Address>,
    /// Receives the `handleOps` refunds, the relayer itself if not set
    pub beneficiary: Option<Address>,
    pub key: Option<KeySource>,
    pub relay_interval: Duration,
    pub batch_size: usize,
    pub max_age: Duration,
    pub rpc_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub receipt_poll_retries: usize,
    pub issuance_poll_retries: usize,
    pub issuance_poll_interval: Duration,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            eth_client_address: None,
            entry_point: Address::from_str(entry_point::ADDRESS).unwrap_or_default(),
            account_factory: None,
            credential_registry: None,
            paymaster: None,
            beneficiary: None,
            key: None,
            relay_interval: Duration::from_secs(RELAY_INTERVAL),
            batch_size: BATCH_SIZE,
            max_age: Duration::from_secs(MAX_AGE),
            rpc_timeout: Duration::from_secs(RPC_TIMEOUT),
            receipt_poll_interval: Duration::from_millis(RECEIPT_POLL_INTERVAL),
            receipt_poll_retries: RECEIPT_POLL_RETRIES,
            issuance_poll_retries: ISSUANCE_POLL_RETRIES,
            issuance_poll_interval: Duration::from_secs(ISSUANCE_POLL_INTERVAL),
        }
    }
}

/// Configuration the relayer can send transactions with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub eth_client_address: String,
    pub contracts: ContractAddresses,
    pub key: KeySource,
}

fn required(address: Option<Address>, name: &'static str) -> Result<Address, ConfigError> {
    match address {
        Some(address) if !address.is_zero() => Ok(address),
        _ => Err(ConfigError::MissingContract(name)),
    }
}

const URL_SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

impl RelayerConfig {
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let eth_client_address = match self.eth_client_address.as_deref().map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingRpcUrl),
            Some(url) if !URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) => {
                return Err(ConfigError::Invalid {
                    name: "eth client address",
                    reason: format!("unsupported scheme in {url}"),
                })
            }
            Some(url) => url.to_string(),
        };

        let contracts = ContractAddresses {
            entry_point: required(Some(self.entry_point), "entry point")?,
            account_factory: required(self.account_factory, "account factory")?,
            credential_registry: required(self.credential_registry, "credential registry")?,
        };

        let key = match &self.key {
            None => return Err(ConfigError::MissingRelayerKey),
            Some(KeySource::PrivateKey(key)) if key.trim().is_empty() => {
                return Err(ConfigError::MissingRelayerKey)
            }
            Some(key) => key.clone(),
        };

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "batch size",
                reason: "must be positive".into(),
            });
        }
        if self.relay_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "relay interval",
                reason: "must be positive".into(),
            });
        }

        Ok(ValidatedConfig { eth_client_address, contracts, key })
    }

    /// Scheduler settings, refunds going to `relayer` unless a beneficiary is configured
    pub fn scheduler_config(&self, relayer: Address) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.relay_interval,
            batch_size: self.batch_size,
            max_age: self.max_age,
            beneficiary: self.beneficiary.unwrap_or(relayer),
            receipt_poll_interval: self.receipt_poll_interval,
            receipt_poll_retries: self.receipt_poll_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayerConfig {
        RelayerConfig {
            eth_client_address: Some("http://127.0.0.1:8545".into()),
            account_factory: Some(Address::repeat_byte(1)),
            credential_registry: Some(Address::repeat_byte(2)),
            key: Some(KeySource::PrivateKey("0xdeadbeefcafe".into())),
            ..Default::default()
        }
    }

    #[test]
    fn valid_config() {
        let validated = valid().validate().unwrap();
        assert_eq!(validated.eth_client_address, "http://127.0.0.1:8545");
        assert_eq!(validated.contracts.account_factory, Address::repeat_byte(1));
        assert_eq!(
            validated.contracts.entry_point,
            entry_point::ADDRESS.parse::<Address>().unwrap()
        );
    }

    #[test]
    fn missing_settings() {
        let config = RelayerConfig { eth_client_address: None, ..valid() };
        assert_eq!(config.validate(), Err(ConfigError::MissingRpcUrl));

        let config = RelayerConfig { eth_client_address: Some("localhost:8545".into()), ..valid() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let config = RelayerConfig { credential_registry: None, ..valid() };
        assert_eq!(config.validate(), Err(ConfigError::MissingContract("credential registry")));

        let config = RelayerConfig { account_factory: Some(Address::zero()), ..valid() };
        assert_eq!(config.validate(), Err(ConfigError::MissingContract("account factory")));

        let config = RelayerConfig { key: None, ..valid() };
        assert_eq!(config.validate(), Err(ConfigError::MissingRelayerKey));

        let config = RelayerConfig { batch_size: 0, ..valid() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { name: "batch size", .. })));
    }

    #[test]
    fn key_is_not_printed() {
        let config = valid();
        assert!(!format!("{config:?}").contains("deadbeef"));
    }

    #[test]
    fn beneficiary_defaults_to_relayer() {
        let relayer = Address::repeat_byte(9);
        assert_eq!(valid().scheduler_config(relayer).beneficiary, relayer);

        let config = RelayerConfig { beneficiary: Some(Address::repeat_byte(3)), ..valid() };
        assert_eq!(config.scheduler_config(relayer).beneficiary, Address::repeat_byte(3));
    }
}
