use crate::utils::{parse_address, validate_private_key};
use clap::Parser;
use credence_primitives::constants::{
    entry_point,
    relayer::{BATCH_SIZE, MAX_AGE, RELAY_INTERVAL, RPC_TIMEOUT},
    rpc::HTTP_PORT,
};
use credence_relayer::{
    auth::StaticDirectory,
    config::{KeySource, RelayerConfig},
};
use ethers::types::Address;
use expanded_pathbuf::ExpandedPathBuf;
use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

/// Relayer CLI args
#[derive(Debug, Clone, Parser)]
pub struct RelayerArgs {
    /// Ethereum execution client RPC endpoint.
    ///
    /// Without it the node only serves reads.
    #[clap(long)]
    pub eth_client_address: Option<String>,

    /// Entry point address.
    #[clap(long, default_value = entry_point::ADDRESS, value_parser = parse_address)]
    pub entry_point: Address,

    /// Smart account factory address.
    #[clap(long, value_parser = parse_address)]
    pub account_factory: Option<Address>,

    /// Credential registry address.
    #[clap(long, value_parser = parse_address)]
    pub credential_registry: Option<Address>,

    /// Paymaster sponsoring the relayed user operations.
    #[clap(long, value_parser = parse_address)]
    pub paymaster: Option<Address>,

    /// Receiver of the `handleOps` refunds, the relayer address by default.
    #[clap(long, value_parser = parse_address)]
    pub beneficiary: Option<Address>,

    /// Path to the mnemonic file of the relayer key.
    #[clap(long)]
    pub mnemonic_file: Option<ExpandedPathBuf>,

    /// Hex encoded relayer private key, takes precedence over the mnemonic file.
    #[clap(long, env = "CREDENCE_RELAYER_KEY", hide_env_values = true, value_parser = validate_private_key)]
    pub relayer_key: Option<String>,

    /// Interval between two relayer ticks in seconds.
    #[clap(long, default_value_t = RELAY_INTERVAL)]
    pub relay_interval: u64,

    /// Maximum number of transactions processed in one tick.
    #[clap(long, default_value_t = BATCH_SIZE)]
    pub batch_size: usize,

    /// Pending transactions older than this many seconds are no longer picked up.
    #[clap(long, default_value_t = MAX_AGE)]
    pub max_age: u64,

    /// Timeout of every execution client call in seconds.
    #[clap(long, default_value_t = RPC_TIMEOUT)]
    pub rpc_timeout: u64,
}

impl RelayerArgs {
    pub fn to_config(&self) -> RelayerConfig {
        let key = match (&self.relayer_key, &self.mnemonic_file) {
            (Some(key), _) => Some(KeySource::PrivateKey(key.clone())),
            (None, Some(path)) => Some(KeySource::MnemonicFile(path.to_path_buf())),
            (None, None) => None,
        };

        RelayerConfig {
            eth_client_address: self.eth_client_address.clone(),
            entry_point: self.entry_point,
            account_factory: self.account_factory,
            credential_registry: self.credential_registry,
            paymaster: self.paymaster,
            beneficiary: self.beneficiary,
            key,
            relay_interval: Duration::from_secs(self.relay_interval),
            batch_size: self.batch_size,
            max_age: Duration::from_secs(self.max_age),
            rpc_timeout: Duration::from_secs(self.rpc_timeout),
            ..Default::default()
        }
    }
}

/// Storage CLI args
#[derive(Debug, Clone, Parser)]
pub struct StorageArgs {
    /// Data directory (primarily for database).
    #[clap(long)]
    pub datadir: Option<ExpandedPathBuf>,

    /// If true, the node will use an in-memory database.
    /// `datadir` config would be ignored.
    #[clap(long)]
    pub use_memory: bool,
}

/// RPC CLI args
#[derive(Debug, Clone, Parser, PartialEq)]
pub struct RpcArgs {
    /// Sets the HTTP RPC address to listen on.
    ///
    /// By default, this option is set to `127.0.0.1`
    #[clap(long = "http.addr", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub http_addr: IpAddr,

    /// Sets the HTTP RPC port to listen on.
    ///
    /// By default, this option is set to `3000`
    #[clap(long = "http.port", default_value_t = HTTP_PORT)]
    pub http_port: u16,

    /// Configures the allowed CORS domains.
    ///
    /// By default, this option is set to `*`.
    #[clap(long = "http.corsdomain", value_delimiter = ',', default_value = "*")]
    pub http_corsdomain: Vec<String>,
}

impl RpcArgs {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.http_addr, self.http_port)
    }
}

/// Authorization CLI args
#[derive(Debug, Clone, Parser)]
pub struct AuthArgs {
    /// Addresses allowed to act on every credential.
    #[clap(long, value_delimiter = ',', value_parser = parse_address)]
    pub admins: Vec<Address>,

    /// JSON file listing the principals (address, organization, role).
    #[clap(long)]
    pub directory_file: Option<ExpandedPathBuf>,
}

impl AuthArgs {
    pub fn directory(&self) -> eyre::Result<StaticDirectory> {
        let directory = match &self.directory_file {
            Some(path) => StaticDirectory::from_file(&path.to_path_buf())?,
            None => StaticDirectory::default(),
        };
        Ok(directory.with_admins(&self.admins))
    }
}

/// Create wallet CLI args
#[derive(Debug, Clone, Parser)]
pub struct CreateWalletArgs {
    /// The path where the wallet will be stored.
    #[clap(long)]
    pub output_path: Option<ExpandedPathBuf>,

    /// The chain id.
    #[clap(long, default_value_t = 1)]
    pub chain_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn relayer_args() {
        let args = vec![
            "relayerargs",
            "--eth-client-address",
            "http://127.0.0.1:8545",
            "--account-factory",
            "0x9406Cc6185a346906296840746125a0E44976454",
            "--credential-registry",
            "0x00000000000000000000000000000000000000ee",
            "--relayer-key",
            KEY,
            "--relay-interval",
            "5",
            "--batch-size",
            "10",
        ];
        let config = RelayerArgs::try_parse_from(args).unwrap().to_config();

        assert_eq!(config.eth_client_address.as_deref(), Some("http://127.0.0.1:8545"));
        assert_eq!(config.entry_point, entry_point::ADDRESS.parse::<Address>().unwrap());
        assert_eq!(config.key, Some(KeySource::PrivateKey(KEY.into())));
        assert_eq!(config.relay_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_age, Duration::from_secs(MAX_AGE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relayer_args_without_chain_access() {
        let args = RelayerArgs::try_parse_from(["relayerargs", "--mnemonic-file", "/tmp/mnemonic"])
            .unwrap();
        let config = args.to_config();

        assert_eq!(config.key, Some(KeySource::MnemonicFile("/tmp/mnemonic".into())));
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_relayer_key() {
        assert!(RelayerArgs::try_parse_from(["relayerargs", "--relayer-key", "0x1234"]).is_err());
    }

    #[test]
    fn rpc_args_when_http_is_configured() {
        let args = vec![
            "rpcargs",
            "--http.addr",
            "0.0.0.0",
            "--http.port",
            "8545",
            "--http.corsdomain",
            "http://localhost:3000,https://credence.example",
        ];
        let args = RpcArgs::try_parse_from(args).unwrap();
        assert_eq!(
            args,
            RpcArgs {
                http_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                http_port: 8545,
                http_corsdomain: vec![
                    String::from("http://localhost:3000"),
                    String::from("https://credence.example"),
                ],
            }
        );
        assert_eq!(args.listen_address(), "0.0.0.0:8545");
    }

    #[test]
    fn auth_args() {
        let args = AuthArgs::try_parse_from([
            "authargs",
            "--admins",
            "0xadadadadadadadadadadadadadadadadadadadad,0x00000000000000000000000000000000000000ad",
        ])
        .unwrap();
        assert_eq!(args.admins.len(), 2);
        assert!(args.directory().is_ok());
    }
}
