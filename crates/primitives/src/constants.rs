//! Relayer-related constants

/// Entry point smart contract
pub mod entry_point {
    /// Address of the entry point smart contract
    pub const ADDRESS: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    /// Version of the entry point smart contract
    pub const VERSION: &str = "0.6.0";
    /// Nonce key used for every relayed user operation
    pub const NONCE_KEY: u64 = 0;
}

/// Relayer scheduler
pub mod relayer {
    /// Interval between two scheduler ticks (in seconds)
    pub const RELAY_INTERVAL: u64 = 15;
    /// Maximum number of queued transactions processed in one tick
    pub const BATCH_SIZE: usize = 5;
    /// Pending transactions older than this are no longer picked up (in seconds)
    pub const MAX_AGE: u64 = 24 * 60 * 60;
    /// Timeout applied to every RPC call (in seconds)
    pub const RPC_TIMEOUT: u64 = 30;
    /// Interval between two receipt lookups while waiting for inclusion (in milliseconds)
    pub const RECEIPT_POLL_INTERVAL: u64 = 1_000;
    /// Number of receipt lookups before a submitted transaction is left for the next tick
    pub const RECEIPT_POLL_RETRIES: usize = 60;
}

/// Gas estimation for relayed user operations
pub mod gas {
    /// Safety multiplier applied to call gas estimates (numerator / denominator)
    pub const MULTIPLIER_NUMERATOR: u64 = 12;
    pub const MULTIPLIER_DENOMINATOR: u64 = 10;
    /// Call gas limit used when estimation fails
    pub const FALLBACK_CALL_GAS: u64 = 1_000_000;
    /// Verification gas limit of the account's `validateUserOp`
    pub const VERIFICATION_GAS: u64 = 150_000;
}

/// Smart account provisioning
pub mod wallet {
    /// Attempts made when the owner key is taken by a concurrent provision
    pub const PROVISION_RETRIES: usize = 3;
}

/// Credential lifecycle
pub mod credential {
    /// Number of polls while waiting for an issuance to be confirmed
    pub const ISSUANCE_POLL_RETRIES: usize = 12;
    /// Interval between two issuance polls (in seconds)
    pub const ISSUANCE_POLL_INTERVAL: u64 = 5;
}

/// Storage
pub mod storage {
    /// Default name of the data directory under the home directory
    pub const DATA_DIR: &str = ".credence";
    /// File name of the embedded database
    pub const DATABASE: &str = "credence.redb";
    /// Directory holding the relayer's mnemonic
    pub const WALLET_DIR: &str = "wallet";
}

/// RPC
pub mod rpc {
    pub const HTTP_ADDR: &str = "127.0.0.1";
    pub const HTTP_PORT: u16 = 3000;
}

/// JSON-RPC error codes
pub mod rpc_error_codes {
    pub const NOT_FOUND: i32 = -32001;
    pub const CONFLICT: i32 = -32002;
    pub const UNAUTHORIZED: i32 = -32003;
    pub const UNKNOWN_ACCOUNT: i32 = -32004;
    pub const CONFIG: i32 = -32005;
    pub const INTERNAL: i32 = -32603;
    pub const INVALID_PARAMS: i32 = -32602;
}

/// Supported chains
pub mod supported_chains {
    use alloy_chains::NamedChain;

    pub const CHAINS: [NamedChain; 8] = [
        NamedChain::Dev,
        NamedChain::Mainnet,
        NamedChain::Sepolia,
        NamedChain::Holesky,
        NamedChain::PolygonMumbai,
        NamedChain::OptimismSepolia,
        NamedChain::ArbitrumSepolia,
        NamedChain::BaseSepolia,
    ];

    /// Whether the relayer has been run against the chain with the given id
    pub fn is_supported(chain_id: u64) -> bool {
        CHAINS.iter().any(|chain| *chain as u64 == chain_id)
    }
}
