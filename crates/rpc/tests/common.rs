#![allow(dead_code)]

use credence_primitives::{clock::ManualClock, CredentialDraft, Wallet, WalletStatus};
use credence_relayer::{
    auth::{Principal, Role, StaticDirectory},
    mock::MockChainClient,
    ConfigError, ContractAddresses, CredenceService, RelayerSetup, RelayerSigner,
    SchedulerConfig,
};
use credence_rpc::{
    CredentialApiServer, CredentialApiServerImpl, JsonRpcServer, RelayerApiServer,
    RelayerApiServerImpl,
};
use credence_storage::Stores;
use ethers::types::{Address, H256, U256};
use jsonrpsee::{
    core::ClientError,
    http_client::{HttpClient, HttpClientBuilder},
    server::ServerHandle,
};
use std::{sync::Arc, time::Duration};

pub const CHAIN_ID: u64 = 1337;
pub const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const START: u64 = 1_700_000_000_000;

pub fn issuer() -> Address {
    Address::repeat_byte(0x11)
}

pub fn outsider() -> Address {
    Address::repeat_byte(0x13)
}

pub fn draft() -> CredentialDraft {
    CredentialDraft {
        issuer: issuer(),
        subject: Address::repeat_byte(0x5b),
        title: "Rust engineer".into(),
        description: "Passed the systems programming assessment".into(),
        metadata_ref: "ipfs://credential".into(),
        credential_type: "ASSESSMENT".into(),
        valid_until: U256::zero(),
        evidence_hash: H256::repeat_byte(0x0e),
        revocable: true,
    }
}

fn directory() -> StaticDirectory {
    StaticDirectory::new([
        Principal { address: issuer(), organization: Some("acme".into()), role: Role::Member },
        Principal { address: outsider(), organization: Some("globex".into()), role: Role::Member },
    ])
}

pub struct TestNode {
    pub service: Arc<CredenceService>,
    pub chain: Arc<MockChainClient>,
    pub stores: Stores,
    pub client: HttpClient,
    pub handle: ServerHandle,
}

impl TestNode {
    pub async fn tick(&self) {
        self.service.scheduler().unwrap().tick().await;
    }

    /// Stores a created wallet for `owner` without going through the chain
    pub fn add_wallet(&self, owner: Address) {
        self.stores
            .wallets
            .insert(Wallet {
                owner_address: owner,
                smart_account_address: MockChainClient::account_address(&owner, U256::zero()),
                salt: U256::zero(),
                status: WalletStatus::Created,
                creation_transaction_id: None,
                created_at: START,
            })
            .unwrap();
    }
}

pub fn build_http_client(address: String) -> Result<HttpClient, ClientError> {
    HttpClientBuilder::default().build(format!("http://{}", address))
}

async fn serve(service: Arc<CredenceService>) -> (HttpClient, ServerHandle) {
    let mut server = JsonRpcServer::new("127.0.0.1:0".into()).with_cors(vec!["*".into()]);
    server.add_methods(RelayerApiServerImpl { service: service.clone() }.into_rpc()).unwrap();
    server.add_methods(CredentialApiServerImpl { service }.into_rpc()).unwrap();

    let (handle, address) = server.start().await.unwrap();
    (build_http_client(address.to_string()).unwrap(), handle)
}

pub async fn start_node() -> TestNode {
    let stores = Stores::memory();
    let chain = Arc::new(MockChainClient::new(CHAIN_ID));

    let signer = RelayerSigner::from_private_key(KEY, CHAIN_ID).unwrap();
    let mut scheduler = SchedulerConfig::new(signer.address());
    scheduler.receipt_poll_interval = Duration::from_millis(1);
    scheduler.receipt_poll_retries = 2;

    let mut setup = RelayerSetup::new(
        chain.clone(),
        signer,
        ContractAddresses {
            entry_point: chain.entry_point(),
            account_factory: Address::repeat_byte(0xfa),
            credential_registry: Address::repeat_byte(0xee),
        },
        scheduler,
    );
    setup.issuance_poll_retries = 2;
    setup.issuance_poll_interval = Duration::from_millis(5);

    let service = Arc::new(CredenceService::new(
        stores.clone(),
        Arc::new(ManualClock::new(START)),
        Arc::new(directory()),
        Ok(setup),
    ));
    let (client, handle) = serve(service.clone()).await;

    TestNode { service, chain, stores, client, handle }
}

/// Node without a relayer key
pub async fn start_misconfigured_node() -> (HttpClient, ServerHandle) {
    let service = Arc::new(CredenceService::new(
        Stores::memory(),
        Arc::new(ManualClock::new(START)),
        Arc::new(directory()),
        Err(ConfigError::MissingRelayerKey),
    ));
    serve(service).await
}

/// JSON-RPC error code of a failed call
pub fn error_code<T: std::fmt::Debug>(res: Result<T, ClientError>) -> i32 {
    match res {
        Err(ClientError::Call(err)) => err.code(),
        other => panic!("expected a call error, got {other:?}"),
    }
}
