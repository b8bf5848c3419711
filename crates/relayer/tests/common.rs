#![allow(dead_code)]

use credence_primitives::{clock::ManualClock, CredentialDraft, Wallet, WalletStatus};
use credence_relayer::{
    auth::{Principal, Role, StaticDirectory},
    mock::MockChainClient,
    ContractAddresses, CredenceService, RelayerSetup, RelayerSigner, SchedulerConfig,
    TickOutcome,
};
use credence_storage::Stores;
use ethers::types::{Address, H256, U256};
use std::{sync::Arc, time::Duration};

pub const CHAIN_ID: u64 = 1337;
pub const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const START: u64 = 1_700_000_000_000;
pub const DAY: u64 = 24 * 60 * 60 * 1000;

pub fn issuer() -> Address {
    Address::repeat_byte(0x11)
}

/// Member of the issuer's organization
pub fn colleague() -> Address {
    Address::repeat_byte(0x12)
}

/// Member of another organization
pub fn outsider() -> Address {
    Address::repeat_byte(0x13)
}

pub fn admin() -> Address {
    Address::repeat_byte(0xad)
}

pub fn subject() -> Address {
    "0x0000000000000000000000000000000000000abc".parse().unwrap()
}

pub fn registry() -> Address {
    Address::repeat_byte(0xee)
}

pub fn factory() -> Address {
    Address::repeat_byte(0xfa)
}

pub fn draft() -> CredentialDraft {
    CredentialDraft {
        issuer: issuer(),
        subject: subject(),
        title: "Rust engineer".into(),
        description: "Passed the systems programming assessment".into(),
        metadata_ref: "ipfs://credential".into(),
        credential_type: "ASSESSMENT".into(),
        valid_until: U256::zero(),
        evidence_hash: H256::repeat_byte(0x0e),
        revocable: true,
    }
}

pub fn directory() -> StaticDirectory {
    let member = |address: Address, organization: &str| Principal {
        address,
        organization: Some(organization.into()),
        role: Role::Member,
    };
    StaticDirectory::new([
        member(issuer(), "acme"),
        member(colleague(), "acme"),
        member(outsider(), "globex"),
    ])
    .with_admins(&[admin()])
}

pub struct TestRelayer {
    pub service: Arc<CredenceService>,
    pub chain: Arc<MockChainClient>,
    pub clock: ManualClock,
    pub stores: Stores,
}

impl TestRelayer {
    pub async fn tick(&self) -> TickOutcome {
        self.service.scheduler().unwrap().tick().await
    }

    /// Stores a created wallet for `owner` without going through the chain
    pub fn add_wallet(&self, owner: Address) -> Address {
        let smart_account_address = MockChainClient::account_address(&owner, U256::zero());
        self.stores
            .wallets
            .insert(Wallet {
                owner_address: owner,
                smart_account_address,
                salt: U256::zero(),
                status: WalletStatus::Created,
                creation_transaction_id: None,
                created_at: START,
            })
            .unwrap();
        smart_account_address
    }
}

pub fn setup() -> TestRelayer {
    setup_with_issuance_poll(3, Duration::from_millis(10))
}

pub fn setup_with_issuance_poll(retries: usize, interval: Duration) -> TestRelayer {
    let stores = Stores::memory();
    let chain = Arc::new(MockChainClient::new(CHAIN_ID));
    let clock = ManualClock::new(START);

    let signer = RelayerSigner::from_private_key(KEY, CHAIN_ID).unwrap();
    let mut scheduler = SchedulerConfig::new(signer.address());
    scheduler.receipt_poll_interval = Duration::from_millis(1);
    scheduler.receipt_poll_retries = 2;

    let mut setup = RelayerSetup::new(
        chain.clone(),
        signer,
        ContractAddresses {
            entry_point: chain.entry_point(),
            account_factory: factory(),
            credential_registry: registry(),
        },
        scheduler,
    );
    setup.issuance_poll_retries = retries;
    setup.issuance_poll_interval = interval;

    let service = CredenceService::new(
        stores.clone(),
        Arc::new(clock.clone()),
        Arc::new(directory()),
        Ok(setup),
    );

    TestRelayer { service: Arc::new(service), chain, clock, stores }
}
