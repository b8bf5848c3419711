//! Wiring of the node components

use crate::{
    cli::args::{AuthArgs, CreateWalletArgs, RelayerArgs, RpcArgs, StorageArgs},
    utils::unwrap_path_or_home,
};
use alloy_chains::Chain;
use credence_primitives::{
    constants::{
        storage::{DATABASE, WALLET_DIR},
        supported_chains,
    },
    provider::{create_http_provider, create_ws_provider},
    SystemClock,
};
use credence_relayer::{
    config::{RelayerConfig, ValidatedConfig},
    ConfigError, CredenceService, EthersChainClient, RelayerSetup, RelayerSigner,
};
use credence_rpc::{
    CredentialApiServer, CredentialApiServerImpl, JsonRpcServer, RelayerApiServer,
    RelayerApiServerImpl,
};
use credence_storage::Stores;
use ethers::providers::Middleware;
use expanded_pathbuf::ExpandedPathBuf;
use std::{fs, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the relayer needs, built on top of a connected execution client
async fn relayer_setup<M: Middleware + 'static>(
    eth_client: Arc<M>,
    config: &RelayerConfig,
    validated: ValidatedConfig,
) -> eyre::Result<RelayerSetup> {
    let chain_id = eth_client
        .get_chainid()
        .await
        .map_err(|err| eyre::eyre!("Failed to fetch chain id: {err}"))?
        .as_u64();
    if supported_chains::is_supported(chain_id) {
        info!("Connected to chain {}", Chain::from(chain_id));
    } else {
        warn!("Chain {chain_id} is not among the tested chains");
    }

    let signer = RelayerSigner::from_source(&validated.key, chain_id)?;
    info!("Relayer address {:?}", signer.address());

    let chain = Arc::new(EthersChainClient::new(
        eth_client,
        &signer,
        validated.contracts,
        config.rpc_timeout,
    ));
    let scheduler = config.scheduler_config(signer.address());

    let mut setup = RelayerSetup::new(chain, signer, validated.contracts, scheduler);
    setup.paymaster = config.paymaster;
    setup.issuance_poll_retries = config.issuance_poll_retries;
    setup.issuance_poll_interval = config.issuance_poll_interval;
    Ok(setup)
}

async fn connect(config: &RelayerConfig) -> eyre::Result<Result<RelayerSetup, ConfigError>> {
    let validated = match config.validate() {
        Ok(validated) => validated,
        Err(err) => return Ok(Err(err)),
    };

    let setup = if validated.eth_client_address.starts_with("http") {
        let eth_client = Arc::new(create_http_provider(&validated.eth_client_address).await?);
        relayer_setup(eth_client, config, validated).await?
    } else {
        let eth_client = Arc::new(create_ws_provider(&validated.eth_client_address).await?);
        relayer_setup(eth_client, config, validated).await?
    };
    Ok(Ok(setup))
}

fn open_stores(args: &StorageArgs) -> eyre::Result<Stores> {
    if args.use_memory {
        info!("Using in-memory database");
        return Ok(Stores::memory());
    }

    let datadir = unwrap_path_or_home(args.datadir.clone())?;
    fs::create_dir_all(&datadir)?;
    let path = datadir.join(DATABASE);
    info!("Opening database at {}", path.display());
    Ok(Stores::open(&path)?)
}

/// Starts the node, returning the token stopping its background tasks
pub async fn launch_node(
    relayer: RelayerArgs,
    storage: StorageArgs,
    rpc: RpcArgs,
    auth: AuthArgs,
) -> eyre::Result<CancellationToken> {
    let stores = open_stores(&storage)?;
    let directory = auth.directory()?;
    let setup = connect(&relayer.to_config()).await?;

    let service = Arc::new(CredenceService::new(
        stores,
        Arc::new(SystemClock),
        Arc::new(directory),
        setup,
    ));

    let cancel = CancellationToken::new();
    service.start(cancel.clone());

    info!("Starting JSON-RPC server...");
    let mut server = JsonRpcServer::new(rpc.listen_address()).with_cors(rpc.http_corsdomain);
    server.add_methods(RelayerApiServerImpl { service: service.clone() }.into_rpc())?;
    server.add_methods(CredentialApiServerImpl { service }.into_rpc())?;

    let (handle, address) = server.start().await?;
    info!("JSON-RPC server listening on {address}");
    tokio::spawn(handle.stopped());

    Ok(cancel)
}

/// Generates the relayer key, writing its mnemonic under the data directory
pub fn create_wallet(args: CreateWalletArgs) -> eyre::Result<()> {
    let path = match args.output_path {
        Some(path) => path,
        None => ExpandedPathBuf(unwrap_path_or_home(None)?.join(WALLET_DIR)),
    };

    let signer = RelayerSigner::build_random(path.clone(), args.chain_id)?;
    info!("Relayer wallet {:?} written to {}", signer.address(), path.display());
    Ok(())
}
