use super::args::{AuthArgs, CreateWalletArgs, RelayerArgs, RpcArgs, StorageArgs};
use crate::{
    node::{create_wallet, launch_node},
    utils::unwrap_path_or_home,
};
use clap::{Parser, Subcommand};
use credence_primitives::constants::storage::DATABASE;
use credence_storage::Stores;
use expanded_pathbuf::ExpandedPathBuf;
use std::future::pending;

/// Start the node (relayer scheduler, credential observer, JSON-RPC server)
#[derive(Debug, Parser)]
pub struct NodeCommand {
    /// All relayer specific args
    #[clap(flatten)]
    relayer: RelayerArgs,

    /// All storage args
    #[clap(flatten)]
    storage: StorageArgs,

    /// All RPC args
    #[clap(flatten)]
    rpc: RpcArgs,

    /// All authorization args
    #[clap(flatten)]
    auth: AuthArgs,
}

impl NodeCommand {
    /// Execute the command
    pub async fn execute(self) -> eyre::Result<()> {
        let cancel = launch_node(self.relayer, self.storage, self.rpc, self.auth).await?;
        // stops the scheduler and the observer when the node future is dropped
        let _guard = cancel.drop_guard();
        pending().await
    }
}

/// Create the relayer wallet
#[derive(Debug, Parser)]
pub struct CreateWalletCommand {
    /// All create wallet args
    #[clap(flatten)]
    create_wallet: CreateWalletArgs,
}

impl CreateWalletCommand {
    /// Execute the command
    pub fn execute(self) -> eyre::Result<()> {
        create_wallet(self.create_wallet)
    }
}

/// Dump the database
#[derive(Debug, Subcommand)]
pub enum DebugCommand {
    #[command(name = "dump-queue")]
    DumpQueue(DumpQueue),

    #[command(name = "dump-credentials")]
    DumpCredentials(DumpCredentials),
}

impl DebugCommand {
    /// Execute the command
    pub fn execute(self) -> eyre::Result<()> {
        match self {
            DebugCommand::DumpQueue(command) => command.execute(),
            DebugCommand::DumpCredentials(command) => command.execute(),
        }
    }
}

fn open_stores(datadir: Option<ExpandedPathBuf>) -> eyre::Result<Stores> {
    let path = unwrap_path_or_home(datadir)?.join(DATABASE);
    if !path.exists() {
        return Err(eyre::eyre!("No database at {}", path.display()));
    }
    Ok(Stores::open(&path)?)
}

/// Print every queued transaction as JSON
#[derive(Debug, Parser)]
pub struct DumpQueue {
    /// Data directory of the node.
    #[clap(long)]
    datadir: Option<ExpandedPathBuf>,
}

impl DumpQueue {
    pub fn execute(self) -> eyre::Result<()> {
        let transactions = open_stores(self.datadir)?.transactions.all()?;
        serde_json::to_writer(std::io::stdout(), &transactions)?;
        Ok(())
    }
}

/// Print every credential as JSON
#[derive(Debug, Parser)]
pub struct DumpCredentials {
    /// Data directory of the node.
    #[clap(long)]
    datadir: Option<ExpandedPathBuf>,
}

impl DumpCredentials {
    pub fn execute(self) -> eyre::Result<()> {
        let credentials = open_stores(self.datadir)?.credentials.all()?;
        serde_json::to_writer(std::io::stdout(), &credentials)?;
        Ok(())
    }
}
