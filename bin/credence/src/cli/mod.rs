use crate::utils::run_until_ctrl_c;
use clap::{value_parser, Parser, Subcommand};
use std::panic;

pub mod args;
pub mod commands;

/// The main Credence CLI interface
#[derive(Debug, Parser)]
#[command(author, version, about = "Credence", long_about = None)]
pub struct Cli {
    /// The command to execute
    #[clap(subcommand)]
    command: Commands,

    /// The verbosity level
    #[clap(long, short, global = true, default_value_t = 2, value_parser = value_parser!(u8).range(..=4))]
    verbosity: u8,
}

impl Cli {
    /// Get the log level based on the verbosity level
    pub fn get_log_level(&self) -> String {
        match self.verbosity {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
        .into()
    }
}

/// Commands to be executed
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the node (relayer scheduler, credential observer, JSON-RPC server)
    #[command(name = "node")]
    Node(Box<commands::NodeCommand>),

    /// Create the relayer wallet
    #[command(name = "create-wallet")]
    CreateWallet(commands::CreateWalletCommand),

    /// For debug purposes (dump queued transactions and credentials from database)
    #[command(subcommand, name = "debug")]
    Debug(commands::DebugCommand),
}

pub fn run() -> eyre::Result<()> {
    let cli = Cli::parse();

    let rust_log = match std::env::var("RUST_LOG") {
        Ok(val) => format!("{val},credence={}", cli.get_log_level()),
        Err(_) => format!("credence={}", cli.get_log_level()),
    };
    std::env::set_var("RUST_LOG", rust_log);
    tracing_subscriber::fmt::init();

    std::thread::Builder::new()
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

            let task = async move {
                match cli.command {
                    Commands::Node(command) => command.execute().await,
                    Commands::CreateWallet(command) => command.execute(),
                    Commands::Debug(command) => command.execute(),
                }
            };

            rt.block_on(run_until_ctrl_c(task))?;
            Ok(())
        })?
        .join()
        .unwrap_or_else(|e| panic::resume_unwind(e))
}
