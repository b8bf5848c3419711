//! Credence node: relayer scheduler, credential observer and JSON-RPC server

pub mod cli;
pub mod node;
pub mod utils;
