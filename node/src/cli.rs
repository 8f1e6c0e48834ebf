//! # CLI Interface
//!
//! Defines the command-line argument structure for `custody-node` using
//! `clap` derive. Supports three subcommands: `run`, `signers`, and
//! `version`.

use clap::{Parser, Subcommand};

use custody_protocol::config::{
    DEFAULT_MAX_CALL_DEPTH, DEFAULT_METRICS_PORT, DEFAULT_NODE_EVENT_RETENTION, DEFAULT_RPC_PORT,
    DEVNET_SIGNER_COUNT,
};
use custody_protocol::VaultConfig;

use crate::logging::LogFormat;

/// Custody ledger node.
///
/// Holds native-coin balances on behalf of callers, pays withdrawals out
/// to an external ledger, and serves the books over REST, JSON-RPC and a
/// WebSocket event stream.
#[derive(Parser, Debug)]
#[command(
    name = "custody-node",
    about = "Custody ledger node",
    version,
    propagate_version = true
)]
pub struct CustodyNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the custody node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print the deterministic devnet signer addresses.
    Signers(SignersArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Interface both listeners bind to.
    #[arg(long, env = "CUSTODY_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST and JSON-RPC API.
    #[arg(long, env = "CUSTODY_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CUSTODY_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Network label reported by `/status`.
    #[arg(long, env = "CUSTODY_NETWORK", default_value = "devnet")]
    pub network: String,

    /// Revert deposits that attach no value instead of recording them.
    #[arg(long, env = "CUSTODY_REJECT_ZERO_DEPOSITS")]
    pub reject_zero_deposits: bool,

    /// Maximum nesting of re-entrant ledger calls made during a payout.
    #[arg(long, env = "CUSTODY_MAX_CALL_DEPTH", default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    pub max_call_depth: usize,

    /// Committed events kept in memory for `/events`. `0` keeps everything.
    #[arg(long, env = "CUSTODY_EVENT_RETENTION", default_value_t = DEFAULT_NODE_EVENT_RETENTION)]
    pub event_retention: usize,

    /// Log output format.
    #[arg(long, env = "CUSTODY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    /// Ledger policy assembled from the command line.
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            reject_zero_deposits: self.reject_zero_deposits,
            max_call_depth: self.max_call_depth,
            event_retention: self.event_retention,
        }
    }
}

/// Arguments for the `signers` subcommand.
#[derive(Parser, Debug)]
pub struct SignersArgs {
    /// How many signer addresses to print.
    #[arg(long, short = 'n', default_value_t = DEVNET_SIGNER_COUNT)]
    pub count: usize,
}
