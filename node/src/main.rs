// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Node
//!
//! Entry point for the `custody-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and serves the ledger over HTTP/WS.
//!
//! The binary supports three subcommands:
//!
//! - `run`: serve the ledger API and the metrics endpoint
//! - `signers`: print the deterministic devnet signer addresses
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use custody_protocol::config::PROTOCOL_VERSION;
use custody_protocol::Address;

use cli::{Commands, CustodyNodeCli};
use metrics::NodeMetrics;
use service::LedgerService;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CustodyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Signers(args) => {
            print_signers(args.count);
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API server and the metrics endpoint, then waits for shutdown.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "custody_node=info,custody_contracts=info,tower_http=debug",
        args.log_format,
    )?;

    let config = args.vault_config();
    tracing::info!(
        bind = %args.bind,
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        network = %args.network,
        reject_zero_deposits = config.reject_zero_deposits,
        max_call_depth = config.max_call_depth,
        event_retention = config.event_retention,
        "starting custody-node"
    );

    // --- Metrics ---
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to register prometheus metrics")?);

    // --- Ledger ---
    let ledger = Arc::new(LedgerService::new(config, Arc::clone(&node_metrics)));

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            PROTOCOL_VERSION,
        ),
        network: args.network.clone(),
        ledger,
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("custody-node stopped");
    Ok(())
}

/// Seed used for the `index`-th devnet signer.
fn signer_seed(index: usize) -> String {
    format!("devnet-signer-{}", index)
}

/// Prints `count` deterministic signer addresses, one per line.
fn print_signers(count: usize) {
    for index in 0..count {
        println!("{:>3}  {}", index, Address::derive(&signer_seed(index)));
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("custody-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the error is logged and that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn devnet_signers_are_stable_and_distinct() {
        let first: Vec<Address> = (0..10).map(|i| Address::derive(&signer_seed(i))).collect();
        let again: Vec<Address> = (0..10).map(|i| Address::derive(&signer_seed(i))).collect();
        assert_eq!(first, again);

        let unique: HashSet<Address> = first.iter().copied().collect();
        assert_eq!(unique.len(), 10);
    }
}
