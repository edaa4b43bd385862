//! # dconn Node Binary
//!
//! Brings up the direct connection layer of one job node, publishes its
//! endpoint, optionally connects to peers whose endpoints are known, and
//! tears everything down on Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Start node 0 and print its endpoint
//! dconn --config /etc/dconn/node0.toml
//!
//! # Start node 1 and connect to node 0 (endpoint copied from node 0's log)
//! dconn --config /etc/dconn/node1.toml --connect 0=a3f1
//!
//! # Verbose JSON logging
//! dconn --config node0.toml -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use dconn::{BackendRegistry, ConnectError, DirectConnManager};
use dconn_common::config::{ConfigLoader, DconnConfig, LogLevel};
use dconn_common::consts::DEFAULT_CONFIG_PATH;
use dconn_common::termination::ProcessGroupTerminator;
use dconn_common::topology::{JobTopology, NodeId, StaticTopology};
use dconn_common::transport::{DirectHeader, EndpointBlob};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

/// dconn - peer-to-peer direct connection manager node
#[derive(Parser, Debug)]
#[command(name = "dconn")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Peer-to-peer direct connection manager node")]
#[command(long_about = None)]
struct Args {
    /// Path to node configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Connect to a peer: NODE=ENDPOINT_HEX (can be specified multiple times)
    #[arg(long = "connect", value_name = "NODE=ENDPOINT", value_parser = parse_peer, action = clap::ArgAction::Append)]
    peers: Vec<(NodeId, EndpointBlob)>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn parse_peer(s: &str) -> Result<(NodeId, EndpointBlob), String> {
    let (node, hex) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NODE=ENDPOINT, got '{s}'"))?;
    let node_id = node
        .parse::<NodeId>()
        .map_err(|e| format!("invalid node id '{node}': {e}"))?;
    let endpoint =
        EndpointBlob::from_hex(hex).ok_or_else(|| format!("invalid endpoint hex '{hex}'"))?;
    Ok((node_id, endpoint))
}

/// Reject peers the local job layout cannot lock: out of range, or ourselves.
fn check_peer(node_id: NodeId, local: NodeId, node_count: u32) -> Result<(), String> {
    if node_id >= node_count {
        return Err(format!(
            "--connect node {node_id} is outside the job ({node_count} nodes)"
        ));
    }
    if node_id == local {
        return Err(format!("--connect node {node_id} is the local node"));
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("dconn failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = DconnConfig::load(&args.config);
    let base_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, base_level);

    let config = config?;
    config.validate()?;

    info!(
        "{} v{} starting (job {}, node {})",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION"),
        config.job.job_id,
        config.job.node_id
    );

    let topology: Arc<dyn JobTopology> = Arc::new(StaticTopology::from_config(&config.job));
    for (node_id, _) in &args.peers {
        check_peer(*node_id, topology.node_id(), topology.node_count())?;
    }

    let backend = BackendRegistry::with_builtin().select(&config.transport, Arc::clone(&topology))?;
    let manager = DirectConnManager::initialize(
        backend,
        Arc::clone(&topology),
        topology.node_count(),
        &DirectHeader::length_prefixed(),
    )?;

    info!(
        "Endpoint of node {}: {}",
        manager.local_node_id(),
        manager.endpoint_blob().to_hex()
    );

    for (node_id, endpoint) in &args.peers {
        if let Err(e) = connect_peer(&manager, *node_id, endpoint) {
            let abort = e.into_abort();
            error!("{}", abort);
            abort.execute(&ProcessGroupTerminator::current())?;
            return Err("job step aborted".into());
        }
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        // Receiver only goes away after the first signal.
        let _ = tx.send(());
    })?;
    rx.recv()?;

    manager.finalize();
    info!("dconn shutdown complete");
    Ok(())
}

/// Run the handshake toward one peer whose endpoint is already known.
fn connect_peer(
    manager: &DirectConnManager,
    node_id: NodeId,
    endpoint: &EndpointBlob,
) -> Result<(), ConnectError> {
    let mut peer = manager.lock(node_id);
    let decision = peer.requires_connect();
    if !decision.should_connect {
        debug!("Node {} in state {}, nothing to do", node_id, peer.state());
        return Ok(());
    }

    let init = decision
        .should_send_init
        .then(|| init_message(manager.local_node_id(), manager.endpoint_blob()));
    peer.connect(endpoint.as_bytes(), init.as_deref())?;
    info!("Direct connection to node {} established", node_id);
    Ok(())
}

/// Endpoint advertisement: local node id followed by the local endpoint.
fn init_message(node_id: NodeId, endpoint: &EndpointBlob) -> Vec<u8> {
    let mut body = node_id.to_be_bytes().to_vec();
    body.extend_from_slice(endpoint.as_bytes());
    DirectHeader::frame(&body)
}

/// Setup tracing subscriber based on CLI arguments and configured level.
fn setup_tracing(args: &Args, base: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::from(base)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
