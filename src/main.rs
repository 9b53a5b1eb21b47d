use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use bully_election::config::{NodeConfig, PeerConfig, DEFAULT_BASE_PORT, DEFAULT_PROCESS_COUNT};
use bully_election::error::ElectionError;
use bully_election::node::Node;
use bully_election::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "bully-election")]
#[command(version)]
#[command(about = "Bully-algorithm leader election among a fixed set of peers")]
struct Args {
    /// This process's id (must appear in the roster)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    id: u64,

    /// Roster (comma-separated, format: "id:host:port"), including this process.
    /// Example: "1:127.0.0.1:5001,2:127.0.0.1:5002,3:127.0.0.1:5003"
    /// When empty, a loopback roster is generated from --processes and --base-port.
    #[arg(long, default_value = "")]
    peers: String,

    /// Size of the generated loopback roster
    #[arg(long, default_value_t = DEFAULT_PROCESS_COUNT)]
    processes: u64,

    /// Process `id` of the generated roster listens on base-port + id
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    /// Host to bind the listener on
    #[arg(long, default_value = "0.0.0.0")]
    bind_host: String,

    // === Timing ===
    /// Connect/write bound for one outbound message
    #[arg(long, default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Wait for ACKs from higher processes before self-declaring
    #[arg(long, default_value_t = 3000)]
    election_timeout_ms: u64,

    /// Wait for COORDINATOR after deferring before retrying
    #[arg(long, default_value_t = 5000)]
    coordinator_timeout_ms: u64,

    /// Interval between leader probes
    #[arg(long, default_value_t = 5000)]
    heartbeat_interval_ms: u64,

    /// Response window for one leader probe
    #[arg(long, default_value_t = 1000)]
    heartbeat_timeout_ms: u64,

    /// Consecutive missed probes before starting an election
    #[arg(long, default_value_t = 1)]
    miss_threshold: u32,

    /// Delay before the first election (0 waits for peers to start one)
    #[arg(long, default_value_t = 2000)]
    startup_delay_ms: u64,
}

/// Parse "id:host:port" entries. Any malformed entry is an error.
fn parse_peers(peers_str: &str) -> Result<Vec<PeerConfig>, ElectionError> {
    peers_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|peer| {
            let parts: Vec<&str> = peer.splitn(2, ':').collect();
            let parsed = match parts.as_slice() {
                [id, addr] => id.parse::<u64>().ok().filter(|id| *id > 0).map(|id| {
                    PeerConfig::new(id, addr.to_string())
                }),
                _ => None,
            };
            parsed
                .filter(|p| p.port().is_some())
                .ok_or_else(|| {
                    ElectionError::InvalidConfig(format!(
                        "invalid peer '{}', expected id:host:port",
                        peer
                    ))
                })
        })
        .collect()
}

fn build_config(args: Args) -> Result<NodeConfig, ElectionError> {
    let peers = if args.peers.trim().is_empty() {
        NodeConfig::loopback_roster(args.processes, args.base_port)?
    } else {
        parse_peers(&args.peers)?
    };

    let own_port = peers
        .iter()
        .find(|p| p.node_id == args.id)
        .ok_or(ElectionError::UnknownProcess(args.id))?
        .port()
        .ok_or_else(|| ElectionError::InvalidConfig(format!("no port for process {}", args.id)))?;

    let listen_addr: SocketAddr = format!("{}:{}", args.bind_host, own_port)
        .parse()
        .map_err(|e| ElectionError::InvalidConfig(format!("bind address: {}", e)))?;

    let config = NodeConfig {
        node_id: args.id,
        listen_addr,
        peers,
        connect_timeout_ms: args.connect_timeout_ms,
        election_timeout_ms: args.election_timeout_ms,
        coordinator_timeout_ms: args.coordinator_timeout_ms,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        heartbeat_timeout_ms: args.heartbeat_timeout_ms,
        heartbeat_miss_threshold: args.miss_threshold,
        startup_delay_ms: args.startup_delay_ms,
        ..NodeConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Argument errors exit with code 1; `--help` and `--version` exit normally.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            // Nothing else to report to if stderr itself is closed.
            let _ = e.print();
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        node_id = config.node_id,
        listen_addr = %config.listen_addr,
        peers = config.peers.len(),
        "Starting bully-election"
    );

    let shutdown = install_shutdown_handler();
    let (node, events) = Node::new(config)?;
    node.run(events, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
