//! ArborKV Server Binary
//!
//! Starts one node of the replication tree.

use std::sync::Arc;
use std::time::Duration;

use arborkv::config::{join_host_port, Config, ParentLossPolicy};
use arborkv::network::{Server, Subscriber};
use arborkv::store::MemoryStore;
use arborkv::Node;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// ArborKV Server
#[derive(Parser, Debug)]
#[command(name = "arborkv-server")]
#[command(about = "In-memory key-value store replicated along a tree of nodes")]
#[command(version)]
struct Args {
    /// Host to listen on
    #[arg(long, env = "SERVICE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "SERVICE_PORT", default_value = "7070")]
    port: String,

    /// Parent node host (leave empty for a root node)
    #[arg(long, env = "PARENT_NODE_SERVICE_HOST", default_value = "")]
    parent_host: String,

    /// Parent node port (leave empty for a root node)
    #[arg(long, env = "PARENT_NODE_SERVICE_PORT", default_value = "")]
    parent_port: String,

    /// What to do when the parent link breaks
    #[arg(long, value_enum, default_value_t = LossPolicy::Detach)]
    on_parent_loss: LossPolicy,

    /// Redial attempts for --on-parent-loss=reconnect
    #[arg(long, default_value = "5")]
    reconnect_attempts: u32,

    /// Delay between redial attempts in milliseconds
    #[arg(long, default_value = "1000")]
    reconnect_backoff_ms: u64,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Socket write timeout in milliseconds (0 = none)
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,

    /// Initial entry as key=value (repeatable)
    #[arg(long = "seed", value_parser = parse_seed)]
    seeds: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LossPolicy {
    Detach,
    Exit,
    Reconnect,
}

fn parse_seed(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,arborkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let on_parent_loss = match args.on_parent_loss {
        LossPolicy::Detach => ParentLossPolicy::Detach,
        LossPolicy::Exit => ParentLossPolicy::Exit,
        LossPolicy::Reconnect => ParentLossPolicy::Reconnect {
            attempts: args.reconnect_attempts,
            backoff: Duration::from_millis(args.reconnect_backoff_ms),
        },
    };

    let Some(listen_addr) = join_host_port(&args.host, &args.port) else {
        tracing::error!("Listen host and port must both be set");
        std::process::exit(1);
    };

    let config = Config::builder()
        .listen_addr(listen_addr)
        .parent(join_host_port(&args.parent_host, &args.parent_port))
        .on_parent_loss(on_parent_loss)
        .max_connections(args.max_connections)
        .write_timeout_ms(args.write_timeout_ms)
        .build();

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    tracing::info!("ArborKV Server v{}", arborkv::VERSION);
    tracing::info!("Listen address: {}", config.listen_addr);
    match &config.parent_addr {
        Some(parent) => tracing::info!("Parent node: {}", parent),
        None => tracing::info!("No parent configured, running as root"),
    }

    let store = MemoryStore::with_entries(args.seeds);
    let node = Arc::new(Node::new(Arc::new(store)));

    let server = match Server::bind(config.clone(), Arc::clone(&node)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    // Reach parity with the parent before any child can join us
    if let Some(subscriber) = Subscriber::new(&config, Arc::clone(&node)) {
        let link = match subscriber.bootstrap() {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("Failed to join parent {}: {}", subscriber.parent_addr(), e);
                std::process::exit(1);
            }
        };

        std::thread::spawn(move || {
            if let Err(e) = subscriber.run(link) {
                tracing::error!("Parent link lost: {}", e);
                std::process::exit(1);
            }
        });
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
