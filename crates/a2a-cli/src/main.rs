//! A2A CLI
//!
//! Sends tasks to and follows event streams from agents on remote swarm
//! nodes, authenticated with the local workload identity.

mod commands;

use std::time::Duration;

use clap::Parser;
use tracing::info;

use a2a_client::{ClientSettings, ConnectOptions};
use a2a_core::config::ENV_IDENTITY_SOCKET;
use a2a_core::tracing_init::init_tracing;
use a2a_identity::SpiffeId;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "a2a")]
#[command(version, about = "Agent-to-agent remote call client", long_about = None)]
struct Cli {
    /// Remote peer address (host:port)
    #[arg(long, global = true, default_value = "127.0.0.1:50051")]
    target: String,

    /// SPIFFE ID the peer must present
    #[arg(long, global = true)]
    expected_peer: Option<SpiffeId>,

    /// SPIFFE Workload API socket of the local identity agent
    #[arg(long, global = true, env = ENV_IDENTITY_SOCKET)]
    identity_socket: Option<String>,

    /// Disable TLS and identity verification (development only; also A2A_INSECURE=1)
    #[arg(long, global = true)]
    insecure: bool,

    /// Only try the WebSocket transport
    #[arg(long, global = true)]
    no_grpc: bool,

    /// WebSocket endpoint path
    #[arg(long, global = true, default_value = a2a_client::options::DEFAULT_SOCKET_PATH)]
    ws_path: String,

    /// Connect timeout per transport, in seconds
    #[arg(long, global = true, default_value = "10")]
    connect_timeout: u64,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Flags layered over the environment-derived settings.
    fn settings(&self, base: ClientSettings) -> ClientSettings {
        ClientSettings {
            insecure: base.insecure || self.insecure,
            identity_socket: self
                .identity_socket
                .clone()
                .unwrap_or(base.identity_socket),
        }
    }

    fn connect_options(&self, settings: ClientSettings) -> ConnectOptions {
        let mut options = ConnectOptions::new()
            .with_settings(settings)
            .with_prefer_structured(!self.no_grpc)
            .with_socket_path(self.ws_path.clone())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout));
        if let Some(peer) = &self.expected_peer {
            options = options.with_expected_peer(peer.clone());
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("a2a_client=warn,a2a_identity=warn,a2a=info", cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting a2a CLI");

    let settings = cli.settings(ClientSettings::from_env());
    commands::run(&cli.target, cli.connect_options(settings), &cli.command).await
}
