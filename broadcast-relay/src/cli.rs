use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, accepting WebSocket and TCP connections.
    Serve(ServeArgs),
    /// Connect to a relay over TCP and exchange lines from stdin.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address for the WebSocket listener (route `/ws`). Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub ws_listen: SocketAddr,

    /// Address for the newline-delimited JSON TCP listener.
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub tcp_listen: SocketAddr,

    /// Do not start the WebSocket listener.
    #[arg(long)]
    pub no_websocket: bool,

    /// Do not start the TCP listener.
    #[arg(long)]
    pub no_tcp: bool,

    /// Messages that may wait for broadcast before senders are held back.
    #[arg(long, default_value_t = crate::config::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Milliseconds a single broadcast write may take before the client is dropped.
    #[arg(long, default_value_t = 5000)]
    pub write_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// TCP address of the relay.
    #[arg(long, default_value = "127.0.0.1:8081")]
    pub server: SocketAddr,
}
