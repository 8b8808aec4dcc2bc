use std::{net::SocketAddr, time::Duration};

use crate::cli::ServeArgs;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the relay needs to start. A listener left as `None` is not
/// started.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub tcp_listen: Option<SocketAddr>,
    pub ws_listen: Option<SocketAddr>,
    /// Messages that may wait for fan-out before publishers block.
    pub queue_capacity: usize,
    /// Upper bound on one broadcast write to one client.
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tcp_listen: None,
            ws_listen: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl From<&ServeArgs> for RelayConfig {
    fn from(args: &ServeArgs) -> Self {
        Self {
            tcp_listen: (!args.no_tcp).then_some(args.tcp_listen),
            ws_listen: (!args.no_websocket).then_some(args.ws_listen),
            queue_capacity: args.queue_capacity,
            write_timeout: Duration::from_millis(args.write_timeout_ms),
        }
    }
}
