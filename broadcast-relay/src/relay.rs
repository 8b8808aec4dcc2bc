use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use crate::{
    config::RelayConfig,
    registry::Registry,
    router::{self, Router},
    session::Hub,
    transport::{tcp, ws},
};

/// A bound relay: listeners are open, nothing is running yet.
pub struct Relay {
    hub: Hub,
    router: Router,
    tcp: Option<TcpListener>,
    ws: Option<TcpListener>,
}

impl Relay {
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let tcp = bind_listener(config.tcp_listen, "tcp").await?;
        let ws = bind_listener(config.ws_listen, "websocket").await?;

        let registry = Arc::new(Registry::new());
        let (publisher, router) = router::channel(
            Arc::clone(&registry),
            config.queue_capacity,
            config.write_timeout,
        );

        Ok(Self {
            hub: Hub::new(registry, publisher),
            router,
            tcp,
            ws,
        })
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.ws.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Runs the router and every listener until `shutdown` resolves, then
    /// stops accepting, drains the broadcast queue, and closes all clients.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Relay {
            hub,
            router,
            tcp: tcp_listener,
            ws: ws_listener,
        } = self;
        let (stop_tx, stop_rx) = watch::channel(false);

        let router_task = tokio::spawn(router.run_until(stopped(stop_rx.clone())));
        let tcp_task = tcp_listener.map(|listener| {
            tokio::spawn(tcp::serve(listener, hub.clone(), stopped(stop_rx.clone())))
        });
        let ws_task = ws_listener.map(|listener| {
            tokio::spawn(ws::serve(listener, hub.clone(), stopped(stop_rx.clone())))
        });

        shutdown.await;
        info!("relay shutting down");
        let _ = stop_tx.send(true);

        if let Some(task) = tcp_task {
            task.await.context("tcp listener task panicked")?;
        }
        if let Some(task) = ws_task {
            task.await
                .context("websocket listener task panicked")?
                .context("websocket listener failed")?;
        }
        router_task.await.context("router task panicked")?;

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn bind_listener(addr: Option<SocketAddr>, name: &str) -> Result<Option<TcpListener>> {
    let Some(addr) = addr else {
        return Ok(None);
    };
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {name} listener on {addr}"))?;
    Ok(Some(listener))
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    // An error means the relay itself is gone, which is a stop too.
    let _ = stop.wait_for(|stopping| *stopping).await;
}
