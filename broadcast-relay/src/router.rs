//! Single-consumer broadcast queue and the fan-out loop that drains it.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{select, sync::mpsc, time::timeout};
use tracing::{debug, error, info};

use crate::{
    error::WriteError,
    message::Message,
    registry::{CloseReason, Registry},
};

/// Producer side of the broadcast queue. Cheap to clone; every session
/// holds one.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Message>,
}

impl Publisher {
    /// Enqueues `message` for broadcast. Waits while the queue is full and
    /// silently discards the message once the router has stopped.
    pub async fn publish(&self, message: Message) {
        if self.tx.send(message).await.is_err() {
            debug!("router stopped; dropping message");
        }
    }
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub evicted: usize,
}

pub struct Router {
    rx: mpsc::Receiver<Message>,
    registry: Arc<Registry>,
    write_timeout: Duration,
}

/// Creates the broadcast queue. `capacity` bounds how many messages may
/// wait for fan-out before publishers start waiting.
pub fn channel(
    registry: Arc<Registry>,
    capacity: usize,
    write_timeout: Duration,
) -> (Publisher, Router) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let router = Router {
        rx,
        registry,
        write_timeout,
    };
    (Publisher { tx }, router)
}

impl Router {
    /// Drains the queue until `shutdown` resolves or every publisher is gone.
    ///
    /// On shutdown the queue is closed, messages already enqueued are still
    /// fanned out, and then every registered client is closed.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                next = self.rx.recv() => match next {
                    Some(message) => {
                        self.fan_out(&message).await;
                    }
                    None => {
                        debug!("all publishers dropped; router exiting");
                        return;
                    }
                },
            }
        }

        self.rx.close();
        let mut drained = 0usize;
        while let Some(message) = self.rx.recv().await {
            self.fan_out(&message).await;
            drained += 1;
        }

        let closed = self
            .registry
            .close_all(CloseReason::Shutdown, self.write_timeout)
            .await;
        info!(drained, closed, "router stopped");
    }

    /// Writes `message` to every registered client, one at a time, holding
    /// the registry lock for the whole pass. Clients whose write fails are
    /// removed and closed before the lock is released.
    pub async fn fan_out(&self, message: &Message) -> FanOut {
        let mut clients = self.registry.lock().await;
        let mut report = FanOut::default();
        let mut dead = Vec::new();

        for (id, handle) in clients.iter_mut() {
            let result = match timeout(self.write_timeout, handle.send(message.clone())).await {
                Ok(result) => result,
                Err(_) => Err(WriteError::TimedOut(self.write_timeout)),
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    error!(
                        peer = %handle.peer(),
                        client = %id,
                        error = %err,
                        "failed to deliver message"
                    );
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            if let Some(handle) = clients.remove(&id) {
                if timeout(self.write_timeout, handle.close(CloseReason::WriteFault))
                    .await
                    .is_err()
                {
                    debug!(client = %id, "gave up waiting for evicted connection to close");
                }
                report.evicted += 1;
            }
        }

        debug!(
            text = %message.text,
            delivered = report.delivered,
            evicted = report.evicted,
            "fan-out pass complete"
        );
        report
    }
}
