//! Per-connection lifecycle.
//!
//! A session moves through `Connecting → Registered → ReadLoop → Closing →
//! Closed`. It is constructed (and registered) by [`Hub::session`], reads
//! until the peer leaves, a read fails, or the relay closes it, and always
//! finishes by taking itself out of the registry.

use std::sync::Arc;

use futures::StreamExt;
use tokio::{select, sync::oneshot};
use tracing::{debug, error, info};

use crate::{
    connection::{Connection, MessageStream, Peer},
    error::ReadError,
    message::Message,
    registry::{ClientHandle, ClientId, CloseReason, Registry, Rejected},
    router::Publisher,
};

/// What listener adapters hold: the registry plus the router's publisher.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<Registry>,
    publisher: Publisher,
}

impl Hub {
    pub fn new(registry: Arc<Registry>, publisher: Publisher) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers the connection's write side and returns the session that
    /// owns its read side.
    pub async fn session(&self, connection: Connection) -> Session {
        let Connection { peer, source, sink } = connection;
        let id = self.registry.next_id();
        let (closer, closed) = oneshot::channel();

        let handle = ClientHandle::new(id, peer.clone(), sink, closer);
        match self.registry.add(handle).await {
            Ok(()) => info!(%peer, client = %id, "client connected"),
            // The relay stopped while this connection was being accepted;
            // the session ends as soon as it runs.
            Err(Rejected::Closed(handle)) => {
                info!(%peer, client = %id, "relay is shutting down, closing new client");
                handle.close(CloseReason::Shutdown).await;
            }
            Err(Rejected::Duplicate) => error!(%peer, client = %id, "client id already registered"),
        }

        Session {
            id,
            peer,
            source,
            closed,
            registry: Arc::clone(&self.registry),
            publisher: self.publisher.clone(),
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the connection.
    Disconnected,
    /// Reading from the peer failed.
    ReadFault(ReadError),
    /// The relay closed the connection.
    Closed(CloseReason),
}

pub struct Session {
    id: ClientId,
    peer: Peer,
    source: MessageStream,
    closed: oneshot::Receiver<CloseReason>,
    registry: Arc<Registry>,
    publisher: Publisher,
}

enum Event {
    Read(Option<Result<Message, ReadError>>),
    Closed(CloseReason),
}

impl Session {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Runs the read loop to completion and cleans up after it.
    pub async fn run(mut self) -> SessionEnd {
        let end = self.read_loop().await;

        let (peer, id) = (&self.peer, self.id);
        match &end {
            SessionEnd::Disconnected => info!(%peer, client = %id, "client disconnected"),
            SessionEnd::ReadFault(err) => {
                error!(%peer, client = %id, error = %err, "failed to read from client");
            }
            SessionEnd::Closed(reason) => {
                debug!(%peer, client = %id, ?reason, "connection closed by relay");
            }
        }

        if let Some(handle) = self.registry.remove(id).await {
            handle.release().await;
        }

        end
    }

    async fn read_loop(&mut self) -> SessionEnd {
        loop {
            let event = select! {
                reason = &mut self.closed => {
                    // A dropped closer means the handle left the registry
                    // without an explicit reason, which only eviction does.
                    Event::Closed(reason.unwrap_or(CloseReason::WriteFault))
                }
                next = self.source.next() => Event::Read(next),
            };

            match event {
                Event::Read(Some(Ok(message))) => self.publisher.publish(message).await,
                Event::Read(Some(Err(err))) => return SessionEnd::ReadFault(err),
                Event::Read(None) => return SessionEnd::Disconnected,
                Event::Closed(reason) => return SessionEnd::Closed(reason),
            }
        }
    }
}
