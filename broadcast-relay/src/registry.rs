//! The set of live clients eligible to receive broadcasts.
//!
//! Every operation goes through one [`tokio::sync::Mutex`] that covers the
//! whole membership map. The router holds that lock for an entire fan-out
//! pass, so what it iterates is exactly the live set at that instant.

use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use futures::SinkExt;
use tokio::{
    sync::{Mutex, MutexGuard, oneshot},
    time::timeout,
};
use tracing::debug;

use crate::{
    connection::{MessageSink, Peer},
    error::WriteError,
    message::Message,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why the relay, rather than the peer, closed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A broadcast write to the peer failed or timed out.
    WriteFault,
    /// The relay is shutting down.
    Shutdown,
}

/// The registry's view of one client: its write side plus the signal that
/// stops the owning session's read loop.
pub struct ClientHandle {
    id: ClientId,
    peer: Peer,
    sink: MessageSink,
    closer: Option<oneshot::Sender<CloseReason>>,
}

impl ClientHandle {
    pub(crate) fn new(
        id: ClientId,
        peer: Peer,
        sink: MessageSink,
        closer: oneshot::Sender<CloseReason>,
    ) -> Self {
        Self {
            id,
            peer,
            sink,
            closer: Some(closer),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub(crate) async fn send(&mut self, message: Message) -> Result<(), WriteError> {
        self.sink.send(message).await
    }

    /// Tells the owning session to stop and closes the write side.
    pub(crate) async fn close(mut self, reason: CloseReason) {
        if let Some(closer) = self.closer.take() {
            // The session may already be gone.
            let _ = closer.send(reason);
        }
        self.release().await;
    }

    /// Closes the write side without signalling the session. Used by the
    /// session itself once its read loop is over.
    pub(crate) async fn release(mut self) {
        if let Err(error) = self.sink.close().await {
            debug!(peer = %self.peer, %error, "error while closing connection");
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Why [`Registry::add`] turned a handle away.
#[derive(Debug)]
pub enum Rejected {
    /// A handle with the same id is already registered; the new one was
    /// dropped.
    Duplicate,
    /// The registry has been shut down. The handle is given back so the
    /// caller can close it.
    Closed(ClientHandle),
}

pub(crate) type Members = HashMap<ClientId, ClientHandle>;

#[derive(Default)]
pub struct Registry {
    clients: Mutex<Members>,
    next_id: AtomicU64,
    // Only read or written while `clients` is locked.
    closed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ClientId {
        ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Inserts `handle`. A handle whose id is already registered is left
    /// untouched and the new one is dropped. Once [`close_all`] has run the
    /// registry admits nobody.
    ///
    /// [`close_all`]: Registry::close_all
    pub async fn add(&self, handle: ClientHandle) -> Result<(), Rejected> {
        let mut clients = self.clients.lock().await;
        if self.closed.load(Ordering::Relaxed) {
            return Err(Rejected::Closed(handle));
        }
        if clients.contains_key(&handle.id) {
            return Err(Rejected::Duplicate);
        }
        clients.insert(handle.id, handle);
        Ok(())
    }

    /// Removes the client if present. Closing its connection is left to the
    /// caller.
    pub async fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        self.clients.lock().await.remove(&id)
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// Ids of every member at one instant, sorted by id.
    pub async fn snapshot(&self) -> Vec<ClientId> {
        let clients = self.clients.lock().await;
        let mut ids: Vec<_> = clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Members> {
        self.clients.lock().await
    }

    /// Removes every member and closes each one, allowing `grace` per close.
    /// Later calls to [`add`](Registry::add) are rejected. Returns how many
    /// clients were closed.
    pub async fn close_all(&self, reason: CloseReason, grace: Duration) -> usize {
        let handles: Vec<_> = {
            let mut clients = self.clients.lock().await;
            self.closed.store(true, Ordering::Relaxed);
            clients.drain().map(|(_, handle)| handle).collect()
        };

        let count = handles.len();
        for handle in handles {
            let peer = handle.peer().clone();
            if timeout(grace, handle.close(reason)).await.is_err() {
                debug!(%peer, "gave up waiting for connection to close");
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connection::memory;

    fn handle(registry: &Registry) -> (ClientHandle, oneshot::Receiver<CloseReason>) {
        let (connection, _remote) = memory::pair();
        let (closer, closed) = oneshot::channel();
        let id = registry.next_id();
        (ClientHandle::new(id, connection.peer, connection.sink, closer), closed)
    }

    #[tokio::test]
    async fn add_is_a_no_op_for_a_known_id() {
        let registry = Registry::new();
        let (first, _closed) = handle(&registry);
        let id = first.id();
        let (connection, _remote) = memory::pair();
        let (closer, _closed_dup) = oneshot::channel();
        let duplicate = ClientHandle::new(id, connection.peer, connection.sink, closer);

        registry.add(first).await.expect("first add");
        assert!(matches!(
            registry.add(duplicate).await,
            Err(Rejected::Duplicate)
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn removing_an_absent_client_leaves_others_alone() {
        let registry = Registry::new();
        let (a, _a_closed) = handle(&registry);
        let (b, _b_closed) = handle(&registry);
        let (a_id, b_id) = (a.id(), b.id());
        registry.add(a).await.expect("add a");
        registry.add(b).await.expect("add b");

        assert!(registry.remove(a_id).await.is_some());
        assert!(registry.remove(a_id).await.is_none());

        assert_eq!(registry.snapshot().await, vec![b_id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_and_removes_settle_to_the_net_effect() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();

        for n in 0..64 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (handle, _closed) = handle(&registry);
                let id = handle.id();
                registry.add(handle).await.expect("add");
                // Every odd client leaves again.
                if n % 2 == 1 {
                    registry.remove(id).await;
                    None
                } else {
                    Some(id)
                }
            }));
        }

        let mut expected = Vec::new();
        for task in tasks {
            if let Some(id) = task.await.expect("task panicked") {
                expected.push(id);
            }
        }
        expected.sort_unstable();

        assert_eq!(registry.snapshot().await, expected);
    }

    #[tokio::test]
    async fn close_all_empties_the_registry_and_signals_sessions() {
        let registry = Registry::new();
        let (a, a_closed) = handle(&registry);
        let (b, b_closed) = handle(&registry);
        registry.add(a).await.expect("add a");
        registry.add(b).await.expect("add b");

        let closed = registry
            .close_all(CloseReason::Shutdown, Duration::from_secs(1))
            .await;

        assert_eq!(closed, 2);
        assert!(registry.is_empty().await);
        assert_eq!(a_closed.await, Ok(CloseReason::Shutdown));
        assert_eq!(b_closed.await, Ok(CloseReason::Shutdown));
    }

    #[tokio::test]
    async fn add_after_close_all_hands_the_client_back() {
        let registry = Registry::new();
        registry
            .close_all(CloseReason::Shutdown, Duration::from_secs(1))
            .await;

        let (late, _closed) = handle(&registry);
        let id = late.id();
        match registry.add(late).await {
            Err(Rejected::Closed(handle)) => assert_eq!(handle.id(), id),
            other => panic!("expected the closed registry to refuse, got {other:?}"),
        }
        assert!(registry.is_empty().await);
    }
}
