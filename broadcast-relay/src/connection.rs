use std::{fmt, net::SocketAddr, pin::Pin};

use futures::{Sink, Stream, StreamExt, stream::BoxStream};

use crate::{
    error::{ReadError, WriteError},
    message::Message,
};

/// Inbound half of a connection. The stream ending means the peer went away
/// cleanly.
pub type MessageStream = BoxStream<'static, Result<Message, ReadError>>;

/// Outbound half of a connection.
pub type MessageSink = Pin<Box<dyn Sink<Message, Error = WriteError> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    WebSocket,
    #[cfg(test)]
    Memory,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Tcp => "tcp",
            Transport::WebSocket => "ws",
            #[cfg(test)]
            Transport::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Who is on the other end of a connection, for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub transport: Transport,
    pub addr: Option<SocketAddr>,
}

impl Peer {
    pub fn new(transport: Transport, addr: Option<SocketAddr>) -> Self {
        Self { transport, addr }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "{}://{}", self.transport, addr),
            None => write!(f, "{}://unknown", self.transport),
        }
    }
}

/// A transport-agnostic connection, as produced by a listener adapter.
///
/// Framing is already done by the time a `Connection` exists: the source
/// yields decoded [`Message`]s and the sink accepts them.
pub struct Connection {
    pub(crate) peer: Peer,
    pub(crate) source: MessageStream,
    pub(crate) sink: MessageSink,
}

impl Connection {
    pub fn new<St, Si>(peer: Peer, source: St, sink: Si) -> Self
    where
        St: Stream<Item = Result<Message, ReadError>> + Send + 'static,
        Si: Sink<Message, Error = WriteError> + Send + 'static,
    {
        Self {
            peer,
            source: source.boxed(),
            sink: Box::pin(sink),
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
