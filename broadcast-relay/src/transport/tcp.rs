//! Newline-delimited JSON over plain TCP.

use std::future::Future;

use futures::{sink, stream};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, warn};

use crate::{
    connection::{Connection, Peer, Transport},
    error::WriteError,
    message::{Message, read_message, write_message},
    session::Hub,
};

/// Wraps an accepted stream: one JSON object per line in each direction.
pub fn connection(stream: TcpStream) -> Connection {
    let peer = Peer::new(Transport::Tcp, stream.peer_addr().ok());
    let (reader, writer) = stream.into_split();

    let source = stream::unfold(BufReader::new(reader), |mut reader| async move {
        match read_message::<_, Message>(&mut reader).await {
            Ok(Some(message)) => Some((Ok(message), reader)),
            Ok(None) => None,
            Err(err) => Some((Err(err), reader)),
        }
    });

    let sink = sink::unfold(writer, |mut writer, message: Message| async move {
        write_message(&mut writer, &message).await?;
        Ok::<_, WriteError>(writer)
    });

    Connection::new(peer, source, sink)
}

/// Accepts connections until `shutdown` resolves, running one session task
/// per connection.
pub async fn serve<F>(listener: TcpListener, hub: Hub, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => spawn_session(stream, &hub),
                Err(err) => warn!(error = ?err, "failed to accept tcp connection"),
            },
        }
    }

    debug!("tcp listener stopped");
}

fn spawn_session(stream: TcpStream, hub: &Hub) {
    let hub = hub.clone();
    tokio::spawn(async move {
        let session = hub.session(connection(stream)).await;
        session.run().await;
    });
}
