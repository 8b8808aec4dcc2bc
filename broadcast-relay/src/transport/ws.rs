//! WebSocket listener: `GET /ws`, one JSON message per frame.

use std::{future::Future, io, net::SocketAddr};

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message as Frame, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt, future, stream};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    connection::{Connection, Peer, Transport},
    error::{ReadError, WriteError},
    message::{self, MAX_FRAME_BYTES, Message},
    session::Hub,
};

pub fn router(hub: Hub) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

/// Serves the WebSocket route until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, hub: Hub, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(hub).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn upgrade(
    State(hub): State<Hub>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| async move {
            let session = hub.session(connection(socket, Some(addr))).await;
            session.run().await;
        })
}

/// Wraps an upgraded socket. Text frames carry JSON; binary frames are
/// accepted when they hold UTF-8 JSON. A close frame ends the stream.
pub fn connection(socket: WebSocket, addr: Option<SocketAddr>) -> Connection {
    let peer = Peer::new(Transport::WebSocket, addr);
    let (frames_out, frames_in) = socket.split();

    let source = stream::unfold(frames_in, |mut frames| async move {
        loop {
            let frame = match frames.next().await? {
                Ok(frame) => frame,
                Err(err) => return Some((Err(ReadError::from(err)), frames)),
            };
            let item = match frame {
                Frame::Text(text) => message::decode(&text),
                Frame::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => message::decode(text),
                    Err(_) => Err(ReadError::Unsupported("binary frame is not utf-8")),
                },
                Frame::Close(_) => return None,
                // Pings are answered by the socket itself.
                Frame::Ping(_) | Frame::Pong(_) => continue,
            };
            return Some((item, frames));
        }
    });

    let sink = frames_out
        .sink_map_err(WriteError::from)
        .with(|message: Message| future::ready(message::encode(&message).map(Frame::Text)));

    Connection::new(peer, source, sink)
}
