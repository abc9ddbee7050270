//! WebSocket transport.
//!
//! Each distribution frame travels as one binary WebSocket message. Text
//! messages are never sent; inbound text is discarded. Ping/pong is answered by
//! `tokio-tungstenite` itself.

use crate::error::{constants, DistError, Result};
use crate::transport::{Outbound, ReceiveQueue, Transport};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, instrument, warn};

/// Default URL scheme when the peer is given as `host:port`
pub const DEFAULT_SCHEME: &str = "ws";

/// Turn a peer address into a WebSocket URL.
///
/// `host:port` becomes `{scheme}://host:port`; anything that already carries a
/// scheme is used as is.
pub fn peer_url(peer: &str, scheme: &str) -> Result<String> {
    let peer = peer.trim();
    if peer.is_empty() {
        return Err(DistError::SocketError(constants::ERR_EMPTY_PEER_ADDRESS.into()));
    }
    if peer.contains("://") {
        Ok(peer.to_string())
    } else {
        Ok(format!("{scheme}://{peer}"))
    }
}

/// Open a WebSocket to `peer` and start its reader and writer tasks.
///
/// Resolves once the upgrade has completed, i.e. the socket is open.
///
/// # Errors
/// `SocketError` if the TCP connection or the WebSocket upgrade fails
#[instrument(skip(queue_limit))]
pub async fn connect(peer: &str, scheme: &str, queue_limit: Option<usize>) -> Result<Transport> {
    let url = peer_url(peer, scheme)?;
    let (ws, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    info!(%url, status = %response.status(), "WebSocket open");
    Ok(spawn(peer, ws, queue_limit))
}

/// Wrap an already-upgraded WebSocket in a [`Transport`].
pub fn spawn<S>(peer: impl Into<String>, ws: S, queue_limit: Option<usize>) -> Transport
where
    S: Sink<Message, Error = WsError> + Stream<Item = std::result::Result<Message, WsError>>,
    S: Send + 'static,
{
    let peer = peer.into();
    let (mut sink, mut stream) = ws.split();
    let inbound = ReceiveQueue::with_limit(queue_limit);
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let writer_queue = inbound.clone();
    let writer_peer = peer.clone();
    let writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    if let Err(e) = sink.send(Message::Binary(frame.to_vec())).await {
                        warn!(peer = %writer_peer, error = %e, "WebSocket write failed");
                        writer_queue.fail(e.to_string());
                        return;
                    }
                }
                Outbound::Close => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(peer = %writer_peer, error = %e, "Close frame not sent");
                    }
                    let _ = sink.close().await;
                    return;
                }
            }
        }
    });

    let reader_queue = inbound.clone();
    let reader_peer = peer.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    if let Err(e) = reader_queue.push(Bytes::from(data)) {
                        debug!(peer = %reader_peer, error = %e, "Inbound frame refused");
                        return;
                    }
                }
                Ok(Message::Text(text)) => {
                    warn!(peer = %reader_peer, len = text.len(), "Discarding text frame");
                }
                Ok(Message::Close(frame)) => {
                    debug!(peer = %reader_peer, ?frame, "Peer closed WebSocket");
                    reader_queue.close();
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(peer = %reader_peer, error = %e, "WebSocket read failed");
                    reader_queue.fail(e.to_string());
                    return;
                }
            }
        }
        reader_queue.close();
    });

    Transport::new(peer, tx, inbound, vec![writer, reader])
}
