//! Established, authenticated connection to one peer.

use crate::core::flags::DistFlags;
use crate::core::term::Pid;
use crate::error::{constants, DistError, Result};
use crate::protocol::handshake::PeerInfo;
use crate::protocol::message::{decode_frame, encode_reg_send, DistMessage};
use crate::service::node::NodeIdentity;
use crate::transport::Transport;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_optional_timeout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace, warn};

/// Connection that completed the handshake.
///
/// Only [`Node::connect`](crate::Node::connect) and
/// [`Node::connect_with`](crate::Node::connect_with) produce one, so every
/// value is authenticated. There is no reconnect; open a new one instead.
///
/// Dropping it closes the transport.
#[derive(Debug)]
pub struct Connection {
    local: Arc<NodeIdentity>,
    transport: Transport,
    peer: PeerInfo,
    receive_timeout: Option<Duration>,
    // fair lock; only its holder waits on the transport, so ticks cannot
    // reorder concurrent receivers
    reader: Mutex<()>,
}

impl Connection {
    pub(crate) fn new(
        local: Arc<NodeIdentity>,
        transport: Transport,
        peer: PeerInfo,
        receive_timeout: Option<Duration>,
    ) -> Self {
        global_metrics().connection_established();
        Self {
            local,
            transport,
            peer,
            receive_timeout,
            reader: Mutex::new(()),
        }
    }

    /// Transport address this connection was opened to.
    pub fn peer(&self) -> &str {
        self.transport.peer()
    }

    /// Verified node name of the peer.
    pub fn peer_name(&self) -> &str {
        &self.peer.name
    }

    /// Capabilities the peer advertised, with `MANDATORY_25_DIGEST` forced on.
    pub fn peer_flags(&self) -> DistFlags {
        self.peer.flags
    }

    pub fn peer_creation(&self) -> u32 {
        self.peer.creation
    }

    pub fn local_name(&self) -> &str {
        &self.local.name
    }

    /// Send `payload` to the process registered as `name` on the peer.
    ///
    /// `payload` must be an encoded term without a version byte. The frame is
    /// handed to the transport immediately; there is no acknowledgement.
    ///
    /// # Errors
    /// `EncodeError` for names over 255 bytes, `ConnectionClosed` or
    /// `SocketError` once the transport is gone
    pub fn send(&self, name: &str, payload: &[u8]) -> Result<()> {
        let sender = Pid::new(self.local.name.as_str(), 0, 0, self.local.creation);
        let frame = encode_reg_send(&sender, name, payload)?;
        let len = frame.len() as u64;
        self.transport.send_frame(frame)?;
        global_metrics().frame_sent(len);
        trace!(to = name, len, "REG_SEND written");
        Ok(())
    }

    /// Next application message from the peer.
    ///
    /// Keep-alive ticks are absorbed. Concurrent calls are served in the
    /// order they were made. The receive timeout, if configured, covers the
    /// whole call however many ticks arrive.
    ///
    /// Dropping the future before it completes, or hitting the timeout,
    /// fails the connection: the transport is closed and later calls return
    /// any frames already buffered, then `SocketError`.
    ///
    /// # Errors
    /// `DecodeError` for a malformed frame, `Timeout`, `ConnectionClosed` or
    /// `SocketError` when the transport ends
    #[instrument(skip(self), fields(peer = %self.peer.name))]
    pub async fn receive(&self) -> Result<DistMessage> {
        let mut pending = PendingReceive {
            transport: &self.transport,
            armed: true,
        };
        let result = with_optional_timeout(self.next_message(), self.receive_timeout).await;
        if !matches!(result, Err(DistError::Timeout)) {
            pending.armed = false;
        }
        result
    }

    async fn next_message(&self) -> Result<DistMessage> {
        let _turn = self.reader.lock().await;
        let metrics = global_metrics();
        loop {
            let frame = self.transport.recv_frame().await?;
            if frame.is_empty() {
                metrics.tick_absorbed();
                trace!("Tick");
                continue;
            }
            let len = frame.len() as u64;
            let message = decode_frame(frame).inspect_err(|e| {
                metrics.decode_error();
                debug!(error = %e, len, "Malformed frame");
            })?;
            metrics.frame_received(len);
            return Ok(message);
        }
    }

    /// Close the transport. Frames already received can still be read.
    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }
}

/// Fails the transport unless the `receive` that owns it finished.
struct PendingReceive<'a> {
    transport: &'a Transport,
    armed: bool,
}

impl Drop for PendingReceive<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(peer = %self.transport.peer(), "Receive abandoned, failing connection");
            global_metrics().connection_error();
            self.transport.fail(constants::ERR_RECEIVE_CANCELLED);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        global_metrics().connection_closed();
    }
}
