//! In-process transport.
//!
//! [`pair`] returns a [`Transport`] plus the [`MemoryPeer`] that plays the
//! remote side: it sees every frame written by the local side and can inject
//! inbound frames. Useful for running the handshake against a scripted peer or
//! bridging to a socket the caller manages itself.

use crate::error::Result;
use crate::transport::{Outbound, ReceiveQueue, Transport};
use bytes::Bytes;
use tokio::sync::mpsc;

/// Remote end of an in-memory transport.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: ReceiveQueue,
    closed_by_local: bool,
}

/// Create a connected transport/peer pair.
pub fn pair(peer: impl Into<String>) -> (Transport, MemoryPeer) {
    pair_with_limit(peer, None)
}

/// Like [`pair`] with a bound on unclaimed inbound frames.
pub fn pair_with_limit(peer: impl Into<String>, limit: Option<usize>) -> (Transport, MemoryPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let inbound = ReceiveQueue::with_limit(limit);
    let transport = Transport::new(peer.into(), tx, inbound.clone(), Vec::new());
    let peer = MemoryPeer {
        outbound: rx,
        inbound,
        closed_by_local: false,
    };
    (transport, peer)
}

impl MemoryPeer {
    /// Inject a frame as if it had arrived from the network.
    pub fn deliver(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.inbound.push(frame.into())
    }

    /// Next frame written by the local side.
    ///
    /// `None` once the local side closed or dropped its transport.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        if self.closed_by_local {
            return None;
        }
        match self.outbound.recv().await? {
            Outbound::Frame(frame) => Some(frame),
            Outbound::Close => {
                self.closed_by_local = true;
                None
            }
        }
    }

    /// Like [`next_frame`](Self::next_frame) without waiting.
    pub fn try_next_frame(&mut self) -> Option<Bytes> {
        if self.closed_by_local {
            return None;
        }
        match self.outbound.try_recv().ok()? {
            Outbound::Frame(frame) => Some(frame),
            Outbound::Close => {
                self.closed_by_local = true;
                None
            }
        }
    }

    /// True once the local side sent a close.
    pub fn closed_by_local(&self) -> bool {
        self.closed_by_local
    }

    /// Simulate the remote side closing the connection cleanly.
    pub fn disconnect(&self) {
        self.inbound.close();
    }

    /// Simulate a transport failure.
    pub fn fail(&self, detail: impl Into<String>) {
        self.inbound.fail(detail);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::DistError;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut peer) = pair("memory");
        transport.send_frame(Bytes::from_static(b"out")).unwrap();
        assert_eq!(peer.next_frame().await.unwrap(), Bytes::from_static(b"out"));

        peer.deliver(Bytes::from_static(b"in")).unwrap();
        assert_eq!(transport.recv_frame().await.unwrap(), Bytes::from_static(b"in"));
    }

    #[tokio::test]
    async fn test_close_is_observed_by_peer() {
        let (transport, mut peer) = pair("memory");
        transport.close();
        assert!(peer.next_frame().await.is_none());
        assert!(peer.closed_by_local());
        assert!(matches!(
            transport.send_frame(Bytes::new()),
            Err(DistError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_drop_ends_peer_stream() {
        let (transport, mut peer) = pair("memory");
        drop(transport);
        assert!(peer.next_frame().await.is_none());
        assert!(peer.deliver(Bytes::new()).is_err());
    }

    #[tokio::test]
    async fn test_peer_failure_reaches_reader() {
        let (transport, peer) = pair("memory");
        peer.fail("boom");
        assert!(matches!(
            transport.recv_frame().await,
            Err(DistError::SocketError(ref d)) if d == "boom"
        ));
    }
}
