//! # Transport Layer
//!
//! A full-duplex, message-oriented byte channel to one peer.
//!
//! Both backends produce the same [`Transport`] handle: writes go through an
//! unbounded channel to a writer (so `send_frame` never suspends), and inbound
//! frames land in a [`ReceiveQueue`] fed by the reader.
//!
//! ## Backends
//! - **WebSocket**: binary WebSocket messages via `tokio-tungstenite`
//! - **Memory**: in-process pair for loopback use and tests
//!
//! Dropping a `Transport` aborts its I/O tasks and closes the queue, which
//! releases any reader suspended in `recv_frame`.

pub mod memory;
pub mod queue;
pub mod websocket;

pub use queue::ReceiveQueue;

use crate::error::{constants, DistError, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Instruction for the writer side of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Bytes),
    Close,
}

/// Open connection to a peer.
#[derive(Debug)]
pub struct Transport {
    peer: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: ReceiveQueue,
    tasks: Vec<JoinHandle<()>>,
    closed: AtomicBool,
}

impl Transport {
    pub(crate) fn new(
        peer: String,
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: ReceiveQueue,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            peer,
            outbound,
            inbound,
            tasks,
            closed: AtomicBool::new(false),
        }
    }

    /// Address this transport was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue a frame for writing. Never waits.
    ///
    /// # Errors
    /// `ConnectionClosed` once the transport was closed or its writer is gone.
    pub fn send_frame(&self, frame: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DistError::ConnectionClosed);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| DistError::SocketError(constants::ERR_TRANSPORT_CLOSED.into()))
    }

    /// Next inbound frame, in arrival order.
    pub async fn recv_frame(&self) -> Result<Bytes> {
        self.inbound.receive().await
    }

    /// Ask the writer to close the socket and stop accepting inbound frames.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(peer = %self.peer, "Closing transport");
            let _ = self.outbound.send(Outbound::Close);
            self.inbound.close();
        }
    }

    /// Close like [`close`](Self::close), but readers see
    /// `SocketError(detail)` once buffered frames are drained.
    pub fn fail(&self, detail: impl Into<String>) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let detail = detail.into();
            debug!(peer = %self.peer, %detail, "Failing transport");
            let _ = self.outbound.send(Outbound::Close);
            self.inbound.fail(detail);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.inbound.is_closed()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.inbound.close();
        for task in &self.tasks {
            task.abort();
        }
    }
}
