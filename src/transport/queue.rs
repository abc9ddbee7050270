//! FIFO hand-off between the transport's inbound-frame event and readers.
//!
//! One producer pushes frames; any number of consumers call `receive`. A frame
//! either satisfies the oldest waiting consumer or is buffered for the next
//! call. Waiters are served in the order they started waiting. A waiter whose
//! future was dropped is skipped. If it was dropped after a frame was handed
//! to it, the frame goes back to the head of the queue.

use crate::error::{constants, DistError, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Why the queue stopped accepting frames.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Closed {
    Graceful,
    Failed(String),
}

impl Closed {
    fn to_error(&self) -> DistError {
        match self {
            Closed::Graceful => DistError::ConnectionClosed,
            Closed::Failed(detail) => DistError::SocketError(detail.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<Bytes>,
    waiters: VecDeque<oneshot::Sender<Bytes>>,
    closed: Option<Closed>,
}

impl QueueState {
    /// Give `frame` to the oldest live waiter; returns it if there is none.
    fn hand_off(&mut self, mut frame: Bytes) -> Option<Bytes> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.send(frame) {
                Ok(()) => return None,
                // receiver dropped; try the next one
                Err(returned) => frame = returned,
            }
        }
        Some(frame)
    }
}

/// Receiving end of one pending `receive` call.
///
/// On drop, a frame that was sent but never taken is put back in front.
struct Waiter<'a> {
    queue: &'a ReceiveQueue,
    rx: oneshot::Receiver<Bytes>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        // after close() no further send can succeed
        self.rx.close();
        if let Ok(frame) = self.rx.try_recv() {
            if let Ok(mut state) = self.queue.lock() {
                debug!(len = frame.len(), "Requeueing frame from cancelled receive");
                if let Some(frame) = state.hand_off(frame) {
                    state.frames.push_front(frame);
                }
            }
        }
    }
}

/// Cloneable handle to a shared receive queue.
///
/// Unbounded unless built with [`ReceiveQueue::bounded`].
#[derive(Debug, Clone, Default)]
pub struct ReceiveQueue {
    state: Arc<Mutex<QueueState>>,
    limit: Option<usize>,
}

impl ReceiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that fails once more than `limit` frames sit unclaimed.
    pub fn bounded(limit: usize) -> Self {
        Self {
            state: Arc::default(),
            limit: Some(limit),
        }
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(limit) => Self::bounded(limit),
            None => Self::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| DistError::SocketError(constants::ERR_LOCK_POISONED.into()))
    }

    /// Hand a frame to the oldest live waiter, or buffer it.
    ///
    /// # Errors
    /// `ConnectionClosed`/`SocketError` if the queue was already closed. When
    /// the bound is exceeded the queue closes itself and the frame is refused.
    pub fn push(&self, frame: Bytes) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(closed) = &state.closed {
            return Err(closed.to_error());
        }

        let frame = match state.hand_off(frame) {
            Some(frame) => frame,
            None => return Ok(()),
        };

        if let Some(limit) = self.limit {
            if state.frames.len() >= limit {
                warn!(limit, "Receive queue bound exceeded, failing connection");
                let closed =
                    Closed::Failed(format!("{} ({limit} frames)", constants::ERR_QUEUE_FULL));
                let err = closed.to_error();
                state.closed = Some(closed);
                state.waiters.clear();
                return Err(err);
            }
        }

        state.frames.push_back(frame);
        Ok(())
    }

    /// Take the next frame, waiting if none is buffered.
    ///
    /// Buffered frames are still delivered after the queue is closed; once they
    /// are drained the close reason is returned.
    pub async fn receive(&self) -> Result<Bytes> {
        let mut waiter = {
            let mut state = self.lock()?;
            if let Some(frame) = state.frames.pop_front() {
                return Ok(frame);
            }
            if let Some(closed) = &state.closed {
                return Err(closed.to_error());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            Waiter { queue: self, rx }
        };

        match (&mut waiter.rx).await {
            Ok(frame) => Ok(frame),
            // sender dropped by close()
            Err(_) => {
                let state = self.lock()?;
                Err(state
                    .closed
                    .as_ref()
                    .map(Closed::to_error)
                    .unwrap_or(DistError::ConnectionClosed))
            }
        }
    }

    /// Stop accepting frames and wake every waiter with `ConnectionClosed`.
    pub fn close(&self) {
        self.close_with(Closed::Graceful);
    }

    /// Stop accepting frames and wake every waiter with `SocketError(detail)`.
    pub fn fail(&self, detail: impl Into<String>) {
        self.close_with(Closed::Failed(detail.into()));
    }

    fn close_with(&self, reason: Closed) {
        if let Ok(mut state) = self.lock() {
            if state.closed.is_none() {
                debug!(?reason, "Receive queue closed");
                state.closed = Some(reason);
            }
            state.waiters.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.closed.is_some()).unwrap_or(true)
    }

    /// Frames buffered and not yet claimed.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.frames.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumers currently suspended in `receive`, including ones whose
    /// future has been dropped but not yet skipped.
    pub fn waiting(&self) -> usize {
        self.lock().map(|s| s.waiters.len()).unwrap_or(0)
    }
}
