//! # Error Types
//!
//! Error handling for the distribution connection engine.
//!
//! Every failure aborts the operation in progress (`connect` or `receive`) and is
//! surfaced to the caller. None are retried inside the engine; the only thing
//! `receive` absorbs silently is the empty keep-alive tick, which is not an error.
//!
//! ## Error Categories
//! - **Transport Errors**: the socket failed to open, errored, or closed
//! - **Handshake Errors**: tag mismatches, rejected status, missing capabilities,
//!   wrong peer identity, failed digest check
//! - **Frame Errors**: malformed post-handshake frames or unsupported features
//! - **Configuration Errors**: invalid or unreadable settings
//!
//! Error text never contains the cookie or any digest.
//!
//! ## Example Usage
//! ```rust
//! use websocket_dist::error::{DistError, Result};
//! use tracing::{info, error};
//!
//! fn check_status(status: &str) -> Result<()> {
//!     if status == "ok" {
//!         Ok(())
//!     } else {
//!         Err(DistError::StatusRejected(status.to_string()))
//!     }
//! }
//!
//! fn main() {
//!     match check_status("not_allowed") {
//!         Ok(()) => info!("accepted"),
//!         Err(e) => error!(error = %e, "Peer refused the connection"),
//!     }
//! }
//! ```

use crate::core::flags::DistFlags;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Transport errors
    pub const ERR_TRANSPORT_CLOSED: &str = "Transport closed before the frame could be written";
    pub const ERR_EMPTY_PEER_ADDRESS: &str = "Peer address cannot be empty";
    pub const ERR_QUEUE_FULL: &str = "Receive queue bound exceeded";
    pub const ERR_RECEIVE_CANCELLED: &str = "Receive cancelled before completion";

    /// Frame decoding errors
    pub const ERR_TRUNCATED_TERM: &str = "Term truncated";
    pub const ERR_BAD_VERSION: &str = "Missing external term format version byte";
    pub const ERR_BAD_DIST_HEADER: &str = "Missing distribution header";
    pub const ERR_ATOM_CACHE_UNSUPPORTED: &str = "Atom cache references are not supported";
    pub const ERR_EMPTY_CONTROL_MESSAGE: &str = "Frame carries no control message";

    /// Encoding errors
    pub const ERR_ATOM_TOO_LONG: &str = "Atom exceeds 255 bytes";

    /// Configuration errors
    pub const ERR_LOGGING_INIT: &str = "Global tracing subscriber already installed";
    pub const ERR_COOKIE_NOT_FOUND: &str = "No cookie configured and no cookie file found";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// Everything that can go wrong while opening, authenticating, or using a
/// distribution connection.
#[derive(Error, Debug)]
pub enum DistError {
    /// The transport failed to open or errored while open.
    #[error("Socket error: {0}")]
    SocketError(String),

    /// A handshake frame's leading tag byte did not match the expected step.
    #[error("Protocol error")]
    ProtocolError,

    /// The peer answered send-name with something other than `ok`.
    #[error("Peer rejected connection with status '{0}'")]
    StatusRejected(String),

    /// The peer does not advertise a capability this implementation requires.
    #[error("Peer is missing required capability: {0:?}")]
    ChallengeMissing(DistFlags),

    /// The peer identified itself with a name other than the one requested.
    #[error("Wrong peer name: {0}")]
    WrongPeerName(String),

    /// The challenge frame did not carry the node-type tag.
    #[error("Unexpected peer type")]
    UnexpectedPeerType,

    /// The challenge acknowledgement digest did not match.
    #[error("Peer authentication error")]
    PeerAuthenticationError,

    /// A post-handshake frame was malformed or used unsupported features.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A term could not be encoded.
    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for DistError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        DistError::SocketError(err.to_string())
    }
}

/// Type alias for Results using DistError
pub type Result<T> = std::result::Result<T, DistError>;
