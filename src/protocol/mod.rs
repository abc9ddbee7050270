//! # Protocol Layer
//!
//! Wire formats of the distribution protocol.
//!
//! ## Components
//! - **Handshake**: name/status/challenge/reply/ack exchange and its state machine
//! - **Message**: REG_SEND frame building and inbound frame splitting

pub mod handshake;
pub mod message;
