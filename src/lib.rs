//! # websocket-dist
//!
//! Joins an Erlang/OTP distribution cluster over a WebSocket instead of raw TCP.
//!
//! A [`Node`] carries the local identity (name, cookie, capability flags,
//! creation). [`Node::connect`] opens a WebSocket, runs the challenge/response
//! handshake, and yields an authenticated [`Connection`] for sending REG_SEND
//! messages and receiving inbound frames split into control message and payload.
//!
//! ## Layout
//! - [`core`]: capability flags, challenge digest, term codec primitives
//! - [`protocol`]: handshake and message wire formats
//! - [`transport`]: WebSocket and in-memory transports, receive queue
//! - [`service`]: `Node` and `Connection`
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::flags::DistFlags;
pub use crate::core::term::Pid;
pub use config::DistConfig;
pub use error::{DistError, Result};
pub use protocol::message::DistMessage;
pub use service::{Connection, Node};
pub use transport::Transport;
