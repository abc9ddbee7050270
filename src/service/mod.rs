//! # Service Layer
//!
//! The user-facing API: a [`Node`] identity that opens authenticated
//! [`Connection`]s.
//!
//! ## Example
//! ```rust,no_run
//! use websocket_dist::{Node, Result};
//!
//! # async fn run() -> Result<()> {
//! let node = Node::new("client@localhost", "cookie");
//! let conn = node.connect("localhost:8080", "server@localhost").await?;
//! conn.send("echo", &[100, 0, 2, b'h', b'i'])?;
//! let message = conn.receive().await?;
//! println!("opcode {}", message.opcode()?);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod node;

pub use connection::Connection;
pub use node::{Cookie, Node, NodeIdentity};
