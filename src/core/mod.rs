//! # Core Protocol Components
//!
//! Low-level building blocks shared by the handshake and the messaging path.
//!
//! ## Components
//! - **Flags**: 64-bit capability bitmask with named protocol bits
//! - **Digest**: MD5 challenge digest and constant-time verification
//! - **Term**: external term format encoder and cursor-based decoder
//!
//! ## Wire Format
//! Application frames after the handshake:
//! ```text
//! [Version(131)] ['D'(68)] [AtomCacheRefs(0)] [ControlMessage] [Payload]
//! ```

pub mod digest;
pub mod flags;
pub mod term;
