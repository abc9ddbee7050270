//! Application frames exchanged after the handshake.
//!
//! ```text
//! 131 'D' 0 {6, SenderPid, '', RegName} Payload
//! ```
//!
//! The payload is an already-encoded term without its own version byte.

use crate::core::term::{Pid, TermBuffer, TermReader};
use crate::error::{constants, DistError, Result};
use bytes::Bytes;

/// Control message opcode for a send to a registered name
pub const REG_SEND: u8 = 6;

/// Version, header, tuple header, opcode
const FRAME_OVERHEAD: usize = 1 + 2 + 2 + 2;

/// One inbound message, split but not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistMessage {
    control: Bytes,
    payload: Bytes,
}

impl DistMessage {
    pub fn new(control: Bytes, payload: Bytes) -> Self {
        Self { control, payload }
    }

    /// The encoded control tuple.
    pub fn control(&self) -> &Bytes {
        &self.control
    }

    /// Everything after the control message; may be empty.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.control, self.payload)
    }

    /// First element of the control tuple, e.g. [`REG_SEND`].
    ///
    /// # Errors
    /// `DecodeError` if the control message is not a tuple led by a small integer
    pub fn opcode(&self) -> Result<u8> {
        let mut reader = TermReader::new(&self.control);
        if reader.decode_tuple_header()? == 0 {
            return Err(DistError::DecodeError(
                constants::ERR_EMPTY_CONTROL_MESSAGE.into(),
            ));
        }
        reader.decode_small_integer()
    }
}

/// Build a REG_SEND frame from `sender` to the process registered as `to`.
pub fn encode_reg_send(sender: &Pid, to: &str, payload: &[u8]) -> Result<Bytes> {
    let mut buf = TermBuffer::with_capacity(
        FRAME_OVERHEAD + 3 + sender.node.len() + 12 + 2 + 2 + to.len() + payload.len(),
    );
    buf.encode_version();
    buf.encode_distribution_header();
    buf.encode_small_tuple_header(4);
    buf.encode_small_integer(REG_SEND);
    buf.encode_pid(sender)?;
    buf.encode_small_atom_utf8("")?;
    buf.encode_small_atom_utf8(to)?;
    buf.append(payload);
    Ok(buf.freeze())
}

/// Split a non-empty inbound frame into control message and payload.
///
/// Both halves share the frame's allocation.
///
/// # Errors
/// `DecodeError` on a missing version byte or header, a non-zero atom-cache
/// count, or a control message that does not parse
pub fn decode_frame(frame: Bytes) -> Result<DistMessage> {
    let (start, end) = {
        let mut reader = TermReader::new(&frame);
        reader.decode_version()?;
        if reader.decode_distribution_header()? != 0 {
            return Err(DistError::DecodeError(
                constants::ERR_ATOM_CACHE_UNSUPPORTED.into(),
            ));
        }
        if reader.remaining() == 0 {
            return Err(DistError::DecodeError(
                constants::ERR_EMPTY_CONTROL_MESSAGE.into(),
            ));
        }
        let start = reader.position();
        reader.skip()?;
        (start, reader.position())
    };
    Ok(DistMessage {
        control: frame.slice(start..end),
        payload: frame.slice(end..),
    })
}
