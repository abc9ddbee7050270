//! # External Term Format Boundary
//!
//! The handful of term primitives the connection engine needs: enough to build
//! a control message and to split an inbound frame into its control message
//! and payload. Payload terms are never interpreted here.
//!
//! ## Encoding
//! `TermBuffer` appends tagged terms to a growable buffer.
//!
//! ## Decoding
//! `TermReader` is a cursor over a borrowed slice. `skip` advances past one
//! complete term of any tag without decoding it, so the caller can cut the
//! frame at the returned position.
//!
//! ## Security
//! - Every length is checked against the remaining input before it is used
//! - `skip` is iterative; deeply nested input cannot exhaust the stack
//! - A declared element count larger than the remaining bytes fails early

use crate::error::{constants, DistError, Result};
use bytes::{BufMut, Bytes, BytesMut};

pub const VERSION_MAGIC: u8 = 131;
pub const DIST_HEADER: u8 = 68;

pub const NEW_FLOAT_EXT: u8 = 70;
pub const BIT_BINARY_EXT: u8 = 77;
pub const ATOM_CACHE_REF: u8 = 82;
pub const NEW_PID_EXT: u8 = 88;
pub const NEW_PORT_EXT: u8 = 89;
pub const NEWER_REFERENCE_EXT: u8 = 90;
pub const SMALL_INTEGER_EXT: u8 = 97;
pub const INTEGER_EXT: u8 = 98;
pub const FLOAT_EXT: u8 = 99;
pub const ATOM_EXT: u8 = 100;
pub const REFERENCE_EXT: u8 = 101;
pub const PORT_EXT: u8 = 102;
pub const PID_EXT: u8 = 103;
pub const SMALL_TUPLE_EXT: u8 = 104;
pub const LARGE_TUPLE_EXT: u8 = 105;
pub const NIL_EXT: u8 = 106;
pub const STRING_EXT: u8 = 107;
pub const LIST_EXT: u8 = 108;
pub const BINARY_EXT: u8 = 109;
pub const SMALL_BIG_EXT: u8 = 110;
pub const LARGE_BIG_EXT: u8 = 111;
pub const NEW_FUN_EXT: u8 = 112;
pub const EXPORT_EXT: u8 = 113;
pub const NEW_REFERENCE_EXT: u8 = 114;
pub const SMALL_ATOM_EXT: u8 = 115;
pub const MAP_EXT: u8 = 116;
pub const FUN_EXT: u8 = 117;
pub const ATOM_UTF8_EXT: u8 = 118;
pub const SMALL_ATOM_UTF8_EXT: u8 = 119;
pub const V4_PORT_EXT: u8 = 120;

/// Process identifier naming the logical sender of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pid {
    pub node: String,
    pub id: u32,
    pub serial: u32,
    pub creation: u32,
}

impl Pid {
    pub fn new(node: impl Into<String>, id: u32, serial: u32, creation: u32) -> Self {
        Self {
            node: node.into(),
            id,
            serial,
            creation,
        }
    }
}

/// Append-only term encoder.
#[derive(Debug, Default)]
pub struct TermBuffer {
    buf: BytesMut,
}

impl TermBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn encode_version(&mut self) {
        self.buf.put_u8(VERSION_MAGIC);
    }

    /// Normal distribution header declaring zero atom-cache references.
    pub fn encode_distribution_header(&mut self) {
        self.buf.put_u8(DIST_HEADER);
        self.buf.put_u8(0);
    }

    pub fn encode_small_tuple_header(&mut self, arity: u8) {
        self.buf.put_u8(SMALL_TUPLE_EXT);
        self.buf.put_u8(arity);
    }

    pub fn encode_small_integer(&mut self, value: u8) {
        self.buf.put_u8(SMALL_INTEGER_EXT);
        self.buf.put_u8(value);
    }

    /// # Errors
    /// Returns `DistError::EncodeError` if the atom is longer than 255 bytes
    pub fn encode_small_atom_utf8(&mut self, atom: &str) -> Result<()> {
        let len = u8::try_from(atom.len())
            .map_err(|_| DistError::EncodeError(constants::ERR_ATOM_TOO_LONG.into()))?;
        self.buf.put_u8(SMALL_ATOM_UTF8_EXT);
        self.buf.put_u8(len);
        self.buf.put_slice(atom.as_bytes());
        Ok(())
    }

    /// Encode as NEW_PID_EXT with a 32-bit creation.
    pub fn encode_pid(&mut self, pid: &Pid) -> Result<()> {
        self.buf.put_u8(NEW_PID_EXT);
        self.encode_small_atom_utf8(&pid.node)?;
        self.buf.put_u32(pid.id);
        self.buf.put_u32(pid.serial);
        self.buf.put_u32(pid.creation);
        Ok(())
    }

    /// Append already-encoded bytes verbatim.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor-based term decoder over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct TermReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TermReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes from the cursor to the end of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn truncated() -> DistError {
        DistError::DecodeError(constants::ERR_TRUNCATED_TERM.into())
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or_else(Self::truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Self::truncated());
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn advance(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn decode_version(&mut self) -> Result<u8> {
        match self.read_u8()? {
            VERSION_MAGIC => Ok(VERSION_MAGIC),
            _ => Err(DistError::DecodeError(constants::ERR_BAD_VERSION.into())),
        }
    }

    /// Read a normal distribution header and return its atom-cache count.
    ///
    /// Only the count is consumed. Callers must reject a non-zero count since
    /// the cache flags and entries that would follow are not parsed.
    pub fn decode_distribution_header(&mut self) -> Result<u8> {
        match self.read_u8()? {
            DIST_HEADER => self.read_u8(),
            _ => Err(DistError::DecodeError(constants::ERR_BAD_DIST_HEADER.into())),
        }
    }

    /// Small or large tuple header, returning the arity.
    pub fn decode_tuple_header(&mut self) -> Result<u32> {
        match self.read_u8()? {
            SMALL_TUPLE_EXT => Ok(u32::from(self.read_u8()?)),
            LARGE_TUPLE_EXT => self.read_u32(),
            tag => Err(DistError::DecodeError(format!(
                "Expected tuple, found tag {tag}"
            ))),
        }
    }

    pub fn decode_small_integer(&mut self) -> Result<u8> {
        match self.read_u8()? {
            SMALL_INTEGER_EXT => self.read_u8(),
            tag => Err(DistError::DecodeError(format!(
                "Expected small integer, found tag {tag}"
            ))),
        }
    }

    /// Any of the four atom encodings, returned as a string.
    ///
    /// Latin-1 atoms are widened byte by byte.
    pub fn decode_atom(&mut self) -> Result<String> {
        let tag = self.read_u8()?;
        let (bytes, utf8) = match tag {
            SMALL_ATOM_UTF8_EXT => {
                let len = usize::from(self.read_u8()?);
                (self.read_bytes(len)?, true)
            }
            ATOM_UTF8_EXT => {
                let len = usize::from(self.read_u16()?);
                (self.read_bytes(len)?, true)
            }
            SMALL_ATOM_EXT => {
                let len = usize::from(self.read_u8()?);
                (self.read_bytes(len)?, false)
            }
            ATOM_EXT => {
                let len = usize::from(self.read_u16()?);
                (self.read_bytes(len)?, false)
            }
            ATOM_CACHE_REF => {
                return Err(DistError::DecodeError(
                    constants::ERR_ATOM_CACHE_UNSUPPORTED.into(),
                ))
            }
            tag => {
                return Err(DistError::DecodeError(format!(
                    "Expected atom, found tag {tag}"
                )))
            }
        };
        if utf8 {
            String::from_utf8(bytes.to_vec())
                .map_err(|e| DistError::DecodeError(format!("Atom is not UTF-8: {e}")))
        } else {
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }

    /// PID_EXT or NEW_PID_EXT.
    pub fn decode_pid(&mut self) -> Result<Pid> {
        let tag = self.read_u8()?;
        if tag != NEW_PID_EXT && tag != PID_EXT {
            return Err(DistError::DecodeError(format!(
                "Expected pid, found tag {tag}"
            )));
        }
        let node = self.decode_atom()?;
        let id = self.read_u32()?;
        let serial = self.read_u32()?;
        let creation = if tag == NEW_PID_EXT {
            self.read_u32()?
        } else {
            u32::from(self.read_u8()?)
        };
        Ok(Pid {
            node,
            id,
            serial,
            creation,
        })
    }

    fn skip_atom(&mut self) -> Result<()> {
        match self.read_u8()? {
            SMALL_ATOM_UTF8_EXT | SMALL_ATOM_EXT => {
                let len = usize::from(self.read_u8()?);
                self.advance(len)
            }
            ATOM_UTF8_EXT | ATOM_EXT => {
                let len = usize::from(self.read_u16()?);
                self.advance(len)
            }
            ATOM_CACHE_REF => Err(DistError::DecodeError(
                constants::ERR_ATOM_CACHE_UNSUPPORTED.into(),
            )),
            tag => Err(DistError::DecodeError(format!(
                "Expected atom, found tag {tag}"
            ))),
        }
    }

    /// Advance the cursor past exactly one complete term.
    ///
    /// On error the cursor position is unspecified.
    pub fn skip(&mut self) -> Result<()> {
        // terms still to be skipped; every term occupies at least one byte
        let mut pending: usize = 1;

        while pending > 0 {
            pending -= 1;
            let tag = self.read_u8()?;
            let children: usize = match tag {
                SMALL_INTEGER_EXT => {
                    self.advance(1)?;
                    0
                }
                INTEGER_EXT => {
                    self.advance(4)?;
                    0
                }
                FLOAT_EXT => {
                    self.advance(31)?;
                    0
                }
                NEW_FLOAT_EXT => {
                    self.advance(8)?;
                    0
                }
                SMALL_ATOM_UTF8_EXT | SMALL_ATOM_EXT => {
                    let len = usize::from(self.read_u8()?);
                    self.advance(len)?;
                    0
                }
                ATOM_UTF8_EXT | ATOM_EXT => {
                    let len = usize::from(self.read_u16()?);
                    self.advance(len)?;
                    0
                }
                NIL_EXT => 0,
                STRING_EXT => {
                    let len = usize::from(self.read_u16()?);
                    self.advance(len)?;
                    0
                }
                BINARY_EXT => {
                    let len = self.read_u32()? as usize;
                    self.advance(len)?;
                    0
                }
                BIT_BINARY_EXT => {
                    let len = self.read_u32()? as usize;
                    self.advance(1)?;
                    self.advance(len)?;
                    0
                }
                SMALL_BIG_EXT => {
                    let len = usize::from(self.read_u8()?);
                    self.advance(1 + len)?;
                    0
                }
                LARGE_BIG_EXT => {
                    let len = self.read_u32()? as usize;
                    self.advance(1)?;
                    self.advance(len)?;
                    0
                }
                SMALL_TUPLE_EXT => usize::from(self.read_u8()?),
                LARGE_TUPLE_EXT => self.read_u32()? as usize,
                // elements followed by the tail
                LIST_EXT => (self.read_u32()? as usize).saturating_add(1),
                MAP_EXT => (self.read_u32()? as usize).saturating_mul(2),
                PID_EXT => {
                    self.skip_atom()?;
                    self.advance(9)?;
                    0
                }
                NEW_PID_EXT => {
                    self.skip_atom()?;
                    self.advance(12)?;
                    0
                }
                PORT_EXT => {
                    self.skip_atom()?;
                    self.advance(5)?;
                    0
                }
                NEW_PORT_EXT => {
                    self.skip_atom()?;
                    self.advance(8)?;
                    0
                }
                V4_PORT_EXT => {
                    self.skip_atom()?;
                    self.advance(12)?;
                    0
                }
                REFERENCE_EXT => {
                    self.skip_atom()?;
                    self.advance(5)?;
                    0
                }
                NEW_REFERENCE_EXT => {
                    let words = usize::from(self.read_u16()?);
                    self.skip_atom()?;
                    self.advance(1 + 4 * words)?;
                    0
                }
                NEWER_REFERENCE_EXT => {
                    let words = usize::from(self.read_u16()?);
                    self.skip_atom()?;
                    self.advance(4 + 4 * words)?;
                    0
                }
                // module, function, arity
                EXPORT_EXT => 3,
                NEW_FUN_EXT => {
                    // size counts itself
                    let size = self.read_u32()? as usize;
                    let body = size.checked_sub(4).ok_or_else(|| {
                        DistError::DecodeError("NEW_FUN_EXT size too small".into())
                    })?;
                    self.advance(body)?;
                    0
                }
                // pid, module, index, uniq, then the free variables
                FUN_EXT => (self.read_u32()? as usize).saturating_add(4),
                ATOM_CACHE_REF => {
                    return Err(DistError::DecodeError(
                        constants::ERR_ATOM_CACHE_UNSUPPORTED.into(),
                    ))
                }
                tag => {
                    return Err(DistError::DecodeError(format!(
                        "Unknown term tag {tag}"
                    )))
                }
            };

            pending = pending.saturating_add(children);
            if pending > self.remaining() {
                return Err(Self::truncated());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip_len(bytes: &[u8]) -> Result<usize> {
        let mut reader = TermReader::new(bytes);
        reader.skip()?;
        Ok(reader.position())
    }

    #[test]
    fn test_encode_small_atom() {
        let mut buf = TermBuffer::new();
        buf.encode_small_atom_utf8("foo").unwrap();
        assert_eq!(buf.as_slice(), &[SMALL_ATOM_UTF8_EXT, 3, b'f', b'o', b'o']);
    }

    #[test]
    fn test_atom_too_long() {
        let mut buf = TermBuffer::new();
        let long = "a".repeat(256);
        assert!(matches!(
            buf.encode_small_atom_utf8(&long),
            Err(DistError::EncodeError(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_pid_layout() {
        let mut buf = TermBuffer::new();
        buf.encode_pid(&Pid::new("a@b", 1, 2, 3)).unwrap();
        assert_eq!(
            buf.as_slice(),
            &[
                NEW_PID_EXT,
                SMALL_ATOM_UTF8_EXT,
                3,
                b'a',
                b'@',
                b'b',
                0,
                0,
                0,
                1,
                0,
                0,
                0,
                2,
                0,
                0,
                0,
                3
            ]
        );
        let mut reader = TermReader::new(buf.as_slice());
        assert_eq!(reader.decode_pid().unwrap(), Pid::new("a@b", 1, 2, 3));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_skip_scalars() {
        assert_eq!(skip_len(&[SMALL_INTEGER_EXT, 5, 0xFF]).unwrap(), 2);
        assert_eq!(skip_len(&[INTEGER_EXT, 0, 0, 1, 0]).unwrap(), 5);
        assert_eq!(skip_len(&[NIL_EXT]).unwrap(), 1);
        assert_eq!(skip_len(&[NEW_FLOAT_EXT, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap(), 9);
        assert_eq!(skip_len(&[BINARY_EXT, 0, 0, 0, 2, 7, 7, 9]).unwrap(), 7);
        assert_eq!(skip_len(&[STRING_EXT, 0, 2, b'h', b'i']).unwrap(), 5);
    }

    #[test]
    fn test_skip_nested() {
        // {[1, 2], #{a => 1}}
        let bytes = [
            SMALL_TUPLE_EXT,
            2,
            LIST_EXT,
            0,
            0,
            0,
            2,
            SMALL_INTEGER_EXT,
            1,
            SMALL_INTEGER_EXT,
            2,
            NIL_EXT,
            MAP_EXT,
            0,
            0,
            0,
            1,
            SMALL_ATOM_UTF8_EXT,
            1,
            b'a',
            SMALL_INTEGER_EXT,
            1,
            // trailing payload byte, must not be consumed
            NIL_EXT,
        ];
        assert_eq!(skip_len(&bytes).unwrap(), bytes.len() - 1);
    }

    #[test]
    fn test_skip_pid_and_export() {
        let mut buf = TermBuffer::new();
        buf.encode_pid(&Pid::new("n@h", 0, 0, 9)).unwrap();
        let pid_len = buf.len();
        assert_eq!(skip_len(buf.as_slice()).unwrap(), pid_len);

        let export = [
            EXPORT_EXT,
            SMALL_ATOM_UTF8_EXT,
            1,
            b'm',
            SMALL_ATOM_UTF8_EXT,
            1,
            b'f',
            SMALL_INTEGER_EXT,
            2,
        ];
        assert_eq!(skip_len(&export).unwrap(), export.len());
    }

    #[test]
    fn test_skip_truncated() {
        assert!(skip_len(&[]).is_err());
        assert!(skip_len(&[SMALL_TUPLE_EXT, 2, SMALL_INTEGER_EXT, 1]).is_err());
        assert!(skip_len(&[BINARY_EXT, 0xFF, 0xFF, 0xFF, 0xFF]).is_err());
        assert!(skip_len(&[LIST_EXT, 0xFF, 0xFF, 0xFF, 0xFF, NIL_EXT]).is_err());
    }

    #[test]
    fn test_skip_rejects_unknown_and_cache_refs() {
        assert!(matches!(skip_len(&[0x01]), Err(DistError::DecodeError(_))));
        assert!(matches!(
            skip_len(&[ATOM_CACHE_REF, 0]),
            Err(DistError::DecodeError(_))
        ));
    }

    #[test]
    fn test_skip_deep_nesting_is_iterative() {
        let depth = 100_000;
        let mut bytes = Vec::with_capacity(depth * 2 + 1);
        for _ in 0..depth {
            bytes.push(SMALL_TUPLE_EXT);
            bytes.push(1);
        }
        bytes.push(NIL_EXT);
        assert_eq!(skip_len(&bytes).unwrap(), bytes.len());
    }

    #[test]
    fn test_decode_header_and_version() {
        let mut buf = TermBuffer::new();
        buf.encode_version();
        buf.encode_distribution_header();
        let mut reader = TermReader::new(buf.as_slice());
        assert_eq!(reader.decode_version().unwrap(), VERSION_MAGIC);
        assert_eq!(reader.decode_distribution_header().unwrap(), 0);
        assert_eq!(reader.remaining(), 0);

        assert!(TermReader::new(&[130]).decode_version().is_err());
        assert!(TermReader::new(&[b'p', 0])
            .decode_distribution_header()
            .is_err());
    }

    #[test]
    fn test_decode_latin1_atom() {
        let mut reader = TermReader::new(&[SMALL_ATOM_EXT, 2, 0xE9, b't']);
        assert_eq!(reader.decode_atom().unwrap(), "\u{e9}t");
    }
}
