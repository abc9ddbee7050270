//! Distribution capability flags.
//!
//! A 64-bit bitmask exchanged in both directions during the handshake. Bit
//! positions are fixed by the distribution protocol. Bits this crate has no
//! name for are carried through untouched, since a newer peer may set them.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Capability bitmask advertised by a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DistFlags(u64);

impl DistFlags {
    pub const PUBLISHED: Self = Self(0x01);
    pub const ATOM_CACHE: Self = Self(0x02);
    pub const EXTENDED_REFERENCES: Self = Self(0x04);
    pub const DIST_MONITOR: Self = Self(0x08);
    pub const FUN_TAGS: Self = Self(0x10);
    pub const DIST_MONITOR_NAME: Self = Self(0x20);
    pub const HIDDEN_ATOM_CACHE: Self = Self(0x40);
    pub const NEW_FUN_TAGS: Self = Self(0x80);
    pub const EXTENDED_PIDS_PORTS: Self = Self(0x100);
    pub const EXPORT_PTR_TAG: Self = Self(0x200);
    pub const BIT_BINARIES: Self = Self(0x400);
    pub const NEW_FLOATS: Self = Self(0x800);
    pub const UNICODE_IO: Self = Self(0x1000);
    pub const DIST_HDR_ATOM_CACHE: Self = Self(0x2000);
    pub const SMALL_ATOM_TAGS: Self = Self(0x4000);
    /// Internal to the emulator, never sent on the wire by OTP.
    pub const ETS_COMPRESSED: Self = Self(0x8000);
    pub const UTF8_ATOMS: Self = Self(0x10000);
    pub const MAP_TAG: Self = Self(0x20000);
    pub const BIG_CREATION: Self = Self(0x40000);
    pub const SEND_SENDER: Self = Self(0x80000);
    pub const BIG_SEQTRACE_LABELS: Self = Self(0x100000);
    /// Internal to the emulator, never sent on the wire by OTP.
    pub const PENDING_CONNECT: Self = Self(0x200000);
    pub const EXIT_PAYLOAD: Self = Self(0x400000);
    pub const FRAGMENTS: Self = Self(0x800000);
    pub const HANDSHAKE_23: Self = Self(0x1000000);
    pub const UNLINK_ID: Self = Self(0x2000000);
    pub const MANDATORY_25_DIGEST: Self = Self(0x4000000);
    pub const RESERVED: Self = Self(0xf8000000);

    pub const SPAWN: Self = Self(0x1 << 32);
    pub const NAME_ME: Self = Self(0x2 << 32);
    pub const V4_NC: Self = Self(0x4 << 32);
    pub const ALIAS: Self = Self(0x8 << 32);
    /// Internal to the emulator, never sent on the wire by OTP.
    pub const LOCAL_EXT: Self = Self(0x10 << 32);
    pub const ALTACT_SIG: Self = Self(0x20 << 32);

    /// Capabilities every OTP 25+ peer requires.
    pub const MANDATORY_25: Self = Self(
        Self::EXTENDED_REFERENCES.0
            | Self::FUN_TAGS.0
            | Self::EXTENDED_PIDS_PORTS.0
            | Self::UTF8_ATOMS.0
            | Self::NEW_FUN_TAGS.0
            | Self::BIG_CREATION.0
            | Self::NEW_FLOATS.0
            | Self::MAP_TAG.0
            | Self::EXPORT_PTR_TAG.0
            | Self::BIT_BINARIES.0
            | Self::HANDSHAKE_23.0,
    );

    /// Capabilities every OTP 26+ peer requires.
    pub const MANDATORY_26: Self = Self(Self::V4_NC.0 | Self::UNLINK_ID.0);

    pub const MANDATORY: Self = Self(Self::MANDATORY_25.0 | Self::MANDATORY_26.0);

    /// The fixed set this implementation advertises in send-name.
    pub const ADVERTISED: Self = Self(
        Self::MANDATORY_25_DIGEST.0
            | Self::MANDATORY.0
            | Self::DIST_MONITOR.0
            | Self::SMALL_ATOM_TAGS.0
            | Self::FRAGMENTS.0,
    );

    const NAMED: [(Self, &'static str); 34] = [
        (Self::PUBLISHED, "PUBLISHED"),
        (Self::ATOM_CACHE, "ATOM_CACHE"),
        (Self::EXTENDED_REFERENCES, "EXTENDED_REFERENCES"),
        (Self::DIST_MONITOR, "DIST_MONITOR"),
        (Self::FUN_TAGS, "FUN_TAGS"),
        (Self::DIST_MONITOR_NAME, "DIST_MONITOR_NAME"),
        (Self::HIDDEN_ATOM_CACHE, "HIDDEN_ATOM_CACHE"),
        (Self::NEW_FUN_TAGS, "NEW_FUN_TAGS"),
        (Self::EXTENDED_PIDS_PORTS, "EXTENDED_PIDS_PORTS"),
        (Self::EXPORT_PTR_TAG, "EXPORT_PTR_TAG"),
        (Self::BIT_BINARIES, "BIT_BINARIES"),
        (Self::NEW_FLOATS, "NEW_FLOATS"),
        (Self::UNICODE_IO, "UNICODE_IO"),
        (Self::DIST_HDR_ATOM_CACHE, "DIST_HDR_ATOM_CACHE"),
        (Self::SMALL_ATOM_TAGS, "SMALL_ATOM_TAGS"),
        (Self::ETS_COMPRESSED, "ETS_COMPRESSED"),
        (Self::UTF8_ATOMS, "UTF8_ATOMS"),
        (Self::MAP_TAG, "MAP_TAG"),
        (Self::BIG_CREATION, "BIG_CREATION"),
        (Self::SEND_SENDER, "SEND_SENDER"),
        (Self::BIG_SEQTRACE_LABELS, "BIG_SEQTRACE_LABELS"),
        (Self::PENDING_CONNECT, "PENDING_CONNECT"),
        (Self::EXIT_PAYLOAD, "EXIT_PAYLOAD"),
        (Self::FRAGMENTS, "FRAGMENTS"),
        (Self::HANDSHAKE_23, "HANDSHAKE_23"),
        (Self::UNLINK_ID, "UNLINK_ID"),
        (Self::MANDATORY_25_DIGEST, "MANDATORY_25_DIGEST"),
        (Self::RESERVED, "RESERVED"),
        (Self::SPAWN, "SPAWN"),
        (Self::NAME_ME, "NAME_ME"),
        (Self::V4_NC, "V4_NC"),
        (Self::ALIAS, "ALIAS"),
        (Self::LOCAL_EXT, "LOCAL_EXT"),
        (Self::ALTACT_SIG, "ALTACT_SIG"),
    ];

    /// Empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap a raw mask. Every bit is kept, recognised or not.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Bits set in this mask that have no protocol name.
    pub fn unknown_bits(self) -> u64 {
        let known = Self::NAMED.iter().fold(0u64, |acc, (flag, _)| acc | flag.0);
        self.0 & !known
    }
}

impl BitOr for DistFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for DistFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl BitAnd for DistFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u64> for DistFlags {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl From<DistFlags> for u64 {
    fn from(flags: DistFlags) -> Self {
        flags.0
    }
}

impl fmt::Debug for DistFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        // multi-bit masks such as RESERVED only show when fully set
        for (flag, name) in Self::NAMED.iter() {
            if self.contains(*flag) {
                names.push(*name);
            }
        }
        let unknown = self.unknown_bits();
        if names.is_empty() && unknown == 0 {
            return write!(f, "DistFlags(empty)");
        }
        write!(f, "DistFlags({}", names.join(" | "))?;
        if unknown != 0 {
            if !names.is_empty() {
                write!(f, " | ")?;
            }
            write!(f, "{unknown:#x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for DistFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
