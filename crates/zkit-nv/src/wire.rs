//! Wire-level constants and byte-order configuration for the native list encoding.
//!
//! The layout follows the libnvpair native encoding:
//!
//! ```text
//! stream header   encoding:u8  endian:u8  reserved:u8 x2
//! list header     version:i32  flags:u32
//! pair            size:i32  name_sz:i16  reserved:i16  nelem:i32  type:i32
//!                 name (NUL terminated, padded to 8)
//!                 value (padded to 8)
//! terminator      0:i32
//! ```
//!
//! A nested list stores a 24-byte embedded list header as its value. Its own
//! pairs and terminator follow directly after the parent pair.

use serde::{Deserialize, Serialize};

/// Encoding byte for the native encoding.
pub const NV_ENCODE_NATIVE: u8 = 0;
/// Encoding byte for XDR, recognized only to report it as unsupported.
pub const NV_ENCODE_XDR: u8 = 1;
/// Endianness marker for big-endian streams.
pub const NV_BIG_ENDIAN: u8 = 0;
/// Endianness marker for little-endian streams.
pub const NV_LITTLE_ENDIAN: u8 = 1;
/// List format version.
pub const NV_VERSION: i32 = 0;
/// List flag: names are unique within the list.
pub const NV_UNIQUE_NAME: u32 = 0x1;

/// Size of the stream header.
pub const STREAM_HEADER_SIZE: usize = 4;
/// Size of the fixed pair header (size, name_sz, reserved, nelem, type).
pub const PAIR_HEADER_SIZE: usize = 16;
/// Size of an embedded list header carried as the value of a nested list pair.
pub const EMBEDDED_LIST_SIZE: usize = 24;
/// Size of the list terminator.
pub const TERMINATOR_SIZE: usize = 4;
/// Deepest nesting the decoder will follow.
pub const MAX_DEPTH: usize = 64;

/// Rounds `len` up to the 8-byte pair alignment.
pub const fn align8(len: usize) -> usize {
    (len + 7) & !7
}

/// Data type tags understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Presence-only flag with no value.
    Boolean,
    /// Unsigned 64-bit integer.
    Uint64,
    /// NUL-terminated UTF-8 string.
    String,
    /// Raw byte array.
    ByteArray,
    /// Nested list.
    NvList,
    /// Boolean with an explicit value.
    BooleanValue,
}

impl DataType {
    /// Returns the on-wire tag.
    pub fn tag(self) -> i32 {
        match self {
            DataType::Boolean => 1,
            DataType::Uint64 => 8,
            DataType::String => 9,
            DataType::ByteArray => 10,
            DataType::NvList => 19,
            DataType::BooleanValue => 21,
        }
    }

    /// Maps an on-wire tag back to a type, if supported.
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            1 => Some(DataType::Boolean),
            8 => Some(DataType::Uint64),
            9 => Some(DataType::String),
            10 => Some(DataType::ByteArray),
            19 => Some(DataType::NvList),
            21 => Some(DataType::BooleanValue),
            _ => None,
        }
    }
}

/// Byte order used for fixed-width integers.
///
/// The kernel reads commands in its own ABI byte order, so this must match the
/// target kernel. Replies carry their byte order in the stream header and are
/// decoded regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Little-endian.
    Little,
    /// Big-endian.
    Big,
    /// Byte order of the host this code is compiled for.
    #[default]
    Native,
}

impl ByteOrder {
    /// Resolves `Native` to the host's concrete byte order.
    pub fn resolve(self) -> ByteOrder {
        match self {
            ByteOrder::Native if cfg!(target_endian = "big") => ByteOrder::Big,
            ByteOrder::Native => ByteOrder::Little,
            other => other,
        }
    }

    /// Stream header marker for this byte order.
    pub fn marker(self) -> u8 {
        match self.resolve() {
            ByteOrder::Big => NV_BIG_ENDIAN,
            _ => NV_LITTLE_ENDIAN,
        }
    }

    /// Parses a stream header marker.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            NV_BIG_ENDIAN => Some(ByteOrder::Big),
            NV_LITTLE_ENDIAN => Some(ByteOrder::Little),
            _ => None,
        }
    }
}

/// Encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NvConfig {
    /// Byte order for encoded integers.
    #[serde(default)]
    pub byte_order: ByteOrder,
}

impl NvConfig {
    /// Configuration with an explicit byte order.
    pub fn with_byte_order(byte_order: ByteOrder) -> Self {
        Self { byte_order }
    }
}
