#![warn(missing_docs)]

//! zkit native value subsystem: self-describing name/value lists
//!
//! This crate encodes and decodes the native list format that the ZFS kernel
//! command interface uses for every request and reply. Lists nest, carry typed
//! scalars, and can be built in insertion order for command parameters or
//! sorted order for property maps.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod value;
pub mod wire;

use bytes::Bytes;

pub use decoder::NvDecoder;
pub use encoder::NvEncoder;
pub use error::{DecodeError, DecodeResult};
pub use value::{ListMode, NativeValue, NvList};
pub use wire::{ByteOrder, DataType, NvConfig, MAX_DEPTH};

/// Encodes `list` in the host byte order.
pub fn encode(list: &NvList) -> Bytes {
    NvEncoder::new().encode(list)
}

/// Encodes `list` using `config`.
pub fn encode_with(list: &NvList, config: &NvConfig) -> Bytes {
    NvEncoder::with_config(config).encode(list)
}

/// Decodes a complete encoded stream.
pub fn decode(buf: &[u8]) -> DecodeResult<NvList> {
    NvDecoder::new(buf).decode()
}
