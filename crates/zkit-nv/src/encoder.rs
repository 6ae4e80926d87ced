//! Native list encoder.

use bytes::{BufMut, Bytes, BytesMut};

use crate::value::{NativeValue, NvList};
use crate::wire::{
    align8, ByteOrder, DataType, NvConfig, EMBEDDED_LIST_SIZE, NV_ENCODE_NATIVE, NV_UNIQUE_NAME,
    NV_VERSION, PAIR_HEADER_SIZE,
};

/// Encoder for native name/value lists.
pub struct NvEncoder {
    buf: BytesMut,
    order: ByteOrder,
}

impl NvEncoder {
    /// Creates an encoder using the host byte order.
    pub fn new() -> Self {
        Self::with_config(&NvConfig::default())
    }

    /// Creates an encoder from configuration.
    pub fn with_config(config: &NvConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            order: config.byte_order.resolve(),
        }
    }

    /// Encodes a complete stream: header, list header, pairs, terminator.
    ///
    /// Names and strings must not contain NUL bytes and names must be shorter
    /// than `i16::MAX` bytes (see [`NvList::is_well_formed`]).
    pub fn encode(mut self, list: &NvList) -> Bytes {
        debug_assert!(list.is_well_formed(), "list contains unencodable names or strings");
        self.buf
            .extend_from_slice(&[NV_ENCODE_NATIVE, self.order.marker(), 0, 0]);
        self.put_i32(NV_VERSION);
        self.put_u32(NV_UNIQUE_NAME);
        self.encode_pairs(list);
        self.buf.freeze()
    }

    fn encode_pairs(&mut self, list: &NvList) {
        for (name, value) in list.iter() {
            self.encode_pair(name, value);
        }
        self.put_i32(0);
    }

    fn encode_pair(&mut self, name: &str, value: &NativeValue) {
        let (data_type, nelem, data_len) = match value {
            NativeValue::Uint64(_) => (DataType::Uint64, 1, 8),
            NativeValue::Boolean(_) => (DataType::BooleanValue, 1, 4),
            NativeValue::String(s) => (DataType::String, 1, s.len() + 1),
            NativeValue::Bytes(b) => (DataType::ByteArray, b.len(), b.len()),
            NativeValue::List(_) => (DataType::NvList, 1, EMBEDDED_LIST_SIZE),
        };

        let name_sz = name.len() + 1;
        let name_area = align8(PAIR_HEADER_SIZE + name_sz) - PAIR_HEADER_SIZE;
        let value_area = align8(data_len);
        let size = PAIR_HEADER_SIZE + name_area + value_area;

        self.put_i32(size as i32);
        self.put_i16(name_sz as i16);
        self.put_i16(0);
        self.put_i32(nelem as i32);
        self.put_i32(data_type.tag());

        self.buf.extend_from_slice(name.as_bytes());
        self.put_zeros(name_area - name.len());

        match value {
            NativeValue::Uint64(v) => self.put_u64(*v),
            NativeValue::Boolean(v) => {
                self.put_i32(i32::from(*v));
                self.put_zeros(value_area - 4);
            }
            NativeValue::String(s) => {
                self.buf.extend_from_slice(s.as_bytes());
                self.put_zeros(value_area - s.len());
            }
            NativeValue::Bytes(b) => {
                self.buf.extend_from_slice(b);
                self.put_zeros(value_area - b.len());
            }
            NativeValue::List(inner) => {
                // Embedded list header: version, flags, private pointer, flag, pad.
                self.put_i32(NV_VERSION);
                self.put_u32(NV_UNIQUE_NAME);
                self.put_u64(0);
                self.put_u32(0);
                self.put_i32(0);
                self.encode_pairs(inner);
            }
        }
    }

    fn put_zeros(&mut self, n: usize) {
        self.buf.put_bytes(0, n);
    }

    fn put_i16(&mut self, v: i16) {
        match self.order {
            ByteOrder::Big => self.buf.put_i16(v),
            _ => self.buf.put_i16_le(v),
        }
    }

    fn put_i32(&mut self, v: i32) {
        match self.order {
            ByteOrder::Big => self.buf.put_i32(v),
            _ => self.buf.put_i32_le(v),
        }
    }

    fn put_u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::Big => self.buf.put_u32(v),
            _ => self.buf.put_u32_le(v),
        }
    }

    fn put_u64(&mut self, v: u64) {
        match self.order {
            ByteOrder::Big => self.buf.put_u64(v),
            _ => self.buf.put_u64_le(v),
        }
    }
}

impl Default for NvEncoder {
    fn default() -> Self {
        Self::new()
    }
}
