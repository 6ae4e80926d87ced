//! Native list decoder.
//!
//! Every read is bounds-checked against the input slice. Malformed input is
//! reported as a [`DecodeError`], never a panic.

use crate::error::{DecodeError, DecodeResult};
use crate::value::{NativeValue, NvList};
use crate::wire::{
    align8, ByteOrder, DataType, EMBEDDED_LIST_SIZE, MAX_DEPTH, NV_ENCODE_NATIVE,
    PAIR_HEADER_SIZE, STREAM_HEADER_SIZE,
};

/// Decoder for native name/value lists.
pub struct NvDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> NvDecoder<'a> {
    /// Creates a decoder over an encoded stream.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            order: ByteOrder::Little,
        }
    }

    /// Decodes a complete stream. Bytes after the top-level terminator are ignored.
    pub fn decode(mut self) -> DecodeResult<NvList> {
        let header = self.read_bytes(STREAM_HEADER_SIZE)?;
        if header[0] != NV_ENCODE_NATIVE {
            return Err(DecodeError::UnsupportedEncoding {
                encoding: header[0],
            });
        }
        self.order = ByteOrder::from_marker(header[1])
            .ok_or(DecodeError::UnsupportedByteOrder { marker: header[1] })?;

        let _version = self.read_i32()?;
        let _flags = self.read_u32()?;
        self.decode_pairs(0)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn decode_pairs(&mut self, depth: usize) -> DecodeResult<NvList> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep { depth });
        }

        let mut list = NvList::ordered();
        loop {
            let start = self.pos;
            let size = self.read_i32()?;
            if size == 0 {
                return Ok(list);
            }
            if size < 0 {
                return Err(DecodeError::LengthOverflow {
                    offset: start,
                    reason: "negative pair size",
                });
            }
            let size = size as usize;
            if size < PAIR_HEADER_SIZE {
                return Err(DecodeError::LengthOverflow {
                    offset: start,
                    reason: "pair size smaller than pair header",
                });
            }
            self.ensure_available_from(start, size)?;

            let name_sz = self.read_i16()?;
            let _reserved = self.read_i16()?;
            let nelem = self.read_i32()?;
            let tag = self.read_i32()?;

            if name_sz <= 0 {
                return Err(DecodeError::LengthOverflow {
                    offset: start,
                    reason: "non-positive name size",
                });
            }
            if nelem < 0 {
                return Err(DecodeError::LengthOverflow {
                    offset: start,
                    reason: "negative element count",
                });
            }
            let data_type =
                DataType::from_tag(tag).ok_or(DecodeError::UnknownTypeTag { tag, offset: start })?;

            let name_sz = name_sz as usize;
            let name_area = align8(PAIR_HEADER_SIZE + name_sz) - PAIR_HEADER_SIZE;
            if PAIR_HEADER_SIZE + name_area > size {
                return Err(DecodeError::LengthOverflow {
                    offset: start,
                    reason: "name exceeds pair size",
                });
            }
            let name_offset = self.pos;
            let name_bytes = self.read_bytes(name_area)?;
            let name = terminated_str(&name_bytes[..name_sz], name_offset)?;
            if name.len() + 1 != name_sz {
                return Err(DecodeError::LengthOverflow {
                    offset: name_offset,
                    reason: "name size disagrees with terminator",
                });
            }

            let value_offset = self.pos;
            let value_area = size - PAIR_HEADER_SIZE - name_area;
            let area = self.read_bytes(value_area)?;
            let nelem = nelem as usize;

            let value = match data_type {
                DataType::Boolean => NativeValue::Boolean(true),
                DataType::BooleanValue => {
                    let raw = self.fixed::<4>(area, value_offset)?;
                    NativeValue::Boolean(self.i32_from(raw) != 0)
                }
                DataType::Uint64 => {
                    let raw = self.fixed::<8>(area, value_offset)?;
                    NativeValue::Uint64(self.u64_from(raw))
                }
                DataType::String => {
                    NativeValue::String(terminated_str(area, value_offset)?.to_string())
                }
                DataType::ByteArray => {
                    if nelem > area.len() {
                        return Err(DecodeError::LengthOverflow {
                            offset: value_offset,
                            reason: "byte array exceeds value area",
                        });
                    }
                    NativeValue::Bytes(area[..nelem].to_vec())
                }
                DataType::NvList => {
                    if area.len() < EMBEDDED_LIST_SIZE {
                        return Err(DecodeError::LengthOverflow {
                            offset: value_offset,
                            reason: "embedded list header exceeds value area",
                        });
                    }
                    NativeValue::List(self.decode_pairs(depth + 1)?)
                }
            };

            list.insert(name, value);
        }
    }

    fn ensure_available_from(&self, offset: usize, len: usize) -> DecodeResult<()> {
        let available = self.buf.len().saturating_sub(offset);
        if len > available {
            return Err(DecodeError::Truncated {
                offset,
                needed: len,
                available,
            });
        }
        Ok(())
    }

    fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        self.ensure_available_from(self.pos, len)?;
        let buf: &'a [u8] = self.buf;
        let out = &buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn fixed<const N: usize>(&self, area: &[u8], offset: usize) -> DecodeResult<[u8; N]> {
        area.get(..N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or(DecodeError::LengthOverflow {
                offset,
                reason: "value exceeds value area",
            })
    }

    fn read_i16(&mut self) -> DecodeResult<i16> {
        let offset = self.pos;
        let raw = self.read_bytes(2)?;
        let raw = self.fixed::<2>(raw, offset)?;
        Ok(match self.order {
            ByteOrder::Big => i16::from_be_bytes(raw),
            _ => i16::from_le_bytes(raw),
        })
    }

    fn read_i32(&mut self) -> DecodeResult<i32> {
        let offset = self.pos;
        let raw = self.read_bytes(4)?;
        let raw = self.fixed::<4>(raw, offset)?;
        Ok(self.i32_from(raw))
    }

    fn read_u32(&mut self) -> DecodeResult<u32> {
        let offset = self.pos;
        let raw = self.read_bytes(4)?;
        let raw = self.fixed::<4>(raw, offset)?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            _ => u32::from_le_bytes(raw),
        })
    }

    fn i32_from(&self, raw: [u8; 4]) -> i32 {
        match self.order {
            ByteOrder::Big => i32::from_be_bytes(raw),
            _ => i32::from_le_bytes(raw),
        }
    }

    fn u64_from(&self, raw: [u8; 8]) -> u64 {
        match self.order {
            ByteOrder::Big => u64::from_be_bytes(raw),
            _ => u64::from_le_bytes(raw),
        }
    }
}

/// Returns the UTF-8 text before the first NUL in `bytes`.
fn terminated_str(bytes: &[u8], offset: usize) -> DecodeResult<&str> {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::Unterminated { offset })?;
    std::str::from_utf8(&bytes[..end]).map_err(|_| DecodeError::InvalidUtf8 { offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::NvEncoder;
    use crate::wire::NvConfig;

    fn encode_le(list: &NvList) -> Vec<u8> {
        NvEncoder::with_config(&NvConfig::with_byte_order(ByteOrder::Little))
            .encode(list)
            .to_vec()
    }

    fn sample() -> NvList {
        NvList::ordered()
            .with("cmd", "zfs_list")
            .with("version", 0u64)
            .with("recurse", true)
            .with("blob", vec![1u8, 2, 3])
            .with(
                "props",
                NvList::new()
                    .with("used", NvList::new().with("value", 1024u64))
                    .with("clones", NvList::new().with("tank/c", true)),
            )
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let list = sample();
        let decoded = NvDecoder::new(&encode_le(&list)).decode().unwrap();
        assert_eq!(decoded, list);
        assert!(decoded.same_order(&list));
    }

    #[test]
    fn test_big_endian_round_trip() {
        let list = sample();
        let buf = NvEncoder::with_config(&NvConfig::with_byte_order(ByteOrder::Big)).encode(&list);
        assert_eq!(NvDecoder::new(&buf).decode().unwrap(), list);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut buf = encode_le(&sample());
        buf.extend_from_slice(&[0u8; 64]);
        assert_eq!(NvDecoder::new(&buf).decode().unwrap(), sample());
    }

    #[test]
    fn test_presence_boolean_decodes_true() {
        // Hand-built pair with type BOOLEAN and no value.
        let mut buf = vec![0u8, 1, 0, 0];
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&24i32.to_le_bytes());
        buf.extend_from_slice(&2i16.to_le_bytes());
        buf.extend_from_slice(&0i16.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(b"c\0\0\0\0\0\0\0");
        buf.extend_from_slice(&0i32.to_le_bytes());

        let list = NvDecoder::new(&buf).decode().unwrap();
        assert_eq!(list.get("c"), Some(&NativeValue::Boolean(true)));
    }

    #[test]
    fn test_every_truncation_fails() {
        let buf = encode_le(&sample());
        for len in 0..buf.len() {
            assert!(
                NvDecoder::new(&buf[..len]).decode().is_err(),
                "truncation at {} decoded",
                len
            );
        }
    }

    #[test]
    fn test_truncated_header_kind() {
        let err = NvDecoder::new(&[0u8, 1]).decode().unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { offset: 0, .. }));
    }

    #[test]
    fn test_unknown_type_tag() {
        let mut buf = encode_le(&NvList::new().with("v", 1u64));
        // Pair type lives at pair start + 12.
        buf[24..28].copy_from_slice(&99i32.to_le_bytes());
        let err = NvDecoder::new(&buf).decode().unwrap_err();
        assert_eq!(err, DecodeError::UnknownTypeTag { tag: 99, offset: 12 });
    }

    #[test]
    fn test_invalid_utf8_name() {
        let mut buf = encode_le(&NvList::new().with("v", 1u64));
        buf[28] = 0xFF;
        let err = NvDecoder::new(&buf).decode().unwrap_err();
        assert!(matches!(err, DecodeError::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_negative_size_is_length_overflow() {
        let mut buf = encode_le(&NvList::new().with("v", 1u64));
        buf[12..16].copy_from_slice(&(-8i32).to_le_bytes());
        let err = NvDecoder::new(&buf).decode().unwrap_err();
        assert!(matches!(err, DecodeError::LengthOverflow { .. }));
    }

    #[test]
    fn test_oversized_pair_is_truncated() {
        let mut buf = encode_le(&NvList::new().with("v", 1u64));
        buf[12..16].copy_from_slice(&4096i32.to_le_bytes());
        let err = NvDecoder::new(&buf).decode().unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { offset: 12, .. }));
    }

    #[test]
    fn test_byte_array_count_exceeds_area() {
        let mut buf = encode_le(&NvList::new().with("b", vec![1u8, 2]));
        // nelem lives at pair start + 8
        buf[20..24].copy_from_slice(&1000i32.to_le_bytes());
        let err = NvDecoder::new(&buf).decode().unwrap_err();
        assert!(matches!(err, DecodeError::LengthOverflow { .. }));
    }

    #[test]
    fn test_unsupported_encoding() {
        let mut buf = encode_le(&NvList::new());
        buf[0] = 1;
        assert_eq!(
            NvDecoder::new(&buf).decode().unwrap_err(),
            DecodeError::UnsupportedEncoding { encoding: 1 }
        );
        buf[0] = 0;
        buf[1] = 9;
        assert_eq!(
            NvDecoder::new(&buf).decode().unwrap_err(),
            DecodeError::UnsupportedByteOrder { marker: 9 }
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut list = NvList::new().with("leaf", 1u64);
        for _ in 0..(MAX_DEPTH + 2) {
            list = NvList::new().with("n", list);
        }
        let err = NvDecoder::new(&encode_le(&list)).decode().unwrap_err();
        assert!(matches!(err, DecodeError::NestingTooDeep { .. }));
    }
}
