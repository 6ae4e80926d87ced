//! Error types for native value decoding.

use thiserror::Error;

/// Result type alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Reasons a native value buffer can be rejected.
///
/// Every variant carries the byte offset at which decoding stopped so a
/// protocol mismatch can be traced back to the reply that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ended before a complete field could be read.
    #[error("Truncated value at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        /// Offset of the field that could not be read.
        offset: usize,
        /// Number of bytes the field requires.
        needed: usize,
        /// Number of bytes left in the buffer.
        available: usize,
    },

    /// A pair carried a type tag this codec does not understand.
    #[error("Unknown type tag {tag} at offset {offset}")]
    UnknownTypeTag {
        /// The raw tag value.
        tag: i32,
        /// Offset of the pair header.
        offset: usize,
    },

    /// A name or string value was not valid UTF-8.
    #[error("Invalid UTF-8 at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the offending bytes.
        offset: usize,
    },

    /// A length or size field is negative, inconsistent, or exceeds its container.
    #[error("Length overflow at offset {offset}: {reason}")]
    LengthOverflow {
        /// Offset of the offending field.
        offset: usize,
        /// Which consistency check failed.
        reason: &'static str,
    },

    /// A name or string value has no NUL terminator inside its declared area.
    #[error("Unterminated name or string at offset {offset}")]
    Unterminated {
        /// Offset of the unterminated bytes.
        offset: usize,
    },

    /// The stream header names an encoding other than native.
    #[error("Unsupported encoding {encoding}")]
    UnsupportedEncoding {
        /// The encoding byte from the stream header.
        encoding: u8,
    },

    /// The stream header names an unknown byte order.
    #[error("Unsupported byte order marker {marker}")]
    UnsupportedByteOrder {
        /// The endianness byte from the stream header.
        marker: u8,
    },

    /// Nested lists exceed the supported depth.
    #[error("Nesting too deep: {depth} levels")]
    NestingTooDeep {
        /// Depth at which decoding gave up.
        depth: usize,
    },
}

impl DecodeError {
    /// Short, stable name of the error kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::UnknownTypeTag { .. } => "unknown_type_tag",
            DecodeError::InvalidUtf8 { .. } => "invalid_utf8",
            DecodeError::LengthOverflow { .. } => "length_overflow",
            DecodeError::Unterminated { .. } => "unterminated",
            DecodeError::UnsupportedEncoding { .. } => "unsupported_encoding",
            DecodeError::UnsupportedByteOrder { .. } => "unsupported_byte_order",
            DecodeError::NestingTooDeep { .. } => "nesting_too_deep",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_message() {
        let err = DecodeError::Truncated {
            offset: 12,
            needed: 8,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Truncated value at offset 12: needed 8 bytes, 3 available"
        );
        assert_eq!(err.kind(), "truncated");
    }

    #[test]
    fn test_unknown_tag_message() {
        let err = DecodeError::UnknownTypeTag { tag: 77, offset: 40 };
        let msg = format!("{}", err);
        assert!(msg.contains("77"));
        assert!(msg.contains("40"));
    }

    #[test]
    fn test_length_overflow_reason() {
        let err = DecodeError::LengthOverflow {
            offset: 8,
            reason: "negative pair size",
        };
        assert!(err.to_string().contains("negative pair size"));
        assert_eq!(err.kind(), "length_overflow");
    }
}
