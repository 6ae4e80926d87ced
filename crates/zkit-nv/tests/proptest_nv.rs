//! Property-based tests for zkit-nv using proptest.
//!
//! These tests check the codec invariants that every request and reply
//! depends on: lossless round trips and rejection of damaged input.

use proptest::prelude::*;
use zkit_nv::{decode, encode_with, ByteOrder, NativeValue, NvConfig, NvList};

/// Generator for pair names.
fn any_name() -> impl Strategy<Value = String> {
    "[a-z0-9_./@#]{1,24}"
}

/// Generator for scalar values.
fn any_leaf() -> impl Strategy<Value = NativeValue> {
    prop_oneof![
        any::<u64>().prop_map(NativeValue::Uint64),
        any::<bool>().prop_map(NativeValue::Boolean),
        "[^\\x00]{0,40}".prop_map(NativeValue::String),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(NativeValue::Bytes),
    ]
}

/// Generator for nested lists, mixing sorted and ordered modes.
fn any_list() -> impl Strategy<Value = NvList> {
    let leaves = proptest::collection::vec((any_name(), any_leaf()), 0..8)
        .prop_map(|pairs| pairs.into_iter().collect::<NvList>());
    leaves.prop_recursive(4, 64, 8, |inner| {
        proptest::collection::vec(
            (
                any_name(),
                prop_oneof![any_leaf(), inner.prop_map(NativeValue::List)],
            ),
            0..8,
        )
        .prop_map(|pairs| {
            let mut list = NvList::ordered();
            for (k, v) in pairs {
                list.insert(k, v);
            }
            list
        })
    })
}

fn any_byte_order() -> impl Strategy<Value = ByteOrder> {
    prop_oneof![
        Just(ByteOrder::Little),
        Just(ByteOrder::Big),
        Just(ByteOrder::Native)
    ]
}

proptest! {
    /// Test: decode(encode(v)) is value-equal to v and keeps its order.
    #[test]
    fn test_round_trip(list in any_list(), order in any_byte_order()) {
        let buf = encode_with(&list, &NvConfig::with_byte_order(order));
        let decoded = decode(&buf).unwrap();
        prop_assert_eq!(&decoded, &list);
        prop_assert!(decoded.same_order(&list));
    }

    /// Test: re-encoding a decoded list is stable.
    #[test]
    fn test_reencode_stable(list in any_list()) {
        let config = NvConfig::with_byte_order(ByteOrder::Little);
        let first = encode_with(&list, &config);
        let second = encode_with(&decode(&first).unwrap(), &config);
        prop_assert_eq!(first, second);
    }

    /// Test: truncating an encoded buffer anywhere yields an error.
    #[test]
    fn test_truncation_rejected(list in any_list(), cut in any::<prop::sample::Index>()) {
        let buf = encode_with(&list, &NvConfig::default());
        let len = cut.index(buf.len());
        prop_assert!(decode(&buf[..len]).is_err());
    }

    /// Test: arbitrary bytes never panic the decoder.
    #[test]
    fn test_arbitrary_bytes_do_not_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode(&bytes);
    }

    /// Test: corrupting a single byte never panics the decoder.
    #[test]
    fn test_bit_flip_does_not_panic(
        list in any_list(),
        at in any::<prop::sample::Index>(),
        mask in 1u8..=255u8,
    ) {
        let mut buf = encode_with(&list, &NvConfig::default()).to_vec();
        let idx = at.index(buf.len());
        buf[idx] ^= mask;
        let _ = decode(&buf);
    }
}
