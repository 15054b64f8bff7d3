//! Property-based tests for cache key determinism and sensitivity.
//!
//! These tests verify the behavioral contracts of the key builder:
//! - Determinism: the same sequence of puts always produces the same key
//! - Sensitivity: changing a value or the order of two puts changes the key
//! - Framing: splitting a string differently changes the key

use cairn_cache::{CacheKey, CacheKeyBuilder};
use proptest::prelude::*;

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// One call on the builder
#[derive(Debug, Clone, PartialEq)]
enum Put {
    Byte(u8),
    Bytes(Vec<u8>),
    Int(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Str(String),
}

fn put_strategy() -> impl Strategy<Value = Put> {
    prop_oneof![
        any::<u8>().prop_map(Put::Byte),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Put::Bytes),
        any::<i32>().prop_map(Put::Int),
        any::<i64>().prop_map(Put::Long),
        any::<f64>().prop_map(Put::Double),
        any::<bool>().prop_map(Put::Boolean),
        "[a-zA-Z0-9 ./_-]{0,24}".prop_map(Put::Str),
    ]
}

/// Two puts of the same kind, so their encodings cannot commute
fn same_kind_pair_strategy() -> impl Strategy<Value = (Put, Put)> {
    prop_oneof![
        (any::<u8>(), any::<u8>()).prop_map(|(a, b)| (Put::Byte(a), Put::Byte(b))),
        (any::<i32>(), any::<i32>()).prop_map(|(a, b)| (Put::Int(a), Put::Int(b))),
        (any::<i64>(), any::<i64>()).prop_map(|(a, b)| (Put::Long(a), Put::Long(b))),
        (any::<f64>(), any::<f64>()).prop_map(|(a, b)| (Put::Double(a), Put::Double(b))),
        Just((Put::Boolean(true), Put::Boolean(false))),
        ("[a-z]{0,8}", "[a-z]{0,8}").prop_map(|(a, b)| (Put::Str(a), Put::Str(b))),
    ]
}

fn puts_strategy() -> impl Strategy<Value = Vec<Put>> {
    prop::collection::vec(put_strategy(), 0..12)
}

fn build(puts: &[Put]) -> CacheKey {
    puts.iter()
        .fold(CacheKeyBuilder::new(), |builder, put| match put {
            Put::Byte(v) => builder.put_byte(*v),
            Put::Bytes(v) => builder.put_bytes(v),
            Put::Int(v) => builder.put_int(*v),
            Put::Long(v) => builder.put_long(*v),
            Put::Double(v) => builder.put_double(*v),
            Put::Boolean(v) => builder.put_boolean(*v),
            Put::Str(v) => builder.put_string(v),
        })
        .build()
}

/// Encoded form of a put, used to skip cases where two puts are identical
fn encoding(put: &Put) -> String {
    match put {
        Put::Double(v) => format!("Double({})", v.to_bits()),
        other => format!("{other:?}"),
    }
}

// =============================================================================
// Property Tests: Determinism
// =============================================================================

proptest! {
    /// Contract: the same put sequence always produces the same key
    #[test]
    fn cache_key_is_deterministic(puts in puts_strategy()) {
        prop_assert_eq!(build(&puts), build(&puts));
    }

    /// Contract: keys survive a round trip through their hex form
    #[test]
    fn cache_key_hex_round_trip(puts in puts_strategy()) {
        let key = build(&puts);
        prop_assert_eq!(CacheKey::from_hex(&key.hash_code()).unwrap(), key);
    }
}

// =============================================================================
// Property Tests: Sensitivity
// =============================================================================

proptest! {
    /// Contract: swapping two different puts of the same kind changes the key
    #[test]
    fn swapping_puts_changes_key(
        prefix in puts_strategy(),
        (a, b) in same_kind_pair_strategy(),
        suffix in puts_strategy(),
    ) {
        prop_assume!(encoding(&a) != encoding(&b));

        let forward: Vec<Put> = prefix.iter().cloned()
            .chain([a.clone(), b.clone()])
            .chain(suffix.iter().cloned())
            .collect();
        let swapped: Vec<Put> = prefix.into_iter()
            .chain([b, a])
            .chain(suffix)
            .collect();
        prop_assert_ne!(build(&forward), build(&swapped));
    }

    /// Contract: appending any put changes the key
    #[test]
    fn appending_put_changes_key(puts in puts_strategy(), extra in put_strategy()) {
        let original = build(&puts);
        let mut extended = puts;
        extended.push(extra);
        prop_assert_ne!(original, build(&extended));
    }

    /// Contract: changing an int value changes the key
    #[test]
    fn different_int_produces_different_key(a in any::<i32>(), b in any::<i32>()) {
        prop_assume!(a != b);
        prop_assert_ne!(build(&[Put::Int(a)]), build(&[Put::Int(b)]));
    }

    /// Contract: strings are framed, so re-splitting the same characters
    /// produces a different key
    #[test]
    fn string_split_changes_key(text in "[a-z]{2,16}", split in any::<prop::sample::Index>()) {
        let at = 1 + split.index(text.len() - 1);
        let (left, right) = text.split_at(at);
        prop_assert_ne!(
            build(&[Put::Str(text.clone())]),
            build(&[Put::Str(left.to_string()), Put::Str(right.to_string())])
        );
    }
}
