//! Bound parameter maps and their fingerprint.
//!
//! The fingerprint groups executions that ran with the same parameter values
//! so a report can say "parameter set #3". It is a display aid, not a
//! security primitive: collisions are possible and acceptable.

use crate::utils::config::{PARAMS_HASH_MASK, PARAMS_HASH_MULTIPLIER};
use fnv::FnvHasher;
use serde_json::Value;
use std::collections::BTreeMap;
use std::hash::Hasher;

/// Parameter name to bound value
pub type Params = BTreeMap<String, Value>;

/// Compute the 32-bit fingerprint of a parameter map
///
/// **Public** - called once per captured record
///
/// Keys are visited in sorted order and each value's hash, scaled by an odd
/// constant, is XOR-accumulated. The upper half of the accumulator is then
/// folded into the lower 32 bits.
///
/// Only values take part in the fingerprint, so `{a: 1}` and `{b: 1}`
/// collide, and two equal values cancel each other out.
pub fn params_hash(params: &Params) -> u32 {
    let mut h: u64 = 0;

    // BTreeMap iterates in key order
    for value in params.values() {
        h ^= PARAMS_HASH_MULTIPLIER.wrapping_mul(hash_value(value));
    }

    ((h ^ (h >> 32)) & PARAMS_HASH_MASK) as u32
}

/// Merge compiled parameter maps in order, later keys overwriting earlier ones
///
/// **Public** - used by the capture hook on the execution's parameter context
pub fn merge_params(maps: &[Params]) -> Params {
    let mut merged = Params::new();
    for map in maps {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Deterministic FNV-1a hash of a JSON value's structure
///
/// **Private** - stable across runs, unlike `DefaultHasher`
fn hash_value(value: &Value) -> u64 {
    let mut hasher = FnvHasher::default();
    write_value(&mut hasher, value);
    hasher.finish()
}

fn write_value(hasher: &mut FnvHasher, value: &Value) {
    match value {
        Value::Null => hasher.write_u8(0),
        Value::Bool(b) => {
            hasher.write_u8(1);
            hasher.write_u8(u8::from(*b));
        }
        Value::Number(n) => {
            hasher.write_u8(2);
            hasher.write(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.write_u8(3);
            hasher.write(s.as_bytes());
            hasher.write_u8(0xff);
        }
        Value::Array(items) => {
            hasher.write_u8(4);
            hasher.write_u64(items.len() as u64);
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.write_u8(5);
            hasher.write_u64(map.len() as u64);
            for (key, item) in map {
                hasher.write(key.as_bytes());
                hasher.write_u8(0xff);
                write_value(hasher, item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_empty_params_hash_to_zero() {
        assert_eq!(params_hash(&Params::new()), 0);
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let a = params(&[("id", json!(7)), ("name", json!("bob")), ("flag", json!(true))]);
        let b = params(&[("flag", json!(true)), ("id", json!(7)), ("name", json!("bob"))]);
        assert_eq!(params_hash(&a), params_hash(&b));
    }

    #[test]
    fn test_hash_changes_with_value() {
        let a = params(&[("id", json!(7)), ("name", json!("bob"))]);
        let b = params(&[("id", json!(8)), ("name", json!("bob"))]);
        assert_ne!(params_hash(&a), params_hash(&b));
    }

    #[test]
    fn test_hash_ignores_key_names() {
        let a = params(&[("a", json!(1))]);
        let b = params(&[("b", json!(1))]);
        assert_eq!(params_hash(&a), params_hash(&b));
    }

    #[test]
    fn test_equal_values_cancel() {
        let p = params(&[("a", json!("x")), ("b", json!("x"))]);
        assert_eq!(params_hash(&p), 0);
    }

    #[test]
    fn test_value_types_are_distinguished() {
        let number = params(&[("v", json!(1))]);
        let string = params(&[("v", json!("1"))]);
        assert_ne!(params_hash(&number), params_hash(&string));
    }

    #[test]
    fn test_merge_params_later_wins() {
        let first = params(&[("a", json!(1)), ("b", json!(2))]);
        let second = params(&[("b", json!(3)), ("c", json!(4))]);

        let merged = merge_params(&[first, second]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(3));
        assert_eq!(merged["c"], json!(4));
    }

    #[test]
    fn test_merge_params_empty() {
        assert!(merge_params(&[]).is_empty());
    }
}
