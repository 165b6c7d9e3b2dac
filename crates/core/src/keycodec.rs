//! Tagged-tuple key encoding.
//!
//! Keys are sequences of typed elements (`u64`, `string`, `bytes`), each
//! prefixed with a 1-byte type tag so that the different key families never
//! collide and so a byte-wise comparison of encoded keys matches the
//! intended ordering of the decoded tuple:
//!
//! - `U64` is encoded as its 8-byte big-endian representation, so integer
//!   order matches byte order.
//! - `Str` is encoded byte-for-byte with `0x00` escaped to `0x00 0xFF` and
//!   terminated by `0x00 0x00`; since `0xFF` never otherwise starts an
//!   escape sequence in valid UTF-8 continuation bytes at this position,
//!   lexicographic byte order on the encoding matches lexicographic order
//!   on the original UTF-8 string.
//! - `Bytes` is length-prefixed (not used by the ordering-sensitive key
//!   families below, but kept for completeness of the tuple layer).
//!
//! This lets `(1, metric_id, *)` be range-scanned as a byte prefix — the
//! property the ring storage and registry layers depend on.

use byteorder::{BigEndian, WriteBytesExt};

/// One element of a tuple key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyElem {
    /// Big-endian `u64`; integer order matches byte order.
    U64(u64),
    /// UTF-8 string, escaped and zero-terminated for safe concatenation.
    Str(String),
    /// Raw bytes, length-prefixed.
    Bytes(Vec<u8>),
}

const TAG_U64: u8 = 0;
const TAG_STR: u8 = 1;
const TAG_BYTES: u8 = 2;

/// Encode a tuple of key elements into its ordered byte representation.
pub fn encode_key(elems: &[KeyElem]) -> Vec<u8> {
    let mut out = Vec::new();
    for elem in elems {
        match elem {
            KeyElem::U64(v) => {
                out.push(TAG_U64);
                out.write_u64::<BigEndian>(*v).expect("vec write cannot fail");
            }
            KeyElem::Str(s) => {
                out.push(TAG_STR);
                for &b in s.as_bytes() {
                    if b == 0x00 {
                        out.push(0x00);
                        out.push(0xFF);
                    } else {
                        out.push(b);
                    }
                }
                out.push(0x00);
                out.push(0x00);
            }
            KeyElem::Bytes(b) => {
                out.push(TAG_BYTES);
                out.write_u32::<BigEndian>(b.len() as u32)
                    .expect("vec write cannot fail");
                out.extend_from_slice(b);
            }
        }
    }
    out
}

/// Key family tag `1`: sample slot `(1, metric_id, slot)`.
pub fn sample_key(metric_id: u64, slot: u32) -> Vec<u8> {
    encode_key(&[
        KeyElem::U64(1),
        KeyElem::U64(metric_id),
        KeyElem::U64(slot as u64),
    ])
}

/// Prefix covering every sample slot of `metric_id`: `(1, metric_id, *)`.
pub fn sample_range_prefix(metric_id: u64) -> Vec<u8> {
    encode_key(&[KeyElem::U64(1), KeyElem::U64(metric_id)])
}

/// Key family tag `2`: metric descriptor `(2, metric_id)`.
pub fn descriptor_key(metric_id: u64) -> Vec<u8> {
    encode_key(&[KeyElem::U64(2), KeyElem::U64(metric_id)])
}

/// Key family tag `3`: counter state `(3, metric_id)`.
pub fn counter_key(metric_id: u64) -> Vec<u8> {
    encode_key(&[KeyElem::U64(3), KeyElem::U64(metric_id)])
}

/// Key family tag `4`: name index `(4, name)`.
pub fn name_index_key(name: &str) -> Vec<u8> {
    encode_key(&[KeyElem::U64(4), KeyElem::Str(name.to_string())])
}

/// Key family tag `5`: tag index `(5, name, tag_key, tag_value)`.
pub fn tag_index_key(name: &str, tag_key: &str, tag_value: &str) -> Vec<u8> {
    encode_key(&[
        KeyElem::U64(5),
        KeyElem::Str(name.to_string()),
        KeyElem::Str(tag_key.to_string()),
        KeyElem::Str(tag_value.to_string()),
    ])
}

/// Prefix covering every tag value under `(name, tag_key)`.
pub fn tag_index_prefix(name: &str, tag_key: &str) -> Vec<u8> {
    encode_key(&[
        KeyElem::U64(5),
        KeyElem::Str(name.to_string()),
        KeyElem::Str(tag_key.to_string()),
    ])
}

/// Key family tag `6`: opaque dashboard blob `(6, slug)`.
pub fn dashboard_key(slug: &str) -> Vec<u8> {
    encode_key(&[KeyElem::U64(6), KeyElem::Str(slug.to_string())])
}

/// Internal atomic counter used to allocate fresh `metric_id`s. Lives
/// outside families `1..6` so it can never collide with a user-visible key.
pub fn next_metric_id_key() -> Vec<u8> {
    encode_key(&[KeyElem::U64(0)])
}

/// Exclusive end bound for a range scan over everything with `prefix` as a
/// byte prefix: increments the last byte that isn't already `0xFF`,
/// dropping any trailing `0xFF` bytes. Equivalent to FoundationDB's
/// `strinc`.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last == 0xFF {
            end.pop();
        } else {
            *end.last_mut().unwrap() += 1;
            return end;
        }
    }
    // All bytes were 0xFF (or prefix was empty): no finite successor: the
    // caller should treat this as "scan to the end of the keyspace".
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_byte_order_matches_integer_order() {
        assert!(encode_key(&[KeyElem::U64(1)]) < encode_key(&[KeyElem::U64(2)]));
        assert!(encode_key(&[KeyElem::U64(0xFF)]) < encode_key(&[KeyElem::U64(0x100)]));
    }

    #[test]
    fn str_byte_order_matches_lexicographic_order() {
        assert!(encode_key(&[KeyElem::Str("a".into())]) < encode_key(&[KeyElem::Str("b".into())]));
        assert!(
            encode_key(&[KeyElem::Str("a".into())]) < encode_key(&[KeyElem::Str("aa".into())])
        );
    }

    #[test]
    fn different_families_never_collide() {
        let sample = sample_key(1, 0);
        let descriptor = descriptor_key(1);
        let counter = counter_key(1);
        assert_ne!(sample, descriptor);
        assert_ne!(sample, counter);
        assert_ne!(descriptor, counter);
    }

    #[test]
    fn sample_keys_share_the_metric_prefix() {
        let prefix = sample_range_prefix(42);
        for slot in 0..10u32 {
            assert!(sample_key(42, slot).starts_with(&prefix));
        }
        assert!(!sample_key(43, 0).starts_with(&prefix));
    }

    #[test]
    fn prefix_range_end_is_exclusive_upper_bound() {
        let prefix = sample_range_prefix(7);
        let end = prefix_range_end(&prefix);
        assert!(sample_key(7, 0) >= prefix);
        assert!(sample_key(7, u32::MAX) < end);
        // Family tag 2 (descriptor) sorts after every family-1 key regardless
        // of metric id, since the family discriminant is the outermost u64.
        assert!(end < descriptor_key(7));
    }
}
