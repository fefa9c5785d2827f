// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Stable issue ID generation: `<prefix>-<token>` where `token` is a
//! base36 digest with a length chosen adaptively so the birthday-bound
//! collision probability at the store's current issue count stays below a
//! fixed threshold.

use num_bigint::BigUint;
use num_traits::Zero;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: u32 = 36;

/// Collision probability threshold below which a token length is accepted.
const COLLISION_THRESHOLD: f64 = 1e-6;

/// Minimum and maximum token lengths ever produced.
const MIN_TOKEN_LEN: usize = 4;
const MAX_TOKEN_LEN: usize = 12;

/// Encodes `n` as a lowercase base36 string, left-padded with `0` to
/// `min_len` characters.
pub fn encode_base36(n: &BigUint, min_len: usize) -> String {
    if n.is_zero() {
        return "0".repeat(min_len.max(1));
    }

    let base = BigUint::from(BASE);
    let mut digits = Vec::new();
    let mut value = n.clone();
    while !value.is_zero() {
        let remainder = (&value % &base).to_u32_digits().first().copied().unwrap_or(0);
        digits.push(ALPHABET[remainder as usize] as char);
        value = &value / &base;
    }
    while digits.len() < min_len {
        digits.push('0');
    }
    digits.reverse();
    digits.into_iter().collect()
}

/// Approximate birthday-bound collision probability for `count` items drawn
/// from a space of `36^token_len` possible tokens.
pub fn collision_probability(token_len: usize, count: u64) -> f64 {
    let space = (BASE as f64).powi(token_len as i32);
    if count == 0 {
        return 0.0;
    }
    // 1 - exp(-n^2 / (2*space)), the standard birthday-bound approximation.
    let n = count as f64;
    1.0 - (-(n * n) / (2.0 * space)).exp()
}

/// Chooses the shortest token length whose collision probability at
/// `existing_count` stays under [`COLLISION_THRESHOLD`], bounded to
/// `[MIN_TOKEN_LEN, MAX_TOKEN_LEN]`.
pub fn compute_adaptive_length(existing_count: u64) -> usize {
    for len in MIN_TOKEN_LEN..=MAX_TOKEN_LEN {
        if collision_probability(len, existing_count) < COLLISION_THRESHOLD {
            return len;
        }
    }
    MAX_TOKEN_LEN
}

/// Generates a base36 token by hashing the issue's creation context.
///
/// `nonce` is extra entropy (a counter or random value) a caller supplies
/// to re-roll the token if a generated ID collides with an existing one.
pub fn generate_token(
    prefix: &str,
    title: &str,
    actor: &str,
    timestamp_nanos: i64,
    nonce: u64,
    length: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(title.as_bytes());
    hasher.update(actor.as_bytes());
    hasher.update(timestamp_nanos.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();

    let n = BigUint::from_bytes_be(&digest);
    let token = encode_base36(&n, length);
    // Truncate to the requested length from the right so leading-zero
    // padding introduced by encode_base36 never shortens the effective
    // entropy below `length` significant characters.
    let start = token.len().saturating_sub(length);
    token[start..].to_string()
}

/// Generates a full `<prefix>-<token>` issue ID.
pub fn generate_issue_id(
    prefix: &str,
    title: &str,
    actor: &str,
    timestamp_nanos: i64,
    existing_count: u64,
    nonce: u64,
) -> String {
    let length = compute_adaptive_length(existing_count);
    let token = generate_token(prefix, title, actor, timestamp_nanos, nonce, length);
    format!("{prefix}-{token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_round_trip_zero() {
        let n = BigUint::from(0u32);
        assert_eq!(encode_base36(&n, 4), "0000");
    }

    #[test]
    fn base36_encodes_known_value() {
        let n = BigUint::from(36u32);
        assert_eq!(encode_base36(&n, 1), "10");
    }

    #[test]
    fn adaptive_length_grows_with_count() {
        let small = compute_adaptive_length(10);
        let large = compute_adaptive_length(10_000_000);
        assert!(large >= small);
        assert!(small >= MIN_TOKEN_LEN);
        assert!(large <= MAX_TOKEN_LEN);
    }

    #[test]
    fn generate_issue_id_has_prefix() {
        let id = generate_issue_id("bd", "Fix login", "alice", 123, 0, 0);
        assert!(id.starts_with("bd-"));
    }

    #[test]
    fn distinct_nonce_changes_token() {
        let a = generate_issue_id("bd", "Fix login", "alice", 123, 0, 0);
        let b = generate_issue_id("bd", "Fix login", "alice", 123, 0, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn collision_probability_increases_with_count() {
        let low = collision_probability(6, 10);
        let high = collision_probability(6, 1_000_000);
        assert!(high > low);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn generated_id_always_has_prefix_and_length(
            prefix in "[a-z]{1,10}",
            title in "\\PC{1,100}",
            actor in "[a-z]{1,10}",
            timestamp in 0i64..i64::MAX,
            existing_count in 0u64..10_000_000u64,
            nonce in 0u64..1000u64,
        ) {
            let id = generate_issue_id(&prefix, &title, &actor, timestamp, existing_count, nonce);
            prop_assert!(id.starts_with(&format!("{prefix}-")));
            let token = &id[prefix.len() + 1..];
            let expected_len = compute_adaptive_length(existing_count);
            prop_assert_eq!(token.len(), expected_len);
            prop_assert!(token.chars().all(|c| ALPHABET.contains(&(c as u8))));
        }

        #[test]
        fn same_inputs_are_deterministic(
            prefix in "[a-z]{1,10}",
            title in "\\PC{1,100}",
            actor in "[a-z]{1,10}",
            timestamp in 0i64..i64::MAX,
            nonce in 0u64..1000u64,
        ) {
            let a = generate_issue_id(&prefix, &title, &actor, timestamp, 0, nonce);
            let b = generate_issue_id(&prefix, &title, &actor, timestamp, 0, nonce);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn adaptive_length_never_leaves_bounds(existing_count in 0u64..100_000_000u64) {
            let len = compute_adaptive_length(existing_count);
            prop_assert!((MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&len));
        }
    }
}
