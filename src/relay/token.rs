//! Short token generation
//!
//! Tokens are four characters drawn uniformly from `[a-zA-Z]`, giving a
//! keyspace of 52^4 (about 7.3M). Uniqueness is enforced by retrying
//! against the current mapping snapshot.

use rand::Rng;

use super::store::Mapping;

pub const TOKEN_LEN: usize = 4;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a token with the given random source
pub fn generate_with<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// Generate a token that is not already a key of `existing`
///
/// There is no retry bound; collisions are rare at the volumes this relay
/// is meant for.
pub fn generate_unique(existing: &Mapping) -> String {
    generate_unique_with(existing, &mut rand::thread_rng())
}

pub fn generate_unique_with<R: Rng>(existing: &Mapping, rng: &mut R) -> String {
    loop {
        let token = generate_with(rng);
        if !existing.contains_key(&token) {
            return token;
        }
    }
}

/// Recover the bare token from a link segment (`"AbCd.mp4"` -> `"AbCd"`)
pub fn strip_suffix(segment: &str) -> &str {
    segment.split('.').next().unwrap_or(segment)
}
