//! Cache key namespacing.
//!
//! Application keys such as `"equipment:42"` are free-form strings. Before a
//! key reaches a backend it is turned into a storage token that is safe to use
//! as a single file name and cannot collide with the token of another key.
//!
//! Escaping can triple a key's length, so tokens longer than
//! [`MAX_TOKEN_LEN`] keep a readable head and end in `~` plus the SHA-256 of
//! the full token. Escaped output never contains `~`, so hashed and plain
//! tokens cannot collide either.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Separator between the escaped prefix and the escaped key.
///
/// Escaped output never contains `.`, so the split point is unambiguous.
const SEPARATOR: char = '.';

/// Longest token used verbatim; stays well under the 255-byte file-name limit.
pub const MAX_TOKEN_LEN: usize = 200;

/// Bytes of the escaped token kept in front of the digest.
const HASHED_HEAD_LEN: usize = 128;

const DIGEST_MARKER: char = '~';

/// Maps application keys onto backend-safe storage tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    /// Create a namespace. The prefix is escaped once, up front.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: escape(prefix),
        }
    }

    /// Namespace that leaves keys unprefixed (still escaped).
    pub fn unprefixed() -> Self {
        Self::default()
    }

    /// Produce the storage token for `key`.
    pub fn namespace(&self, key: &str) -> String {
        let escaped = escape(key);
        let token = if self.prefix.is_empty() {
            escaped
        } else {
            let mut token = String::with_capacity(self.prefix.len() + 1 + escaped.len());
            token.push_str(&self.prefix);
            token.push(SEPARATOR);
            token.push_str(&escaped);
            token
        };
        shorten(token)
    }

    /// The escaped prefix, empty when unprefixed.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

/// Percent-escape every byte outside `[A-Za-z0-9_-]`.
///
/// `%` itself is escaped, which keeps the mapping injective.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for &byte in raw.as_bytes() {
        if is_safe(byte) {
            out.push(byte as char);
        } else {
            // Writing to a String cannot fail.
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Replace the tail of an overlong token with its digest.
fn shorten(token: String) -> String {
    if token.len() <= MAX_TOKEN_LEN {
        return token;
    }

    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hex::encode(hasher.finalize());

    // Escaped tokens are ASCII, so any byte offset is a char boundary.
    let mut short = String::with_capacity(HASHED_HEAD_LEN + 1 + digest.len());
    short.push_str(&token[..HASHED_HEAD_LEN]);
    short.push(DIGEST_MARKER);
    short.push_str(&digest);
    short
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn plain_keys_pass_through_with_prefix() {
        let ns = KeyNamespace::new("prod");
        assert_eq!(ns.namespace("equipments"), "prod.equipments");
    }

    #[test]
    fn unsafe_characters_are_escaped() {
        let ns = KeyNamespace::unprefixed();
        assert_eq!(ns.namespace("sms:42"), "sms%3A42");
        assert_eq!(ns.namespace("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(ns.namespace("a b"), "a%20b");
    }

    #[test]
    fn tokens_never_escape_the_directory() {
        let ns = KeyNamespace::unprefixed();
        for key in [".", "..", "/", "a/../b", "~"] {
            let token = ns.namespace(key);
            assert!(!token.contains('/'), "{token}");
            assert!(token != "." && token != "..", "{token}");
        }
    }

    #[test]
    fn distinct_keys_never_collide() {
        let ns = KeyNamespace::new("app");
        let keys = [
            "a.b", "a%2Eb", "a%2eb", "a:b", "a_b", "a-b", "A.b", "", "%", "%25", "ü", "u",
        ];
        let tokens: HashSet<String> = keys.iter().map(|key| ns.namespace(key)).collect();
        assert_eq!(tokens.len(), keys.len());
    }

    #[test]
    fn prefix_boundary_is_unambiguous() {
        let left = KeyNamespace::new("a.b").namespace("c");
        let right = KeyNamespace::new("a").namespace("b.c");
        assert_ne!(left, right);
    }

    #[test]
    fn namespacing_is_deterministic() {
        let ns = KeyNamespace::new("tenant:7");
        assert_eq!(ns.namespace("equipment:42"), ns.namespace("equipment:42"));
        assert_eq!(ns.prefix(), "tenant%3A7");
    }

    #[test]
    fn multibyte_characters_escape_per_byte() {
        let ns = KeyNamespace::unprefixed();
        assert_eq!(ns.namespace("é"), "%C3%A9");
    }

    #[test]
    fn overlong_keys_are_shortened_and_stay_distinct() {
        let ns = KeyNamespace::new("app");
        let first = ns.namespace(&"/".repeat(100));
        let second = ns.namespace(&"/".repeat(101));

        for token in [&first, &second] {
            assert!(token.len() <= MAX_TOKEN_LEN, "{}", token.len());
            assert!(token.contains(DIGEST_MARKER));
            assert!(!token.contains('/'));
        }
        assert_ne!(first, second);
        assert_eq!(first, ns.namespace(&"/".repeat(100)));
    }

    #[test]
    fn tokens_at_the_limit_are_kept_verbatim() {
        let ns = KeyNamespace::unprefixed();
        let key = "k".repeat(MAX_TOKEN_LEN);
        assert_eq!(ns.namespace(&key), key);
    }
}
