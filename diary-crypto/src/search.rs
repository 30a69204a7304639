//! Keyed search tokens.
//!
//! A token is HMAC-SHA256(salt, content) truncated to 64 bits and hex-encoded.
//! Truncation trades collision resistance for index size: tokens support
//! coarse equality lookup only and are not a security boundary.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeSet;

use crate::key::Salt;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of MAC output kept per token (16 hex chars).
pub const SEARCH_TOKEN_BYTES: usize = 8;

/// Shortest word indexed by [`keyword_tokens`].
pub const DEFAULT_MIN_WORD_LEN: usize = 2;

/// Returns the search token for `content` under the vault salt.
pub fn hash_for_search(content: &str, salt: &Salt) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(salt.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC keys may be any length"));
    mac.update(content.as_bytes());
    let digest = mac.finalize().into_bytes();
    hex::encode(&digest[..SEARCH_TOKEN_BYTES])
}

/// Splits `text` into lower-cased words and returns one token per distinct
/// word of at least `min_word_len` characters, in sorted order.
pub fn keyword_tokens(text: &str, salt: &Salt, min_word_len: usize) -> Vec<String> {
    normalized_words(text, min_word_len)
        .iter()
        .map(|word| hash_for_search(word, salt))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn normalized_words(text: &str, min_word_len: usize) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= min_word_len.max(1))
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_sixteen_hex_chars() {
        let token = hash_for_search("hello", &Salt::random());
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let salt = Salt::random();
        assert_eq!(hash_for_search("journal", &salt), hash_for_search("journal", &salt));
    }

    #[test]
    fn salt_changes_token() {
        assert_ne!(
            hash_for_search("journal", &Salt::random()),
            hash_for_search("journal", &Salt::random())
        );
    }

    #[test]
    fn content_changes_token() {
        let salt = Salt::random();
        assert_ne!(hash_for_search("journal", &salt), hash_for_search("Journal", &salt));
    }

    #[test]
    fn keywords_are_case_folded_and_deduplicated() {
        let salt = Salt::random();
        let tokens = keyword_tokens("Run, run; RUN! a", &salt, DEFAULT_MIN_WORD_LEN);
        assert_eq!(tokens, vec![hash_for_search("run", &salt)]);
    }

    #[test]
    fn empty_text_has_no_keywords() {
        assert!(keyword_tokens("  ,.; ", &Salt::random(), DEFAULT_MIN_WORD_LEN).is_empty());
    }
}
