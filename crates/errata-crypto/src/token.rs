//! Opaque bearer session tokens.
//!
//! Tokens are 32 random bytes, hex-encoded behind a recognizable prefix.
//! Only the SHA-256 of a token is persisted.

use sha2::{Digest, Sha256};

use crate::cipher::generate_random;

/// Prefix identifying errata session tokens.
pub const SESSION_TOKEN_PREFIX: &str = "ert_";

/// Generate a new session token.
pub fn generate_session_token() -> String {
    let bytes: [u8; 32] = generate_random();
    format!("{}{}", SESSION_TOKEN_PREFIX, hex::encode(bytes))
}

/// Lower-case hex SHA-256 of a token, as stored in the database.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check before a database lookup.
pub fn looks_like_session_token(token: &str) -> bool {
    token
        .strip_prefix(SESSION_TOKEN_PREFIX)
        .is_some_and(|rest| rest.len() == 64 && rest.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = generate_session_token();
        assert!(token.starts_with(SESSION_TOKEN_PREFIX));
        assert!(looks_like_session_token(&token));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_session_token(), generate_session_token());
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let h1 = hash_token("ert_abc");
        let h2 = hash_token("ert_abc");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_token("ert_abd"));
    }

    #[test]
    fn test_shape_check_rejects_foreign_tokens() {
        assert!(!looks_like_session_token("mm_at_123"));
        assert!(!looks_like_session_token("ert_short"));
        assert!(!looks_like_session_token(&format!("ert_{}", "z".repeat(64))));
    }
}
