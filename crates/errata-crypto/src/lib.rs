//! # errata-crypto
//!
//! Cryptographic primitives for the errata notebook.
//!
//! - **Secret sealing**: AES-256-GCM for users' stored OpenRouter keys
//! - **Passwords**: Argon2id in PHC string format
//! - **Sessions**: random bearer tokens, persisted only as SHA-256 hashes
//!
//! ## Example
//!
//! ```rust
//! use errata_crypto::{hash_password, verify_password, ApiKeyCipher};
//!
//! let cipher = ApiKeyCipher::generate();
//! let sealed = cipher.seal("sk-or-v1-example").unwrap();
//! assert_eq!(cipher.open(&sealed).unwrap(), "sk-or-v1-example");
//!
//! let hash = hash_password("correct horse").unwrap();
//! assert!(verify_password("correct horse", &hash).unwrap());
//! ```

pub mod cipher;
pub mod error;
pub mod password;
pub mod token;

pub use cipher::ApiKeyCipher;
pub use error::{CryptoError, CryptoResult};
pub use password::{hash_password, verify_password};
pub use token::{generate_session_token, hash_token, looks_like_session_token};
