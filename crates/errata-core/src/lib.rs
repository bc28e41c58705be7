//! # errata-core
//!
//! Core types, traits, and abstractions for the errata notebook.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other errata crates depend on.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod models;
pub mod quota;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{content_type_for, is_image, resolve_within, upload_extension};
pub use models::*;
pub use quota::{exhausted_message, quota_warnings};
pub use traits::*;
