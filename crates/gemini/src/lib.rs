//! Google Gemini client library
//!
//! Provides the per-key HTTP client for `generateContent` and the file-backed
//! key store that persists the user's API keys. This crate has no dependency
//! on the pool or the service binary and can be tested on its own.
//!
//! Key flow:
//! 1. Service opens `keystore::KeyStore` and reads keys via `load_keys()`
//!    (legacy single-key settings are migrated here)
//! 2. Admin API adds/removes keys via `save_key()` / `remove_key()`
//! 3. The pool builds one `client::GeminiClient` per key

pub mod client;
pub mod constants;
pub mod error;
pub mod keystore;

pub use client::GeminiClient;
pub use constants::*;
pub use error::{Error, Result};
pub use keystore::KeyStore;
