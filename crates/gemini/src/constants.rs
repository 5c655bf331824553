//! Gemini API constants
//!
//! Public endpoint and storage identifiers. None of these are secrets; API keys
//! live in the key store and only ever travel in the `x-goog-api-key` header.

/// Base URL of the Generative Language API
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// API version path segment used for `generateContent`
pub const API_VERSION: &str = "v1beta";

/// Model used when a caller does not name one
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Request header carrying the API key
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// Storage key holding the JSON-encoded list of API keys
pub const KEYS_STORAGE_KEY: &str = "gemini_api_keys";

/// Storage key of the pre-pool single-key format, migrated on first read
pub const LEGACY_KEY_STORAGE_KEY: &str = "gemini_api_key";
