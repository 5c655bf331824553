//! API key pool with rate-limit failover
//!
//! Holds the user's API keys in insertion order with a round-robin cursor and
//! runs generation calls against them. A call that the upstream rejects for
//! quota or throughput reasons is retried on the next key, at most once per
//! key; any other failure is returned immediately.
//!
//! Invocation lifecycle:
//! 1. Caller hands `invoke` an operation over a client handle
//! 2. Pool yields the handle at the cursor
//! 3. Success → cursor advances (spreads load), result returned
//! 4. Rate-limit failure → cursor advances, next key tried
//! 5. Any other failure → returned unchanged
//! 6. Every key rate limited → `RateLimitExhausted`

pub mod error;
pub mod generate;
pub mod invoker;
pub mod pool;
pub mod quota;

pub use error::{Error, Result};
pub use generate::{GenerationClient, PLACEHOLDER_IMAGES};
pub use pool::{KeyHint, KeyPool, SelectedKey};
pub use quota::{classify, classify_error};
