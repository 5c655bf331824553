//! Caller-facing generation operations
//!
//! `GenerationClient` is what handlers hold: text generation goes through the
//! pool's failover loop, image generation is a placeholder until an image
//! model is wired in and does not touch the pool.

use std::sync::Arc;

use provider::GenerativeClient;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::pool::KeyPool;

/// Images returned by `generate_image` until a real image model is used.
pub const PLACEHOLDER_IMAGES: [&str; 2] = [
    "https://via.placeholder.com/1024x1024?text=Generated+Image+1",
    "https://via.placeholder.com/1024x1024?text=Generated+Image+2",
];

/// Text and image generation over a shared key pool.
pub struct GenerationClient<H> {
    pool: Arc<KeyPool<H>>,
    default_model: String,
}

impl<H> Clone for GenerationClient<H> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            default_model: self.default_model.clone(),
        }
    }
}

impl<H: GenerativeClient + Clone> GenerationClient<H> {
    pub fn new(pool: Arc<KeyPool<H>>, default_model: impl Into<String>) -> Self {
        Self {
            pool,
            default_model: default_model.into(),
        }
    }

    /// The pool this client draws keys from.
    pub fn pool(&self) -> &Arc<KeyPool<H>> {
        &self.pool
    }

    /// Model used when callers pass `None`.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Generate a text completion for `prompt` with `model` (or the default),
    /// failing over between keys on rate limits.
    #[instrument(skip_all, fields(model = model.unwrap_or(self.default_model.as_str()), prompt_len = prompt.len()))]
    pub async fn generate_text(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(&self.default_model);
        self.pool
            .invoke(|client: H| async move { client.generate_text(model, prompt).await })
            .await
    }

    /// Placeholder image generation: always the two [`PLACEHOLDER_IMAGES`].
    pub async fn generate_image(&self, prompt: &str) -> Vec<String> {
        debug!(prompt_len = prompt.len(), "image generation is a placeholder");
        PLACEHOLDER_IMAGES.iter().map(|s| s.to_string()).collect()
    }
}
