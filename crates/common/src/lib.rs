//! Common types for Content Studio

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
