//! Error types for key storage operations

/// Errors from the settings file backing the key store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("settings parse error: {0}")]
    SettingsParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for key store operations.
pub type Result<T> = std::result::Result<T, Error>;
