//! Secret wrapper for sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Number of trailing characters shown by [`Secret::hint`].
const HINT_CHARS: usize = 4;

/// Sensitive value - redacted in Debug/Display/logs
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Short identifier safe for logs and admin listings: `…` followed by the
    /// last four characters. Values of four characters or fewer are fully masked.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= HINT_CHARS {
            return "…".to_string();
        }
        let tail: String = chars[chars.len() - HINT_CHARS..].iter().collect();
        format!("…{tail}")
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacts_debug() {
        let secret = Secret::new(String::from("AIzaSyExampleKey"));
        let debug = format!("{:?}", secret);
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("AIzaSyExampleKey"));
    }

    #[test]
    fn test_secret_exposes_value() {
        let secret = Secret::new(String::from("AIzaSyExampleKey"));
        assert_eq!(secret.expose(), "AIzaSyExampleKey");
    }

    #[test]
    fn test_hint_shows_only_tail() {
        let secret = Secret::new(String::from("AIzaSyExampleKey"));
        assert_eq!(secret.hint(), "…eKey");
    }

    #[test]
    fn test_hint_masks_short_values() {
        assert_eq!(Secret::new(String::from("abcd")).hint(), "…");
        assert_eq!(Secret::new(String::new()).hint(), "…");
    }
}
