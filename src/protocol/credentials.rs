//! # Credentials
//!
//! Secret carried by guarded mutations. Compared in constant time and
//! never printed.

use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Constant-time comparison against the configured secret.
    pub fn matches(&self, configured: &str) -> bool {
        self.0.as_bytes().ct_eq(configured.as_bytes()).into()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let credentials = Credentials::new("42");
        assert!(credentials.matches("42"));
        assert!(!credentials.matches("43"));
        assert!(!credentials.matches("420"));
        assert!(!credentials.matches(""));
    }

    #[test]
    fn test_debug_hides_secret() {
        assert_eq!(format!("{:?}", Credentials::new("secret")), "Credentials(***)");
    }
}
