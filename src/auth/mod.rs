//! Authentication: admin key, session tokens, passwords, login backends and
//! request extractors.

pub mod backends;
mod extractor;
pub mod password;
pub mod session;
pub mod throttle;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

pub use extractor::{AuthUser, Caller, CurrentUser, MaybeUser};

/// Wrapper type for the bootstrap admin key.
/// Uses `SecretString` to prevent accidental logging and zeroize on drop.
///
/// # Security features
/// - `Debug` prints `[REDACTED]` instead of the actual value
/// - Memory is zeroed when dropped (via `zeroize`)
/// - Explicit `.expose_secret()` required to access the value
#[derive(Clone)]
pub struct AdminKey(Option<SecretString>);

impl AdminKey {
    /// Create a new AdminKey from an optional string.
    pub fn new(key: Option<String>) -> Self {
        Self(key.map(SecretString::from))
    }

    /// Securely compare the provided key with the stored admin key.
    ///
    /// `ConstantTimeEq` returns false for unequal lengths without an early
    /// exit, so the comparison leaks neither content nor length.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            Some(secret) => {
                let expected = secret.expose_secret();
                expected.as_bytes().ct_eq(provided.as_bytes()).into()
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "AdminKey([REDACTED])"),
            None => write!(f, "AdminKey(None)"),
        }
    }
}
