use crate::{secret, Result};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key material used to authenticate (and optionally encrypt) the CSRF cookie
///
/// The subkeys actually used for the cookie are derived from this key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; Key::LEN]);

impl Key {
    pub const LEN: usize = blake3::KEY_LEN;

    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a key from arbitrary key material
    ///
    /// The context string should be hardcoded, globally unique, and application-specific
    #[inline]
    #[must_use]
    pub fn derive(context: &str, material: &[u8]) -> Self {
        Self(blake3::derive_key(context, material))
    }

    /// Generate a random key
    ///
    /// Cookies issued with a random key don't survive restarts
    #[inline]
    pub fn generate() -> Result<Self> {
        let mut bytes = [0; Self::LEN];
        secret::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    #[inline]
    pub(crate) fn subkey(&self, context: &str) -> [u8; Self::LEN] {
        blake3::derive_key(context, &self.0)
    }
}

impl From<[u8; Key::LEN]> for Key {
    #[inline]
    fn from(value: [u8; Key::LEN]) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").finish_non_exhaustive()
    }
}
