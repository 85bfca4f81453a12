use crate::{Result, SECRET_LEN};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fill the buffer from the operating system's random source
///
/// Failure is fatal for the request; there is no weaker fallback
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|error| {
        error!(?error, "failed to gather entropy");
        error.into()
    })
}

/// Per-session base secret
///
/// Comparisons are constant-time, the bytes are wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    /// Mint a new secret
    #[inline]
    pub fn generate() -> Result<Self> {
        let mut bytes = [0; SECRET_LEN];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl PartialEq for Secret {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").finish_non_exhaustive()
    }
}
