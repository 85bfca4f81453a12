//! Cookie envelope for the base secret
//!
//! Authenticated layout (before base64url encoding):
//!
//! ```text
//! [8 bytes: issuance time, unix seconds, big-endian][32 bytes: secret][32 bytes: keyed BLAKE3 tag]
//! tag = BLAKE3-keyed(auth_key, cookie_name || "|" || issuance_time || secret)
//! ```
//!
//! Encrypted layout (before base64url encoding):
//!
//! ```text
//! [24 bytes: random nonce][XChaCha20-Poly1305(issuance_time || secret), AAD = cookie_name]
//! ```
//!
//! Binding the cookie name into the tag stops the value from being replayed under another cookie

use crate::{secret, DecodeError, Error, Key, Result, Secret, SECRET_LEN};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const AUTHENTICATION_CONTEXT: &str = "hanko 2024-11-02 csrf cookie authentication";
const ENCRYPTION_CONTEXT: &str = "hanko 2024-11-02 csrf cookie encryption";

const TIMESTAMP_LEN: usize = 8;
const PAYLOAD_LEN: usize = TIMESTAMP_LEN + SECRET_LEN;
const TAG_LEN: usize = blake3::OUT_LEN;
const NONCE_LEN: usize = 24;
const AEAD_TAG_LEN: usize = 16;

const SIGNED_LEN: usize = PAYLOAD_LEN + TAG_LEN;
const ENCRYPTED_LEN: usize = NONCE_LEN + PAYLOAD_LEN + AEAD_TAG_LEN;

#[inline]
fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Authenticated (and optionally encrypted) encoding of the base secret
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretCodec {
    auth_key: [u8; Key::LEN],
    encryption_key: Option<[u8; Key::LEN]>,
    #[zeroize(skip)]
    cookie_name: Box<str>,
    #[zeroize(skip)]
    max_age: Option<Duration>,
}

impl SecretCodec {
    /// Construct a codec bound to the key and the cookie name
    ///
    /// `max_age` bounds how old an accepted envelope may be. `None` disables the check.
    #[must_use]
    pub fn new(key: &Key, cookie_name: &str, max_age: Option<Duration>, encrypt: bool) -> Self {
        Self {
            auth_key: key.subkey(AUTHENTICATION_CONTEXT),
            encryption_key: encrypt.then(|| key.subkey(ENCRYPTION_CONTEXT)),
            cookie_name: cookie_name.into(),
            max_age,
        }
    }

    fn tag(&self, payload: &[u8]) -> blake3::Hash {
        blake3::Hasher::new_keyed(&self.auth_key)
            .update(self.cookie_name.as_bytes())
            .update(b"|")
            .update(payload)
            .finalize()
    }

    /// Encode the secret, stamped with the issuance time
    pub fn encode(&self, secret: &Secret, now: SystemTime) -> Result<String> {
        let mut payload = Zeroizing::new([0_u8; PAYLOAD_LEN]);
        payload[..TIMESTAMP_LEN].copy_from_slice(&unix_seconds(now).to_be_bytes());
        payload[TIMESTAMP_LEN..].copy_from_slice(secret.as_bytes());

        let envelope = if let Some(ref encryption_key) = self.encryption_key {
            let cipher = XChaCha20Poly1305::new(encryption_key.into());

            let mut nonce = [0_u8; NONCE_LEN];
            secret::fill_random(&mut nonce)?;

            let ciphertext = cipher
                .encrypt(
                    XNonce::from_slice(&nonce),
                    Payload {
                        msg: payload.as_slice(),
                        aad: self.cookie_name.as_bytes(),
                    },
                )
                .map_err(|_| Error::Encryption)?;

            let mut envelope = Vec::with_capacity(ENCRYPTED_LEN);
            envelope.extend_from_slice(&nonce);
            envelope.extend_from_slice(&ciphertext);
            envelope
        } else {
            let tag = self.tag(payload.as_slice());

            let mut envelope = Vec::with_capacity(SIGNED_LEN);
            envelope.extend_from_slice(payload.as_slice());
            envelope.extend_from_slice(tag.as_bytes());
            envelope
        };

        Ok(base64_simd::URL_SAFE_NO_PAD.encode_to_string(envelope))
    }

    /// Decode an envelope previously produced by [`SecretCodec::encode`]
    ///
    /// Fails closed: any corruption, forgery, or expiry results in an error, never a different secret
    pub fn decode(&self, value: &str, now: SystemTime) -> Result<Secret, DecodeError> {
        let raw = base64_simd::URL_SAFE_NO_PAD
            .decode_to_vec(value)
            .map(Zeroizing::new)
            .map_err(|_| DecodeError::Encoding)?;

        let payload = if let Some(ref encryption_key) = self.encryption_key {
            if raw.len() != ENCRYPTED_LEN {
                return Err(DecodeError::Length);
            }

            let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
            let cipher = XChaCha20Poly1305::new(encryption_key.into());
            let plaintext = cipher
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: self.cookie_name.as_bytes(),
                    },
                )
                .map(Zeroizing::new)
                .map_err(|_| DecodeError::Signature)?;

            let mut payload = Zeroizing::new([0_u8; PAYLOAD_LEN]);
            payload.copy_from_slice(&plaintext);
            payload
        } else {
            if raw.len() != SIGNED_LEN {
                return Err(DecodeError::Length);
            }

            let (payload_bytes, tag) = raw.split_at(PAYLOAD_LEN);
            let mut provided_tag = [0_u8; TAG_LEN];
            provided_tag.copy_from_slice(tag);

            // The `PartialEq` implementation on `Hash` is constant-time
            if self.tag(payload_bytes) != provided_tag {
                return Err(DecodeError::Signature);
            }

            let mut payload = Zeroizing::new([0_u8; PAYLOAD_LEN]);
            payload.copy_from_slice(payload_bytes);
            payload
        };

        let mut timestamp = [0; TIMESTAMP_LEN];
        timestamp.copy_from_slice(&payload[..TIMESTAMP_LEN]);
        let issued_at = u64::from_be_bytes(timestamp);

        if let Some(max_age) = self.max_age {
            if issued_at.saturating_add(max_age.as_secs()) < unix_seconds(now) {
                return Err(DecodeError::Expired);
            }
        }

        let mut secret = [0_u8; SECRET_LEN];
        secret.copy_from_slice(&payload[TIMESTAMP_LEN..]);
        let decoded = Secret::from_bytes(secret);
        secret.zeroize();

        Ok(decoded)
    }
}
