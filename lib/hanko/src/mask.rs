//! One-time-pad masking of the base secret
//!
//! A masked token is `pad || (pad ^ secret)`. Every issuance draws a fresh pad,
//! so the bytes reflected into a response never repeat even though the secret stays the same.
//! This defeats compression oracles (BREACH) while still allowing any number of
//! concurrently issued tokens to verify against one secret.

use crate::{secret, Result, Secret, TokenError, MASKED_TOKEN_LEN, SECRET_LEN};
use zeroize::Zeroizing;

/// One-time pad
pub type Pad = [u8; SECRET_LEN];

/// Masked token before text encoding
pub type MaskedToken = [u8; MASKED_TOKEN_LEN];

#[inline]
fn xor(lhs: &[u8], rhs: &[u8]) -> [u8; SECRET_LEN] {
    let mut out = [0; SECRET_LEN];
    for ((out, lhs), rhs) in out.iter_mut().zip(lhs).zip(rhs) {
        *out = lhs ^ rhs;
    }
    out
}

/// Draw a fresh pad from the secure random source
#[inline]
pub fn generate_pad() -> Result<Pad> {
    let mut pad = [0; SECRET_LEN];
    secret::fill_random(&mut pad)?;
    Ok(pad)
}

/// Mask the secret with the pad
#[must_use]
pub fn mask(secret: &Secret, pad: &Pad) -> MaskedToken {
    let mut token = [0; MASKED_TOKEN_LEN];
    let (head, tail) = token.split_at_mut(SECRET_LEN);
    head.copy_from_slice(pad);
    tail.copy_from_slice(&xor(pad, secret.as_bytes()));
    token
}

/// Recover the secret from a masked token
///
/// Anything that isn't exactly [`MASKED_TOKEN_LEN`] bytes long is rejected
pub fn unmask(token: &[u8]) -> Result<Secret, TokenError> {
    if token.len() != MASKED_TOKEN_LEN {
        return Err(TokenError::Length);
    }

    let (pad, masked) = token.split_at(SECRET_LEN);
    Ok(Secret::from_bytes(xor(pad, masked)))
}

/// Text-encode a masked token for transport
#[inline]
#[must_use]
pub fn encode_token(token: &MaskedToken) -> String {
    base64_simd::STANDARD.encode_to_string(token)
}

/// Decode and unmask a submitted token
pub fn decode_token(text: &str) -> Result<Secret, TokenError> {
    let raw = base64_simd::STANDARD
        .decode_to_vec(text.trim())
        .map(Zeroizing::new)
        .map_err(|_| TokenError::Encoding)?;

    unmask(&raw)
}

/// Produce a freshly masked, text-encoded token for the secret
#[inline]
pub fn issue(secret: &Secret) -> Result<String> {
    let pad = Zeroizing::new(generate_pad()?);
    Ok(encode_token(&mask(secret, &pad)))
}
