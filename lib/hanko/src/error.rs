use strum::{AsRefStr, Display};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that abort the handling of a request
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to encode the CSRF cookie")]
    Cookie(#[from] http::header::InvalidHeaderValue),

    #[error("Failed to encrypt the CSRF cookie")]
    Encryption,

    #[error("Secure random source is unavailable")]
    Entropy(#[from] rand::Error),
}

/// Reasons a cookie envelope is not accepted
///
/// Every one of these is treated as "no secret present"
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DecodeError {
    #[error("Cookie value isn't valid base64")]
    Encoding,

    #[error("Cookie issuance time is too old")]
    Expired,

    #[error("Cookie value has an invalid length")]
    Length,

    #[error("Cookie authentication failed")]
    Signature,
}

/// Reasons a submitted masked token is malformed
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum TokenError {
    #[error("Token isn't valid base64")]
    Encoding,

    #[error("Token has an invalid length")]
    Length,
}

/// Errors raised while turning a [`Configuration`](crate::config::Configuration) into [`Options`](crate::Options)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid header name")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Trusted origin \"{0}\" is opaque")]
    OpaqueOrigin(String),

    #[error("Invalid trusted origin \"{origin}\"")]
    Origin {
        origin: String,
        #[source]
        source: url::ParseError,
    },
}

/// Reason a request got rejected
///
/// Handed to the [`FailureHandler`](crate::FailureHandler).
/// Don't expose the specific reason to the client.
#[derive(AsRefStr, Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum FailureReason {
    /// The body of a form submission couldn't be buffered
    BodyUnreadable,

    /// Declared origin is neither the request's own origin nor trusted
    OriginMismatch,

    /// No valid secret was present in the cookie
    SecretMissing,

    /// Token isn't a well-formed masked token
    TokenMalformed,

    /// Token doesn't unmask to the secret of the session
    TokenMismatch,

    /// Neither the form field nor the header carried a token
    TokenMissing,
}
