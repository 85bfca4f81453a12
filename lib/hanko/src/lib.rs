#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

use http::Request;

pub use self::{
    error::{ConfigError, DecodeError, Error, FailureReason, Result, TokenError},
    failure::{failure_fn, DefaultFailureHandler, FailureFn, FailureHandler},
    future::ResponseFuture,
    handle::{CsrfHandle, TemplateField},
    key::Key,
    layer::CsrfLayer,
    options::Options,
    secret::Secret,
    service::CsrfService,
};

mod error;
mod failure;
mod future;
mod handle;
mod key;
mod layer;
mod options;
mod secret;
mod service;

pub mod codec;
pub mod config;
pub mod mask;
pub mod verify;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Length of the base secret and of the one-time pad, in bytes
pub const SECRET_LEN: usize = 32;

/// Length of a masked token before it is text-encoded
pub const MASKED_TOKEN_LEN: usize = SECRET_LEN * 2;

/// Marker which exempts a request from token verification
///
/// The [`CsrfHandle`] is still attached to requests carrying this marker,
/// so a token can be issued for the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct SkipCheck;

/// Exempt the request from token verification
///
/// This has to be called by a layer sitting *outside* of the [`CsrfLayer`].
/// Use it for endpoints authenticated by other means (API tokens, webhooks with signatures, etc.)
#[inline]
pub fn unsafe_skip_check<B>(req: &mut Request<B>) {
    req.extensions_mut().insert(SkipCheck);
}
