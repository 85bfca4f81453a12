//! Classification and verification of incoming requests
//!
//! Transitions:
//!
//! ```text
//! Pending -> SafeBypass | Skipped                          -> Allow
//! Pending -> SecretMissing | OriginMismatch                 -> Reject
//! Pending -> TokenMissing | TokenMalformed | TokenMismatch  -> Reject
//! Pending -> Verified                                       -> Allow
//! ```

use crate::{handle::Provenance, CsrfHandle, FailureReason, Options, SkipCheck};
use bytes::Bytes;
use http::{header, request, HeaderMap, Method, Uri};
use std::{borrow::Cow, convert::Infallible};
use url::{Origin, Url};

/// Methods exempt from verification
static SAFE_METHODS: [Method; 4] = [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE];

/// Terminal state of the verification
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Method is safe, nothing to verify
    SafeBypass,

    /// Verification was skipped through [`SkipCheck`]
    Skipped,

    /// Token matched the secret
    Verified,

    /// Request has to be rejected
    Rejected(FailureReason),
}

/// Result of the checks that don't need the token
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Verification finished early
    Terminal(Outcome),

    /// The token has to be looked up and compared
    NeedsToken,
}

#[inline]
#[must_use]
pub fn is_safe_method(method: &Method) -> bool {
    SAFE_METHODS.contains(method)
}

/// Encoding of a form body the token field can be read from
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormKind {
    UrlEncoded,
    Multipart { boundary: String },
}

/// Classify the body by its content type
///
/// Multipart bodies without a boundary can't be parsed and aren't treated as forms.
#[must_use]
pub fn form_kind(headers: &HeaderMap) -> Option<FormKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime: mime::Mime = content_type.parse().ok()?;

    if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
        Some(FormKind::UrlEncoded)
    } else if mime.essence_str() == mime::MULTIPART_FORM_DATA.essence_str() {
        let boundary = mime.get_param(mime::BOUNDARY)?;
        Some(FormKind::Multipart {
            boundary: boundary.as_str().to_owned(),
        })
    } else {
        None
    }
}

/// Value of the token field in a url-encoded form
#[must_use]
pub fn form_field(options: &Options, body: &[u8]) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
        .inspect_err(|error| debug!(?error, "failed to parse form body"))
        .ok()?
        .into_iter()
        .find(|(name, value)| name == options.field_name() && !value.is_empty())
        .map(|(_, value)| value)
}

/// Value of the token field in a buffered multipart form
pub async fn multipart_field(body: Bytes, boundary: String, field_name: String) -> Option<String> {
    let stream = futures_util::stream::iter([Ok::<_, Infallible>(body)]);
    let mut multipart = multer::Multipart::new(stream, boundary);

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return None,
            Err(error) => {
                debug!(?error, "failed to parse multipart body");
                return None;
            }
        };

        if field.name() != Some(field_name.as_str()) {
            continue;
        }

        match field.text().await {
            Ok(value) if !value.is_empty() => return Some(value),
            Ok(..) => {}
            Err(error) => {
                debug!(?error, "failed to read multipart field");
                return None;
            }
        }
    }
}

fn parse_origin(value: &str) -> Option<Origin> {
    let origin = Url::parse(value).ok()?.origin();
    origin.is_tuple().then_some(origin)
}

/// Origin the request declares, taken from `Origin` and falling back to `Referer`
///
/// `None` if neither header is present.
/// `Some(None)` if a header is present but doesn't carry a usable origin.
fn declared_origin(headers: &HeaderMap) -> Option<Option<Origin>> {
    let value = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))?;

    Some(value.to_str().ok().and_then(parse_origin))
}

/// Origin of the request itself
fn own_origin(uri: &Uri, headers: &HeaderMap, plaintext_http: bool) -> Option<Origin> {
    let scheme = uri
        .scheme_str()
        .unwrap_or(if plaintext_http { "http" } else { "https" });

    let authority = match uri.authority() {
        Some(authority) => authority.as_str(),
        None => headers.get(header::HOST)?.to_str().ok()?,
    };

    parse_origin(&format!("{scheme}://{authority}"))
}

/// Compare the declared origin to the request's own origin and the trusted origins
pub fn check_origin(
    options: &Options,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<(), FailureReason> {
    let Some(declared) = declared_origin(headers) else {
        return Ok(());
    };

    let Some(declared) = declared else {
        debug!("unparseable declared origin");
        return Err(FailureReason::OriginMismatch);
    };

    let own = own_origin(uri, headers, options.plaintext_http());
    if own.as_ref() == Some(&declared) || options.trusted_origins().contains(&declared) {
        return Ok(());
    }

    // Nothing to compare against
    if own.is_none() && options.trusted_origins().is_empty() {
        return Ok(());
    }

    debug!(origin = %declared.ascii_serialization(), "untrusted origin");
    Err(FailureReason::OriginMismatch)
}

/// Find the submitted token
///
/// The form field takes precedence over the header. Empty values are ignored.
pub fn extract_token<'a>(
    options: &Options,
    headers: &'a HeaderMap,
    form_value: Option<String>,
) -> Option<Cow<'a, str>> {
    let from_form = form_value
        .filter(|value| !value.is_empty())
        .map(Cow::Owned);

    from_form.or_else(|| {
        headers
            .get(options.header_name())
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(Cow::Borrowed)
    })
}

/// Run the checks preceding the token lookup
#[instrument(skip_all, fields(method = %parts.method))]
pub fn preflight(parts: &request::Parts, handle: &CsrfHandle) -> Stage {
    if is_safe_method(&parts.method) {
        trace!(method = %parts.method, "safe method");
        return Stage::Terminal(Outcome::SafeBypass);
    }

    if parts.extensions.get::<SkipCheck>().is_some() {
        trace!("verification skipped");
        return Stage::Terminal(Outcome::Skipped);
    }

    if handle.provenance() != Provenance::Cookie {
        return Stage::Terminal(Outcome::Rejected(FailureReason::SecretMissing));
    }

    let options = &handle.guard().options;
    if let Err(reason) = check_origin(options, &parts.uri, &parts.headers) {
        return Stage::Terminal(Outcome::Rejected(reason));
    }

    Stage::NeedsToken
}

/// Look up the submitted token and compare it to the secret
///
/// `form_value` is the token field of the already parsed form body, if any.
#[instrument(skip_all)]
pub fn verify_token(
    headers: &HeaderMap,
    form_value: Option<String>,
    handle: &CsrfHandle,
) -> Outcome {
    let options = &handle.guard().options;
    let Some(candidate) = extract_token(options, headers, form_value) else {
        return Outcome::Rejected(FailureReason::TokenMissing);
    };

    match handle.verify(&candidate) {
        Ok(()) => Outcome::Verified,
        Err(reason) => Outcome::Rejected(reason),
    }
}
