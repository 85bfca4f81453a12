use crate::{layer::Guard, mask, FailureReason, Result, Secret};
use cookie::Cookie;
use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};
use triomphe::Arc;

/// Where the secret of the current request came from
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Provenance {
    /// Decoded from a valid cookie
    Cookie,

    /// No valid cookie was present, a new secret was minted
    Minted,

    /// Replaced through [`CsrfHandle::regenerate`]
    Rotated,
}

pub(crate) struct Shared {
    secret: Secret,
    provenance: Provenance,
    issued: bool,
}

/// Handle to the CSRF state of the current request
///
/// Inserted into the request's extensions by the [`CsrfService`](crate::CsrfService).
/// Cloning is cheap, all clones refer to the same state.
#[derive(Clone)]
pub struct CsrfHandle {
    inner: Arc<Mutex<Shared>>,
    guard: Arc<Guard>,
}

impl CsrfHandle {
    /// Load the secret from the cookie value or mint a new one
    pub(crate) fn load(
        guard: Arc<Guard>,
        cookie_value: Option<&str>,
        now: SystemTime,
    ) -> Result<Self> {
        let decoded = cookie_value.and_then(|value| match guard.codec.decode(value, now) {
            Ok(secret) => Some(secret),
            Err(error) => {
                debug!(%error, "discarding csrf cookie");
                None
            }
        });

        let (secret, provenance) = match decoded {
            Some(secret) => (secret, Provenance::Cookie),
            None => (Secret::generate()?, Provenance::Minted),
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Shared {
                secret,
                provenance,
                issued: false,
            })),
            guard,
        })
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn guard(&self) -> &Guard {
        &self.guard
    }

    #[inline]
    pub(crate) fn provenance(&self) -> Provenance {
        self.lock().provenance
    }

    /// Mask the secret with a fresh pad
    ///
    /// Every call returns a different token. All of them verify as long as the secret isn't rotated.
    #[inline]
    pub fn token(&self) -> Result<String> {
        let mut state = self.lock();
        let token = mask::issue(&state.secret)?;
        state.issued = true;

        Ok(token)
    }

    /// Hidden form field carrying a fresh token
    #[inline]
    pub fn template_field(&self) -> Result<TemplateField> {
        Ok(TemplateField {
            key: self.guard.options.template_key().to_owned(),
            field_name: self.guard.options.field_name().to_owned(),
            token: self.token()?,
        })
    }

    /// Replace the secret with a new one
    ///
    /// Call this after privilege changes (e.g. login). Every previously issued token stops verifying.
    #[inline]
    pub fn regenerate(&self) -> Result<()> {
        let secret = Secret::generate()?;

        let mut state = self.lock();
        state.secret = secret;
        state.provenance = Provenance::Rotated;
        state.issued = false;

        Ok(())
    }

    /// Whether the secret has to be written to the response
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.provenance() != Provenance::Cookie
    }

    /// Whether a token was issued from the current secret
    #[inline]
    #[must_use]
    pub fn is_issued(&self) -> bool {
        self.lock().issued
    }

    /// Unmask the candidate and compare it to the secret
    pub(crate) fn verify(&self, candidate: &str) -> Result<(), FailureReason> {
        let submitted = mask::decode_token(candidate).map_err(|error| {
            debug!(%error, "malformed csrf token");
            FailureReason::TokenMalformed
        })?;

        // `Secret` compares in constant-time
        if submitted == self.lock().secret {
            Ok(())
        } else {
            Err(FailureReason::TokenMismatch)
        }
    }

    /// Cookie persisting the secret, if it wasn't loaded from the request
    pub(crate) fn cookie(&self, now: SystemTime) -> Result<Option<Cookie<'static>>> {
        let value = {
            let state = self.lock();
            if state.provenance == Provenance::Cookie {
                return Ok(None);
            }

            self.guard.codec.encode(&state.secret, now)?
        };

        let options = &self.guard.options;
        let mut cookie = Cookie::build((options.cookie_name().to_owned(), value))
            .path(options.cookie_path().to_owned())
            .secure(options.secure())
            .http_only(options.http_only())
            .same_site(options.same_site());

        if let Some(domain) = options.cookie_domain() {
            cookie = cookie.domain(domain.to_owned());
        }

        if let Some(max_age) = options.max_age() {
            let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            cookie = cookie.max_age(cookie::time::Duration::seconds(seconds));
        }

        Ok(Some(cookie.build()))
    }
}

impl fmt::Debug for CsrfHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfHandle")
            .field("provenance", &self.provenance())
            .finish_non_exhaustive()
    }
}

/// Hidden input carrying a masked token, ready to be rendered into a template
///
/// The [`Display`](fmt::Display) implementation renders the HTML element
#[derive(Clone, Debug)]
pub struct TemplateField {
    key: String,
    field_name: String,
    token: String,
}

impl TemplateField {
    /// Key under which the field should be published in the template context
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Key/value pair for the template context
    #[must_use]
    pub fn into_pair(self) -> (String, String) {
        let rendered = self.to_string();
        (self.key, rendered)
    }
}

struct AttributeEscape<'a>(&'a str);

impl fmt::Display for AttributeEscape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        while let Some(pos) = rest.find(['&', '"', '\'', '<', '>']) {
            f.write_str(&rest[..pos])?;
            let escaped = match rest.as_bytes()[pos] {
                b'&' => "&amp;",
                b'"' => "&quot;",
                b'\'' => "&#39;",
                b'<' => "&lt;",
                _ => "&gt;",
            };
            f.write_str(escaped)?;
            rest = &rest[pos + 1..];
        }

        f.write_str(rest)
    }
}

impl fmt::Display for TemplateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"<input type="hidden" name="{}" value="{}">"#,
            AttributeEscape(&self.field_name),
            AttributeEscape(&self.token),
        )
    }
}

#[cfg(feature = "axum")]
mod axum_impl {
    use super::CsrfHandle;
    use axum_core::extract::FromRequestParts;
    use http::{request::Parts, StatusCode};

    impl<S> FromRequestParts<S> for CsrfHandle
    where
        S: Sync,
    {
        type Rejection = StatusCode;

        async fn from_request_parts(
            parts: &mut Parts,
            _state: &S,
        ) -> Result<Self, Self::Rejection> {
            parts.extensions.get::<Self>().cloned().ok_or_else(|| {
                error!("service not wrapped by the csrf middleware");
                StatusCode::INTERNAL_SERVER_ERROR
            })
        }
    }

}
