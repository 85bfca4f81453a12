use crate::Key;
use cookie::SameSite;
use http::HeaderName;
use std::{borrow::Cow, time::Duration};
use typed_builder::TypedBuilder;
use url::{Origin, Url};

pub(crate) const DEFAULT_COOKIE_NAME: &str = "__hanko_csrf";
pub(crate) const DEFAULT_COOKIE_PATH: &str = "/";
pub(crate) const DEFAULT_FIELD_NAME: &str = "csrf_token";
pub(crate) const DEFAULT_HEADER_NAME: &str = "x-csrf-token";
pub(crate) const DEFAULT_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);
pub(crate) const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
pub(crate) const DEFAULT_TEMPLATE_KEY: &str = "csrf_field";

/// Options of the CSRF guard
///
/// Fixed once the [`CsrfLayer`](crate::CsrfLayer) is constructed.
/// To change them, construct a new layer.
///
/// ```
/// use hanko::{Key, Options};
///
/// let options = Options::builder()
///     .key(Key::derive("my-app 2024-11-02 csrf", b"super secret key material"))
///     .cookie_name("my-app-csrf")
///     .secure(false)
///     .build();
///
/// assert_eq!(options.cookie_name(), "my-app-csrf");
/// ```
#[derive(Clone, Debug, TypedBuilder)]
pub struct Options {
    /// Key the cookie is authenticated (and optionally encrypted) with
    key: Key,

    /// Encrypt the cookie instead of only authenticating it
    #[builder(default)]
    encrypt: bool,

    #[builder(default = Cow::Borrowed(DEFAULT_COOKIE_NAME), setter(into))]
    cookie_name: Cow<'static, str>,

    #[builder(default, setter(into, strip_option))]
    cookie_domain: Option<Cow<'static, str>>,

    #[builder(default = Cow::Borrowed(DEFAULT_COOKIE_PATH), setter(into))]
    cookie_path: Cow<'static, str>,

    /// Lifetime of the cookie. `None` issues a session cookie without an expiry check.
    #[builder(default = Some(DEFAULT_MAX_AGE))]
    max_age: Option<Duration>,

    #[builder(default = true)]
    secure: bool,

    #[builder(default = true)]
    http_only: bool,

    #[builder(default = SameSite::Lax)]
    same_site: SameSite,

    /// Name of the form field the token is read from
    #[builder(default = Cow::Borrowed(DEFAULT_FIELD_NAME), setter(into))]
    field_name: Cow<'static, str>,

    /// Name of the header the token is read from
    #[builder(default = HeaderName::from_static(DEFAULT_HEADER_NAME))]
    header_name: HeaderName,

    /// Origins allowed to submit unsafe requests in addition to the request's own origin
    #[builder(
        default,
        setter(transform = |origins: Vec<Url>| origins.iter().map(Url::origin).collect())
    )]
    trusted_origins: Vec<Origin>,

    /// Key under which [`TemplateField`](crate::TemplateField) publishes the hidden input
    #[builder(default = Cow::Borrowed(DEFAULT_TEMPLATE_KEY), setter(into))]
    template_key: Cow<'static, str>,

    /// Upper bound of form bodies buffered to look up the token
    #[builder(default = DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Assume `http` instead of `https` for requests whose URI carries no scheme
    #[builder(default)]
    plaintext_http: bool,
}

impl Options {
    #[must_use]
    pub(crate) fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn encrypt(&self) -> bool {
        self.encrypt
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    #[must_use]
    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }

    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn http_only(&self) -> bool {
        self.http_only
    }

    #[must_use]
    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    #[must_use]
    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    #[must_use]
    pub fn trusted_origins(&self) -> &[Origin] {
        &self.trusted_origins
    }

    #[must_use]
    pub fn template_key(&self) -> &str {
        &self.template_key
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    #[must_use]
    pub fn plaintext_http(&self) -> bool {
        self.plaintext_http
    }
}
