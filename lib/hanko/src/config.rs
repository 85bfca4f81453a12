//! Deserializable configuration of the guard
//!
//! Covers everything except the key, which should come from a secret store rather than a config file

use crate::{
    options::{
        DEFAULT_COOKIE_NAME, DEFAULT_COOKIE_PATH, DEFAULT_FIELD_NAME, DEFAULT_HEADER_NAME,
        DEFAULT_MAX_AGE, DEFAULT_MAX_BODY_SIZE, DEFAULT_TEMPLATE_KEY,
    },
    ConfigError, Key, Options,
};
use http::HeaderName;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{borrow::Cow, time::Duration};
use url::Url;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<SameSitePolicy> for cookie::SameSite {
    fn from(value: SameSitePolicy) -> Self {
        match value {
            SameSitePolicy::Strict => Self::Strict,
            SameSitePolicy::Lax => Self::Lax,
            SameSitePolicy::None => Self::None,
        }
    }
}

fn default_cookie_name() -> SmolStr {
    SmolStr::new_static(DEFAULT_COOKIE_NAME)
}

fn default_cookie_path() -> SmolStr {
    SmolStr::new_static(DEFAULT_COOKIE_PATH)
}

fn default_field_name() -> SmolStr {
    SmolStr::new_static(DEFAULT_FIELD_NAME)
}

fn default_header_name() -> SmolStr {
    SmolStr::new_static(DEFAULT_HEADER_NAME)
}

fn default_template_key() -> SmolStr {
    SmolStr::new_static(DEFAULT_TEMPLATE_KEY)
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_age_secs() -> Option<u64> {
    Some(DEFAULT_MAX_AGE.as_secs())
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: SmolStr,
    #[serde(default)]
    pub cookie_domain: Option<SmolStr>,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: SmolStr,
    /// Lifetime of the cookie in seconds. Unset means session cookie.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default = "default_true")]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSitePolicy,
    #[serde(default = "default_field_name")]
    pub field_name: SmolStr,
    #[serde(default = "default_header_name")]
    pub header_name: SmolStr,
    #[serde(default)]
    pub trusted_origins: Vec<SmolStr>,
    #[serde(default = "default_template_key")]
    pub template_key: SmolStr,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default)]
    pub plaintext_http: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            cookie_domain: None,
            cookie_path: default_cookie_path(),
            max_age_secs: default_max_age_secs(),
            secure: true,
            http_only: true,
            same_site: SameSitePolicy::default(),
            field_name: default_field_name(),
            header_name: default_header_name(),
            trusted_origins: Vec::new(),
            template_key: default_template_key(),
            encrypt: false,
            max_body_size: default_max_body_size(),
            plaintext_http: false,
        }
    }
}

impl Configuration {
    /// Validate the configuration and combine it with the key
    pub fn into_options(self, key: Key) -> Result<Options, ConfigError> {
        let header_name = HeaderName::try_from(self.header_name.as_str())?;

        let trusted_origins = self
            .trusted_origins
            .iter()
            .map(|origin| {
                let url = Url::parse(origin).map_err(|source| ConfigError::Origin {
                    origin: origin.to_string(),
                    source,
                })?;

                if url.origin().is_tuple() {
                    Ok(url)
                } else {
                    Err(ConfigError::OpaqueOrigin(origin.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let options = Options::builder()
            .key(key)
            .encrypt(self.encrypt)
            .cookie_name(Cow::Owned(self.cookie_name.to_string()))
            .cookie_path(Cow::Owned(self.cookie_path.to_string()))
            .max_age(self.max_age_secs.map(Duration::from_secs))
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site.into())
            .field_name(Cow::Owned(self.field_name.to_string()))
            .header_name(header_name)
            .trusted_origins(trusted_origins)
            .template_key(Cow::Owned(self.template_key.to_string()))
            .max_body_size(self.max_body_size)
            .plaintext_http(self.plaintext_http);

        let options = if let Some(domain) = self.cookie_domain {
            options.cookie_domain(Cow::Owned(domain.to_string())).build()
        } else {
            options.build()
        };

        Ok(options)
    }
}
