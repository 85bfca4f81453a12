use crate::{codec::SecretCodec, CsrfService, DefaultFailureHandler, Key, Options, Result};
use tower_layer::Layer;
use triomphe::Arc;

/// Immutable state shared by every clone of the service
pub(crate) struct Guard {
    pub(crate) options: Options,
    pub(crate) codec: SecretCodec,
}

impl Guard {
    pub(crate) fn new(options: Options) -> Self {
        let codec = SecretCodec::new(
            options.key(),
            options.cookie_name(),
            options.max_age(),
            options.encrypt(),
        );

        Self { options, codec }
    }
}

/// Layer applying CSRF protection to the wrapped service
#[derive(Clone)]
pub struct CsrfLayer<H = DefaultFailureHandler> {
    guard: Arc<Guard>,
    failure_handler: H,
}

impl CsrfLayer {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            guard: Arc::new(Guard::new(options)),
            failure_handler: DefaultFailureHandler,
        }
    }

    /// Construct a layer with a randomly generated key and the default options
    ///
    /// Cookies won't survive a restart of the application
    pub fn generate() -> Result<Self> {
        Ok(Self::new(Options::builder().key(Key::generate()?).build()))
    }
}

impl<H> CsrfLayer<H> {
    /// Replace the handler invoked for rejected requests
    #[must_use]
    pub fn failure_handler<H2>(self, failure_handler: H2) -> CsrfLayer<H2> {
        CsrfLayer {
            guard: self.guard,
            failure_handler,
        }
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.guard.options
    }
}

impl<S, H> Layer<S> for CsrfLayer<H>
where
    H: Clone,
{
    type Service = CsrfService<S, H>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService::new(inner, Arc::clone(&self.guard), self.failure_handler.clone())
    }
}
