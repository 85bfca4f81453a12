use crate::{
    layer::Guard,
    verify::{self, Outcome, Stage},
    BoxError, CsrfHandle, FailureHandler, ResponseFuture,
};
use bytes::Bytes;
use cookie::Cookie;
use http::{header, Request, Response};
use http_body::Body;
use std::{
    mem,
    task::{self, Poll},
    time::SystemTime,
};
use tower_service::Service;
use triomphe::Arc;

/// Service verifying unsafe requests before handing them to the inner service
#[derive(Clone)]
pub struct CsrfService<S, H> {
    inner: S,
    guard: Arc<Guard>,
    failure_handler: H,
}

impl<S, H> CsrfService<S, H> {
    pub(crate) fn new(inner: S, guard: Arc<Guard>, failure_handler: H) -> Self {
        Self {
            inner,
            guard,
            failure_handler,
        }
    }
}

fn read_cookie<B>(req: &Request<B>, name: &str) -> Option<String> {
    for header in req.headers().get_all(header::COOKIE) {
        let Ok(value_str) = header.to_str() else {
            continue;
        };

        for cookie in Cookie::split_parse_encoded(value_str) {
            let cookie = match cookie {
                Ok(cookie) => cookie,
                Err(error) => {
                    debug!(?error, "failed to decode cookie");
                    continue;
                }
            };

            if cookie.name() == name {
                return Some(cookie.value_trimmed().to_owned());
            }
        }
    }

    None
}

impl<S, H, ReqBody, ResBody> Service<Request<ReqBody>> for CsrfService<S, H>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
    S::Error: Into<BoxError>,
    H: FailureHandler<ResBody> + Clone,
    ReqBody: Body + From<Bytes>,
    ReqBody::Error: Into<BoxError>,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = ResponseFuture<S, S::Future, H, ReqBody, ResBody>;

    fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let cookie_value = read_cookie(&req, self.guard.options.cookie_name());
        let handle = match CsrfHandle::load(
            Arc::clone(&self.guard),
            cookie_value.as_deref(),
            SystemTime::now(),
        ) {
            Ok(handle) => handle,
            Err(error) => return ResponseFuture::abort(error),
        };

        req.extensions_mut().insert(handle.clone());

        // The clone isn't necessarily ready, keep the one that was polled
        let clone = self.inner.clone();
        let mut inner = mem::replace(&mut self.inner, clone);

        let (parts, body) = req.into_parts();
        let outcome = match verify::preflight(&parts, &handle) {
            Stage::Terminal(outcome) => outcome,
            Stage::NeedsToken => match verify::form_kind(&parts.headers) {
                Some(form) => {
                    return ResponseFuture::buffer(
                        inner,
                        parts,
                        body,
                        form,
                        handle,
                        self.failure_handler.clone(),
                    );
                }
                None => verify::verify_token(&parts.headers, None, &handle),
            },
        };

        if let Outcome::Rejected(reason) = outcome {
            debug!(%reason, method = %parts.method, "rejecting request");
            let response = self.failure_handler.on_failure(&parts, reason);
            return ResponseFuture::respond(response, handle);
        }

        ResponseFuture::inner(inner.call(Request::from_parts(parts, body)), handle)
    }
}
