use crate::FailureReason;
use http::{header, request, HeaderValue, Response, StatusCode};

static FORBIDDEN_BODY: &str = "Forbidden\n";
static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

/// Produces the response for a rejected request
///
/// Avoid echoing the submitted token or the specific reason back to the client
pub trait FailureHandler<ResBody> {
    fn on_failure(&self, parts: &request::Parts, reason: FailureReason) -> Response<ResBody>;
}

/// Responds with `403 Forbidden` and a static body
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFailureHandler;

impl<ResBody> FailureHandler<ResBody> for DefaultFailureHandler
where
    ResBody: From<&'static str>,
{
    fn on_failure(&self, _parts: &request::Parts, _reason: FailureReason) -> Response<ResBody> {
        let mut response = Response::new(ResBody::from(FORBIDDEN_BODY));
        *response.status_mut() = StatusCode::FORBIDDEN;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, TEXT_PLAIN.clone());

        response
    }
}

/// Failure handler backed by a function
///
/// Constructed via [`failure_fn`]
#[derive(Clone, Copy)]
pub struct FailureFn<F> {
    f: F,
}

/// Use a function as the [`FailureHandler`]
///
/// ```
/// use hanko::{failure_fn, FailureReason};
/// use http::{request, Response, StatusCode};
///
/// let handler = failure_fn(|_parts: &request::Parts, _reason: FailureReason| {
///     let mut response = Response::new(String::from("Try reloading the page"));
///     *response.status_mut() = StatusCode::FORBIDDEN;
///     response
/// });
/// # let _ = handler;
/// ```
pub fn failure_fn<F, ResBody>(f: F) -> FailureFn<F>
where
    F: Fn(&request::Parts, FailureReason) -> Response<ResBody>,
{
    FailureFn { f }
}

impl<F, ResBody> FailureHandler<ResBody> for FailureFn<F>
where
    F: Fn(&request::Parts, FailureReason) -> Response<ResBody>,
{
    #[inline]
    fn on_failure(&self, parts: &request::Parts, reason: FailureReason) -> Response<ResBody> {
        (self.f)(parts, reason)
    }
}
