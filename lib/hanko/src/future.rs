use crate::{
    verify::{self, FormKind, Outcome},
    BoxError, CsrfHandle, Error, FailureHandler, FailureReason,
};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::future::BoxFuture;
use http::{header, request, HeaderValue, Request, Response};
use http_body::Body;
use http_body_util::Limited;
use pin_project_lite::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{self, ready, Poll},
    time::SystemTime,
};
use tower_service::Service;

/// Request waiting for its form body to be buffered
struct Pending<S, H> {
    inner: S,
    parts: request::Parts,
    handle: CsrfHandle,
    failure_handler: H,
}

pin_project! {
    #[project = StateProj]
    enum State<S, F, H, ReqBody, ResBody> {
        Buffer {
            #[pin]
            body: Limited<ReqBody>,
            buffer: BytesMut,
            form: FormKind,
            pending: Option<Pending<S, H>>,
        },
        Multipart {
            field: BoxFuture<'static, Option<String>>,
            body: Bytes,
            pending: Option<Pending<S, H>>,
        },
        Inner {
            #[pin]
            fut: F,
            handle: CsrfHandle,
        },
        Respond {
            response: Option<Response<ResBody>>,
            handle: CsrfHandle,
        },
        Abort {
            error: Option<Error>,
        },
    }
}

pin_project! {
    /// Response future of the [`CsrfService`](crate::CsrfService)
    pub struct ResponseFuture<S, F, H, ReqBody, ResBody> {
        #[pin]
        state: State<S, F, H, ReqBody, ResBody>,
    }
}

impl<S, F, H, ReqBody, ResBody> ResponseFuture<S, F, H, ReqBody, ResBody> {
    pub(crate) fn buffer(
        inner: S,
        parts: request::Parts,
        body: ReqBody,
        form: FormKind,
        handle: CsrfHandle,
        failure_handler: H,
    ) -> Self {
        let max_body_size = handle.guard().options.max_body_size();

        Self {
            state: State::Buffer {
                body: Limited::new(body, max_body_size),
                buffer: BytesMut::new(),
                form,
                pending: Some(Pending {
                    inner,
                    parts,
                    handle,
                    failure_handler,
                }),
            },
        }
    }

    pub(crate) fn inner(fut: F, handle: CsrfHandle) -> Self {
        Self {
            state: State::Inner { fut, handle },
        }
    }

    pub(crate) fn respond(response: Response<ResBody>, handle: CsrfHandle) -> Self {
        Self {
            state: State::Respond {
                response: Some(response),
                handle,
            },
        }
    }

    pub(crate) fn abort(error: Error) -> Self {
        Self {
            state: State::Abort { error: Some(error) },
        }
    }
}

/// Attach the cookie if the secret was minted or rotated while handling the request
fn persist<ResBody>(
    mut response: Response<ResBody>,
    handle: &CsrfHandle,
) -> Result<Response<ResBody>, BoxError> {
    if let Some(cookie) = handle.cookie(SystemTime::now())? {
        let encoded_cookie = cookie.encoded().to_string();
        let header_value = HeaderValue::from_str(&encoded_cookie).map_err(Error::from)?;

        response
            .headers_mut()
            .append(header::SET_COOKIE, header_value);
    }

    Ok(response)
}

fn reject<S, F, H, ReqBody, ResBody>(
    pending: Pending<S, H>,
    reason: FailureReason,
) -> State<S, F, H, ReqBody, ResBody>
where
    H: FailureHandler<ResBody>,
{
    debug!(%reason, method = %pending.parts.method, "rejecting request");
    State::Respond {
        response: Some(pending.failure_handler.on_failure(&pending.parts, reason)),
        handle: pending.handle,
    }
}

/// Compare the token and either reject or hand the rebuilt request to the inner service
fn settle<S, H, ReqBody, ResBody>(
    pending: Pending<S, H>,
    body: Bytes,
    form_value: Option<String>,
) -> State<S, S::Future, H, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    H: FailureHandler<ResBody>,
    ReqBody: From<Bytes>,
{
    match verify::verify_token(&pending.parts.headers, form_value, &pending.handle) {
        Outcome::Rejected(reason) => reject(pending, reason),
        _ => {
            let Pending {
                mut inner,
                parts,
                handle,
                ..
            } = pending;

            State::Inner {
                fut: inner.call(Request::from_parts(parts, ReqBody::from(body))),
                handle,
            }
        }
    }
}

impl<S, H, ReqBody, ResBody> Future for ResponseFuture<S, S::Future, H, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    H: FailureHandler<ResBody>,
    ReqBody: Body + From<Bytes>,
    ReqBody::Error: Into<BoxError>,
{
    type Output = Result<Response<ResBody>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let mut state = self.project().state;

        loop {
            let next = match state.as_mut().project() {
                StateProj::Buffer {
                    mut body,
                    buffer,
                    form,
                    pending,
                } => {
                    let read_result = loop {
                        match ready!(body.as_mut().poll_frame(cx)) {
                            Some(Ok(frame)) => {
                                if let Ok(data) = frame.into_data() {
                                    buffer.put(data);
                                }
                            }
                            Some(Err(error)) => break Err(error),
                            None => break Ok(()),
                        }
                    };

                    let pending = pending.take().expect("[Bug] Polled after completion");
                    if let Err(error) = read_result {
                        debug!(?error, "failed to buffer form body");
                        reject(pending, FailureReason::BodyUnreadable)
                    } else {
                        let body = buffer.split().freeze();
                        match form {
                            FormKind::UrlEncoded => {
                                let options = &pending.handle.guard().options;
                                let form_value = verify::form_field(options, &body);
                                settle(pending, body, form_value)
                            }
                            FormKind::Multipart { boundary } => {
                                let field_name =
                                    pending.handle.guard().options.field_name().to_owned();
                                let field = verify::multipart_field(
                                    body.clone(),
                                    std::mem::take(boundary),
                                    field_name,
                                );

                                State::Multipart {
                                    field: Box::pin(field),
                                    body,
                                    pending: Some(pending),
                                }
                            }
                        }
                    }
                }
                StateProj::Multipart {
                    field,
                    body,
                    pending,
                } => {
                    let form_value = ready!(field.as_mut().poll(cx));
                    let pending = pending.take().expect("[Bug] Polled after completion");
                    settle(pending, body.clone(), form_value)
                }
                StateProj::Inner { fut, handle } => {
                    let response = ready!(fut.poll(cx)).map_err(Into::<BoxError>::into)?;
                    return Poll::Ready(persist(response, handle));
                }
                StateProj::Respond { response, handle } => {
                    let response = response.take().expect("[Bug] Polled after completion");
                    return Poll::Ready(persist(response, handle));
                }
                StateProj::Abort { error } => {
                    let error = error.take().expect("[Bug] Polled after completion");
                    return Poll::Ready(Err(error.into()));
                }
            };

            state.set(next);
        }
    }
}
