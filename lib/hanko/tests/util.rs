#![allow(dead_code)]

use bytes::Bytes;
use cookie::Cookie;
use hanko::{failure_fn, CsrfHandle, CsrfLayer, FailureFn, FailureReason, Key, Options};
use http::{header, request, HeaderName, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use tower::{service_fn, Layer, Service, ServiceExt};

pub type Body = Full<Bytes>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub static TOKEN_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");
pub static REASON_HEADER: HeaderName = HeaderName::from_static("x-failure-reason");

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data; boundary=hanko-boundary";

pub fn key() -> Key {
    Key::derive("hanko integration tests", b"bartmoss")
}

pub type ReasonHandler = FailureFn<fn(&request::Parts, FailureReason) -> Response<Body>>;

fn report_reason(_parts: &request::Parts, reason: FailureReason) -> Response<Body> {
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header(&REASON_HEADER, reason.as_ref())
        .body(Body::from("Forbidden"))
        .unwrap()
}

/// Layer whose rejections report the reason through a response header
pub fn layer_with(options: Options) -> CsrfLayer<ReasonHandler> {
    CsrfLayer::new(options).failure_handler(failure_fn(
        report_reason as fn(&request::Parts, FailureReason) -> Response<Body>,
    ))
}

pub fn layer() -> CsrfLayer<ReasonHandler> {
    layer_with(Options::builder().key(key()).secure(false).build())
}

/// Application echoing a fresh token, rotating the secret on `/login`
pub fn app(
    layer: &CsrfLayer<ReasonHandler>,
) -> impl Service<Request<Body>, Response = Response<Body>, Error = BoxError> + Clone {
    layer.layer(service_fn(|req: Request<Body>| async move {
        let handle = req.extensions().get::<CsrfHandle>().unwrap();
        if req.uri().path() == "/login" {
            handle.regenerate().unwrap();
        }

        let token = handle.token().unwrap();
        let body = req.into_body().collect().await.unwrap().to_bytes();

        let response = Response::builder()
            .header(&TOKEN_HEADER, token)
            .body(Body::new(body))
            .unwrap();

        Ok::<_, Infallible>(response)
    }))
}

/// Session of a browser, replaying the cookies it was handed
#[derive(Clone, Default)]
pub struct Browser {
    pub cookie: Option<String>,
}

impl Browser {
    /// Remember the cookies set by the response, return the issued token
    pub fn observe(&mut self, response: &Response<Body>) -> String {
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let cookie = Cookie::parse_encoded(set_cookie.to_str().unwrap().to_owned()).unwrap();
            self.cookie = Some(format!("{}={}", cookie.name(), cookie.value()));
        }

        response
            .headers()
            .get(&TOKEN_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    /// Load a page, return the token it was handed
    pub async fn visit<S>(&mut self, service: S, uri: &str) -> String
    where
        S: Service<Request<Body>, Response = Response<Body>>,
        S::Error: std::fmt::Debug,
    {
        let response = send(service, self.get(uri)).await;
        self.observe(&response)
    }

    pub fn request(&self, method: http::Method, uri: &str) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ref cookie) = self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
    }

    pub fn get(&self, uri: &str) -> Request<Body> {
        self.request(http::Method::GET, uri)
            .body(Body::default())
            .unwrap()
    }

    pub fn post_form(&self, uri: &str, token: &str) -> Request<Body> {
        let form = serde_urlencoded::to_string([("csrf_token", token), ("comment", "hi")]).unwrap();
        self.request(http::Method::POST, uri)
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(Body::from(form))
            .unwrap()
    }

    /// Multipart form with a file part in front of the named field
    pub fn post_multipart(&self, uri: &str, field_name: &str, token: &str) -> Request<Body> {
        let form = format!(
            "--hanko-boundary\r\n\
             Content-Disposition: form-data; name=\"avatar\"; filename=\"cat.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             meow\r\n\
             --hanko-boundary\r\n\
             Content-Disposition: form-data; name=\"{field_name}\"\r\n\r\n\
             {token}\r\n\
             --hanko-boundary--\r\n"
        );

        self.request(http::Method::POST, uri)
            .header(header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE)
            .body(Body::from(form))
            .unwrap()
    }

    pub fn post_header(&self, uri: &str, token: &str) -> Request<Body> {
        self.request(http::Method::POST, uri)
            .header(&TOKEN_HEADER, token)
            .body(Body::default())
            .unwrap()
    }
}

pub async fn send<S>(service: S, req: Request<Body>) -> Response<Body>
where
    S: Service<Request<Body>, Response = Response<Body>>,
    S::Error: std::fmt::Debug,
{
    service.oneshot(req).await.unwrap()
}

pub fn reason(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(&REASON_HEADER)
        .map(|value| value.to_str().unwrap())
}
