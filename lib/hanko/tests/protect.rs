use self::util::{app, layer, layer_with, reason, send, Body, Browser, TOKEN_HEADER};
use hanko::{CsrfHandle, CsrfLayer, Key, Options, SkipCheck};
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use std::convert::Infallible;
use tower::{service_fn, Layer};
use url::Url;

mod util;

#[futures_test::test]
async fn safe_methods_pass_without_token() {
    let service = app(&layer());
    let browser = Browser::default();

    for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
        let req = browser.request(method, "/").body(Body::default()).unwrap();
        let response = send(service.clone(), req).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::SET_COOKIE));
        assert!(response.headers().contains_key(&TOKEN_HEADER));
    }
}

#[futures_test::test]
async fn fresh_session_is_rejected() {
    let service = app(&layer());
    let browser = Browser::default();

    let response = send(service.clone(), browser.post_header("/", "")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(reason(&response), Some("secret_missing"));

    // The minted secret is still handed out so the next attempt can succeed
    assert!(response.headers().contains_key(header::SET_COOKIE));
}

#[futures_test::test]
async fn missing_token_is_rejected() {
    let service = app(&layer());
    let mut browser = Browser::default();
    browser.visit(service.clone(), "/").await;

    let req = browser
        .request(Method::POST, "/")
        .body(Body::default())
        .unwrap();
    let response = send(service, req).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(reason(&response), Some("token_missing"));
}

#[futures_test::test]
async fn malformed_token_is_rejected() {
    let service = app(&layer());
    let mut browser = Browser::default();
    browser.visit(service.clone(), "/").await;

    let response = send(service, browser.post_header("/", "definitely-not-a-token")).await;
    assert_eq!(reason(&response), Some("token_malformed"));
}

#[futures_test::test]
async fn existing_secret_is_not_rewritten() {
    let service = app(&layer());
    let mut browser = Browser::default();
    browser.visit(service.clone(), "/").await;

    let response = send(service, browser.get("/")).await;
    assert!(!response.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn multiple_tabs() {
    let service = app(&layer());
    let mut browser = Browser::default();

    let first_tab = browser.visit(service.clone(), "/").await;
    let second_tab = browser.visit(service.clone(), "/").await;
    assert_ne!(first_tab, second_tab);

    let (form_response, header_response) = tokio::join!(
        send(service.clone(), browser.post_form("/", &first_tab)),
        send(service.clone(), browser.post_header("/", &second_tab)),
    );
    assert_eq!(form_response.status(), StatusCode::OK);
    assert_eq!(header_response.status(), StatusCode::OK);

    // The buffered form body is handed to the application untouched
    let body = form_response.into_body().collect().await.unwrap().to_bytes();
    let form: Vec<(String, String)> = serde_urlencoded::from_bytes(&body).unwrap();
    assert_eq!(form[0], ("csrf_token".into(), first_tab));
    assert_eq!(form[1], ("comment".into(), "hi".into()));

    // Token derived from another session's secret
    let mut other_browser = Browser::default();
    let foreign = other_browser.visit(service.clone(), "/").await;

    let response = send(service, browser.post_form("/", &foreign)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(reason(&response), Some("token_mismatch"));
}

#[futures_test::test]
async fn multipart_forms() {
    let service = app(&layer());
    let mut browser = Browser::default();
    let token = browser.visit(service.clone(), "/").await;

    let req = browser.post_multipart("/upload", "csrf_token", &token);
    let sent = req.body().clone().collect().await.unwrap().to_bytes();
    let response = send(service.clone(), req).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The buffered multipart body reaches the application byte for byte
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, sent);

    let req = browser.post_multipart("/upload", "csrf_token", "Zm9v");
    let response = send(service.clone(), req).await;
    assert_eq!(reason(&response), Some("token_malformed"));

    let req = browser.post_multipart("/upload", "other", &token);
    let response = send(service.clone(), req).await;
    assert_eq!(reason(&response), Some("token_missing"));

    // Falls back to the header when the field is absent
    let mut req = browser.post_multipart("/upload", "other", "");
    req.headers_mut().insert(&TOKEN_HEADER, token.parse().unwrap());
    let response = send(service, req).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[futures_test::test]
async fn form_field_takes_precedence_over_header() {
    let service = app(&layer());
    let mut browser = Browser::default();
    let token = browser.visit(service.clone(), "/").await;

    let mut req = browser.post_form("/", "Zm9v");
    req.headers_mut().insert(&TOKEN_HEADER, token.parse().unwrap());

    let response = send(service, req).await;
    assert_eq!(reason(&response), Some("token_malformed"));
}

#[futures_test::test]
async fn tampered_cookie_is_replaced() {
    let service = app(&layer());
    let mut browser = Browser::default();
    let token = browser.visit(service.clone(), "/").await;

    let original_cookie = browser.cookie.clone().unwrap();
    let (name, value) = original_cookie.split_once('=').unwrap();
    let mut raw = base64_simd::URL_SAFE_NO_PAD.decode_to_vec(value).unwrap();
    raw[12] ^= 0x80;
    browser.cookie = Some(format!(
        "{name}={}",
        base64_simd::URL_SAFE_NO_PAD.encode_to_string(raw)
    ));

    // Using the tampered cookie on a safe request mints a new secret
    let response = send(service.clone(), browser.get("/")).await;
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
    assert!(!set_cookie.to_str().unwrap().contains(value));

    // Tokens of the original secret don't help once the cookie is tampered with
    let response = send(service, browser.post_header("/", &token)).await;
    assert_eq!(reason(&response), Some("secret_missing"));
}

#[futures_test::test]
async fn untrusted_origin_is_rejected() {
    let options = Options::builder()
        .key(util::key())
        .trusted_origins(vec![Url::parse("https://example.com").unwrap()])
        .build();
    let service = app(&layer_with(options));

    let mut browser = Browser::default();
    let token = browser.visit(service.clone(), "/").await;

    let req = browser
        .request(Method::POST, "/")
        .header(header::HOST, "app.example.com")
        .header(header::ORIGIN, "https://evil.com")
        .header(&TOKEN_HEADER, &token)
        .body(Body::default())
        .unwrap();
    let response = send(service.clone(), req).await;
    assert_eq!(reason(&response), Some("origin_mismatch"));

    let req = browser
        .request(Method::POST, "/")
        .header(header::HOST, "app.example.com")
        .header(header::ORIGIN, "https://example.com")
        .header(&TOKEN_HEADER, &token)
        .body(Body::default())
        .unwrap();
    let response = send(service, req).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[futures_test::test]
async fn rotation_invalidates_earlier_tokens() {
    let service = app(&layer());
    let mut browser = Browser::default();
    let before = browser.visit(service.clone(), "/").await;

    // Rotate twice in a row
    let response = send(service.clone(), browser.post_header("/login", &before)).await;
    let between = browser.observe(&response);
    let response = send(service.clone(), browser.post_header("/login", &between)).await;
    let after = browser.observe(&response);

    let response = send(service.clone(), browser.post_header("/", &before)).await;
    assert_eq!(reason(&response), Some("token_mismatch"));

    let response = send(service.clone(), browser.post_header("/", &between)).await;
    assert_eq!(reason(&response), Some("token_mismatch"));

    let response = send(service, browser.post_header("/", &after)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[futures_test::test]
async fn skip_marker_bypasses_verification() {
    let service = app(&layer());
    let mut req = Browser::default().post_header("/webhook", "");
    hanko::unsafe_skip_check(&mut req);
    assert!(req.extensions().get::<SkipCheck>().is_some());

    let response = send(service, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(&TOKEN_HEADER));
}

#[futures_test::test]
async fn oversized_form_is_rejected() {
    let options = Options::builder()
        .key(util::key())
        .max_body_size(16)
        .build();
    let service = app(&layer_with(options));

    let mut browser = Browser::default();
    let token = browser.visit(service.clone(), "/").await;

    let response = send(service, browser.post_form("/", &token)).await;
    assert_eq!(reason(&response), Some("body_unreadable"));
}

#[futures_test::test]
async fn encrypted_cookies() {
    let options = Options::builder().key(util::key()).encrypt(true).build();
    let service = app(&layer_with(options));

    let mut browser = Browser::default();
    let token = browser.visit(service.clone(), "/").await;

    let response = send(service, browser.post_form("/", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[futures_test::test]
async fn default_failure_handler_is_generic() {
    let service = CsrfLayer::new(Options::builder().key(util::key()).build()).layer(
        service_fn(|_req: Request<Body>| async move {
            Ok::<_, Infallible>(Response::new(Body::default()))
        }),
    );

    let submitted = "c3VibWl0dGVkLXRva2Vu";
    let req = Request::post("/")
        .header(&TOKEN_HEADER, submitted)
        .body(Body::default())
        .unwrap();
    let response = send(service, req).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, "Forbidden\n");
    assert!(!String::from_utf8_lossy(&body).contains(submitted));
}

#[futures_test::test]
async fn separate_keys_dont_share_cookies() {
    let first = app(&layer());
    let second = app(&layer_with(
        Options::builder()
            .key(Key::derive("hanko integration tests", b"johnny"))
            .build(),
    ));

    let mut browser = Browser::default();
    let token = browser.visit(first, "/").await;

    let response = send(second, browser.post_header("/", &token)).await;
    assert_eq!(reason(&response), Some("secret_missing"));
}

#[futures_test::test]
async fn handle_is_shared_with_the_application() {
    let service = CsrfLayer::new(Options::builder().key(util::key()).build()).layer(
        service_fn(|req: Request<Body>| async move {
            let handle = req.extensions().get::<CsrfHandle>().unwrap();
            assert!(handle.is_new());
            assert!(!handle.is_issued());

            let field = handle.template_field().unwrap();
            assert!(handle.is_issued());
            assert_eq!(field.key(), "csrf_field");

            Ok::<_, Infallible>(Response::new(Body::from(field.to_string())))
        }),
    );

    let response = send(service, Request::get("/").body(Body::default()).unwrap()).await;
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.starts_with(br#"<input type="hidden" name="csrf_token" value=""#));
}
