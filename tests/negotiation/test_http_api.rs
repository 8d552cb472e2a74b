//! HTTP edge of the node, driven in-process with tower's `oneshot`

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use base64::Engine;
use serde_json::{json, Value};
use shoulder_negotiation::{
    api::{router, AppState, ECHO_PATH},
    config::NegotiationConfig,
    crypto::{system_clock, EcdsaSignKey, EphemeralKeyPair, InMemoryKeyPairProvider, Signer},
    negotiation::{
        NegotiationRequest, NegotiationResponder, SessionCache, DATA_KEY_HEADER, NEGOTIATION_INVALID_TAG,
        SESSION_ID_HEADER, TOKEN_HEADER,
    },
};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let responder = Arc::new(NegotiationResponder::new(
        Arc::new(NegotiationConfig::default()),
        SessionCache::new(system_clock()),
        Arc::new(InMemoryKeyPairProvider::new()),
    ));
    router(AppState::new(responder))
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_empty_negotiation_request_is_bad_request() {
    let response = app()
        .oneshot(post("/api/security/v1/negotiation", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], "MISSING_REQUIRED_PARAM");
}

#[tokio::test]
async fn test_unsigned_negotiation_request_is_unauthorized() {
    let response = app()
        .oneshot(post(
            "/api/security/v1/negotiation",
            json!({
                "sessionId": "s-1",
                "token": "MTIz.AAAA",
                "publicKey": "AAAA",
                "supportedSchemes": ["AES-256/GCM/NoPadding"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(NEGOTIATION_INVALID_TAG).is_none());
    assert_eq!(body_json(response).await["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_secured_call_on_unknown_session_asks_for_renegotiation() {
    let request = Request::builder()
        .method("POST")
        .uri(ECHO_PATH)
        .header("content-type", "application/json")
        .header(SESSION_ID_HEADER, "never-negotiated")
        .header(TOKEN_HEADER, "MTIz.AAAA")
        .header(DATA_KEY_HEADER, "AAAA")
        .body(Body::from(json!({ "message": "hi" }).to_string()))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[NEGOTIATION_INVALID_TAG], "true");
    assert_eq!(body_json(response).await["code"], "NEGOTIATION_INVALID");
}

#[tokio::test]
async fn test_secured_call_without_headers_is_bad_request() {
    let response = app()
        .oneshot(post(ECHO_PATH, json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MISSING_REQUIRED_PARAM");
}

#[tokio::test]
async fn test_malformed_negotiation_body_gets_typed_error() {
    let response = app()
        .oneshot(post(
            "/api/security/v1/negotiation",
            json!({ "sessionId": "s-1", "supportedSchemes": "AES-256/GCM/NoPadding" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MISSING_REQUIRED_PARAM");
}

#[tokio::test]
async fn test_unknown_scheme_names_are_skipped_by_handshake() {
    let pair = EphemeralKeyPair::generate();
    let mut request = NegotiationRequest {
        session_id: "s-unknown-scheme".into(),
        token: String::new(),
        public_key: base64::engine::general_purpose::STANDARD.encode(pair.public_key_bytes()),
        supported_schemes: vec!["AES-256/GCM/NoPadding".into(), "SM4/CBC/PKCS5Padding".into()],
        refresh: false,
    };
    let parts = request.signing_parts();
    let parts: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
    request.token = Signer::new(system_clock())
        .sign(&EcdsaSignKey::from_pair(&pair), &parts)
        .unwrap();

    let response = app()
        .oneshot(post(
            "/api/security/v1/negotiation",
            serde_json::to_value(&request).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["chosenScheme"], "AES-256/GCM/NoPadding");
}
