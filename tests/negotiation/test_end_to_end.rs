//! Full secured exchanges through the interceptor and the node router

use super::common::{Harness, DESTINATION};
use serde::Serialize;
use serde_json::Value;
use shoulder_negotiation::api::{EchoRequest, EchoResponse, ECHO_PATH};
use shoulder_negotiation::crypto::{Clock, EncryptionScheme};
use shoulder_negotiation::negotiation::{FieldTag, SensitiveFields, SessionRole};

fn hello() -> EchoRequest {
    EchoRequest {
        message: "hello, shoulder".to_string(),
        note: Some("visible".to_string()),
    }
}

#[tokio::test]
async fn test_aes_256_cbc_echo_round_trip() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes256Cbc],
        vec![EncryptionScheme::Aes256Cbc],
    );
    let interceptor = harness.interceptor();

    let reply = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();

    assert_eq!(reply.value.message, "hello, shoulder");
    assert_eq!(reply.value.scheme, "AES-256/CBC/PKCS5Padding");
    assert!(!reply.is_degraded());

    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();
    assert_eq!(reply.value.session_id, session.session_id());

    // Tagged field is ciphertext on the wire, untagged field is not
    let call = harness.transport.last_call().unwrap();
    assert_ne!(call.body["message"], "hello, shoulder");
    assert_eq!(call.body["note"], "visible");
    assert_eq!(call.headers.session_id, session.session_id());
    assert!(!call.headers.data_key.is_empty());
}

#[tokio::test]
async fn test_every_scheme_round_trips() {
    for scheme in EncryptionScheme::ALL {
        let harness = Harness::with_schemes(vec![scheme], vec![scheme]);
        let reply = harness
            .interceptor()
            .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
            .await
            .unwrap();
        assert_eq!(reply.value.message, "hello, shoulder", "scheme {}", scheme);
        assert_eq!(reply.value.scheme, scheme.as_str());
    }
}

#[tokio::test]
async fn test_each_call_uses_a_fresh_data_key() {
    let harness = Harness::new();
    let interceptor = harness.interceptor();

    interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();
    let first = harness.transport.last_call().unwrap();
    interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();
    let second = harness.transport.last_call().unwrap();

    assert_eq!(first.headers.session_id, second.headers.session_id);
    assert_ne!(first.headers.data_key, second.headers.data_key);
    assert_ne!(first.headers.token, second.headers.token);
    assert_eq!(harness.transport.negotiations(), 1);
}

#[tokio::test]
async fn test_expiry_forces_renegotiation_before_next_call() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes256Cbc],
        vec![EncryptionScheme::Aes256Cbc],
    );
    let interceptor = harness.interceptor();

    let first = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();
    harness.clock.advance_secs(31 * 60);
    let second = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();

    assert_ne!(first.value.session_id, second.value.session_id);
    assert_eq!(second.value.message, "hello, shoulder");
    assert_eq!(harness.transport.negotiations(), 2);
    assert_eq!(harness.transport.sends(), 2);
}

#[tokio::test]
async fn test_invalid_tag_purges_session_and_retries_once() {
    let harness = Harness::new();
    let interceptor = harness.interceptor();

    let first = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();

    // Server forgets the session, e.g. after a restart
    assert!(harness.responder.invalidate(&first.value.session_id).await);
    assert_eq!(harness.responder.cache().count(SessionRole::Server).await, 0);

    let second = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();

    assert_ne!(first.value.session_id, second.value.session_id);
    assert_eq!(second.value.message, "hello, shoulder");
    assert_eq!(harness.transport.negotiations(), 2);
    // first call, rejected call, retried call
    assert_eq!(harness.transport.sends(), 3);
}

#[tokio::test]
async fn test_explicit_invalidate_forces_new_handshake() {
    let harness = Harness::new();
    let interceptor = harness.interceptor();

    interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();
    interceptor.invalidate(DESTINATION).await;
    assert_eq!(harness.negotiator.cache().count(SessionRole::Client).await, 0);

    interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();
    assert_eq!(harness.transport.negotiations(), 2);
}

#[tokio::test]
async fn test_handshake_failure_aborts_the_call() {
    let harness = Harness::new();
    harness.transport.set_tamper(|response| {
        response.key_bytes_length = 1;
    });

    let err = harness
        .interceptor()
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TOKEN_INVALID");
    assert_eq!(harness.transport.sends(), 0);
}

#[tokio::test]
async fn test_session_forced_into_the_past_is_renegotiated() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes256Cbc],
        vec![EncryptionScheme::Aes256Cbc],
    );
    let interceptor = harness.interceptor();

    let first = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();

    let cache = harness.negotiator.cache();
    let session = cache.get(SessionRole::Client, DESTINATION).await.unwrap();
    let past = harness.clock.now_millis() - 1;
    cache
        .put(SessionRole::Client, DESTINATION, session.with_expire_time(past))
        .await;

    let second = interceptor
        .exchange::<EchoRequest, EchoResponse>(DESTINATION, ECHO_PATH, &hello())
        .await
        .unwrap();

    assert_ne!(first.value.session_id, second.value.session_id);
    assert_eq!(second.value.message, "hello, shoulder");
    assert_eq!(harness.transport.negotiations(), 2);
}

/// Echo body whose message is not a string
#[derive(Serialize)]
struct NumericEcho {
    message: u64,
}

impl SensitiveFields for NumericEcho {
    fn sensitive_fields(_tag: FieldTag) -> &'static [&'static str] {
        &[]
    }
}

#[tokio::test]
async fn test_peer_error_code_reaches_the_caller() {
    let harness = Harness::new();
    let interceptor = harness.interceptor();

    let err = interceptor
        .exchange::<NumericEcho, Value>(DESTINATION, ECHO_PATH, &NumericEcho { message: 42 })
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DECRYPT_FAILED");
    assert_eq!(harness.transport.sends(), 1);
}
