//! Client/server handshake behaviour over the loopback transport

use super::common::{Harness, DESTINATION};
use base64::{engine::general_purpose::STANDARD, Engine};
use shoulder_negotiation::crypto::{Clock, EncryptionScheme};
use shoulder_negotiation::negotiation::SessionRole;
use std::time::Duration;

#[tokio::test]
async fn test_both_sides_derive_identical_keys() {
    for scheme in EncryptionScheme::ALL {
        let harness = Harness::with_schemes(vec![scheme], EncryptionScheme::ALL.to_vec());

        let client = harness.negotiator.session_for(DESTINATION).await.unwrap();
        let server = harness
            .responder
            .cache()
            .get(SessionRole::Server, client.session_id())
            .await
            .expect("server stored the session");

        assert_eq!(client.encryption_scheme(), scheme);
        assert_eq!(server.encryption_scheme(), scheme);
        assert_eq!(client.shared_key(), server.shared_key(), "scheme {}", scheme);
        assert_eq!(client.shared_key().len(), scheme.key_len());
        assert_eq!(client.local_iv(), server.local_iv());
        assert_eq!(client.token_key(), server.token_key());
        assert_ne!(client.other_party_public_key(), server.other_party_public_key());
    }
}

#[tokio::test]
async fn test_strongest_common_scheme_is_chosen() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes128Gcm, EncryptionScheme::Aes192Cbc],
        vec![
            EncryptionScheme::Aes128Cbc,
            EncryptionScheme::Aes128Gcm,
            EncryptionScheme::Aes192Cbc,
        ],
    );
    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();
    assert_eq!(session.encryption_scheme(), EncryptionScheme::Aes192Cbc);
    assert_eq!(session.key_length(), 24);
}

#[tokio::test]
async fn test_no_common_scheme_surfaces_failure() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes128Cbc],
        vec![EncryptionScheme::Aes256Gcm],
    );
    let err = harness.negotiator.session_for(DESTINATION).await.unwrap_err();
    assert_eq!(err.code(), "NEGOTIATION_FAILED");
    assert_eq!(harness.negotiator.cache().count(SessionRole::Client).await, 0);
}

#[tokio::test]
async fn test_cached_session_is_reused() {
    let harness = Harness::new();
    let first = harness.negotiator.session_for(DESTINATION).await.unwrap();
    let second = harness.negotiator.session_for(DESTINATION).await.unwrap();

    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(harness.transport.negotiations(), 1);
}

#[tokio::test]
async fn test_expired_session_triggers_new_handshake() {
    let harness = Harness::new();
    let first = harness.negotiator.session_for(DESTINATION).await.unwrap();
    assert_eq!(first.expire_time_epoch_ms() - harness.clock.now_millis(), 1_800_000);

    harness.clock.advance_millis(1_800_000 - 1);
    let still = harness.negotiator.session_for(DESTINATION).await.unwrap();
    assert_eq!(still.session_id(), first.session_id());

    harness.clock.advance_millis(1);
    let second = harness.negotiator.session_for(DESTINATION).await.unwrap();
    assert_ne!(second.session_id(), first.session_id());
    assert_eq!(harness.transport.negotiations(), 2);
}

#[tokio::test]
async fn test_tampered_response_is_rejected_and_not_cached() {
    let harness = Harness::new();
    harness.transport.set_tamper(|response| {
        response.expire_time_ms *= 10;
    });

    let err = harness.negotiator.session_for(DESTINATION).await.unwrap_err();
    assert_eq!(err.code(), "TOKEN_INVALID");
    assert_eq!(harness.negotiator.cache().count(SessionRole::Client).await, 0);

    harness.transport.clear_tamper();
    assert!(harness.negotiator.session_for(DESTINATION).await.is_ok());
    assert_eq!(harness.transport.negotiations(), 2);
}

#[tokio::test]
async fn test_substituted_server_key_is_rejected() {
    let harness = Harness::new();
    let attacker = shoulder_negotiation::crypto::EphemeralKeyPair::generate();
    let attacker_key = STANDARD.encode(attacker.public_key_bytes());
    harness.transport.set_tamper(move |response| {
        response.public_key = attacker_key.clone();
    });

    let err = harness.negotiator.session_for(DESTINATION).await.unwrap_err();
    assert_eq!(err.code(), "TOKEN_INVALID");
    assert_eq!(harness.negotiator.cache().count(SessionRole::Client).await, 0);
}

#[tokio::test]
async fn test_mismatched_session_id_is_rejected() {
    let harness = Harness::new();
    harness.transport.set_tamper(|response| {
        response.session_id = "someone-else".to_string();
    });

    let err = harness.negotiator.session_for(DESTINATION).await.unwrap_err();
    assert_eq!(err.code(), "TOKEN_INVALID");
    assert_eq!(harness.negotiator.cache().count(SessionRole::Client).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_handshake_times_out_without_caching() {
    let harness = Harness::new();
    harness.transport.set_delay(Duration::from_secs(30));

    let err = harness.negotiator.session_for(DESTINATION).await.unwrap_err();
    assert_eq!(err.code(), "NEGOTIATION_TIMEOUT");
    assert_eq!(harness.negotiator.cache().count(SessionRole::Client).await, 0);
}

#[tokio::test]
async fn test_renegotiate_replaces_session() {
    let harness = Harness::new();
    let first = harness.negotiator.session_for(DESTINATION).await.unwrap();
    let second = harness.negotiator.renegotiate(DESTINATION).await.unwrap();

    assert_ne!(first.session_id(), second.session_id());
    let cached = harness.negotiator.session_for(DESTINATION).await.unwrap();
    assert_eq!(cached.session_id(), second.session_id());
    assert_eq!(harness.transport.negotiations(), 2);
}

#[tokio::test]
async fn test_client_and_server_maps_stay_separate() {
    let harness = Harness::new();
    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();

    let client_cache = harness.negotiator.cache();
    assert!(client_cache.get(SessionRole::Client, DESTINATION).await.is_some());
    assert!(client_cache
        .get(SessionRole::Server, session.session_id())
        .await
        .is_none());
    assert!(harness
        .responder
        .cache()
        .get(SessionRole::Client, DESTINATION)
        .await
        .is_none());
}
