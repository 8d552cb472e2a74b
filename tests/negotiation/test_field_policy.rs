//! Field hook behaviour on negotiated sessions

use super::common::{Harness, DESTINATION};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shoulder_negotiation::crypto::{Clock, EncryptionScheme};
use shoulder_negotiation::negotiation::{
    CipherRole, DataKey, DecodedPayload, DecryptFailurePolicy, FieldCryptoHook, FieldTag,
    NegotiationResult, SensitiveFields, TransportCipher,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    holder: String,
    id_card: String,
    cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Card {
    pan: String,
    brand: String,
}

impl SensitiveFields for Account {
    fn sensitive_fields(_tag: FieldTag) -> &'static [&'static str] {
        &["idCard", "cards.pan"]
    }
}

fn account() -> Account {
    Account {
        holder: "Lee".to_string(),
        id_card: "110101199003077777".to_string(),
        cards: vec![
            Card {
                pan: "4111111111111111".to_string(),
                brand: "visa".to_string(),
            },
            Card {
                pan: "5500000000000004".to_string(),
                brand: "mc".to_string(),
            },
        ],
    }
}

async fn gcm_session(harness: &Harness) -> NegotiationResult {
    harness.negotiator.session_for(DESTINATION).await.unwrap()
}

fn cipher(session: &NegotiationResult, key: &DataKey, role: CipherRole, now: i64) -> TransportCipher {
    TransportCipher::bind(session, key, role, now).unwrap()
}

#[tokio::test]
async fn test_client_sealed_fields_open_on_server() {
    let harness = Harness::new();
    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();
    let hook = FieldCryptoHook::default();

    let data_key = DataKey::for_session(&session);
    let sealed_key = data_key.seal(&session).unwrap();
    let token = harness.negotiator.request_token(&session, &sealed_key).unwrap();
    let now = harness.clock.now_millis();

    let wire = hook
        .seal(
            &account(),
            FieldTag::RequestSensitive,
            &cipher(&session, &data_key, CipherRole::Encrypt, now),
        )
        .unwrap();
    assert_eq!(wire["holder"], "Lee");
    assert_eq!(wire["cards"][1]["brand"], "mc");
    assert_ne!(wire["cards"][1]["pan"], "5500000000000004");

    let context = harness
        .responder
        .open_request(session.session_id(), &token, &sealed_key)
        .await
        .unwrap();
    let decoded: DecodedPayload<Account> = hook
        .open(wire, FieldTag::RequestSensitive, &context.request)
        .unwrap();
    assert_eq!(decoded.value, account());
}

#[tokio::test]
async fn test_request_token_is_bound_to_data_key() {
    let harness = Harness::new();
    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();

    let sealed_key = DataKey::for_session(&session).seal(&session).unwrap();
    let other_key = DataKey::for_session(&session).seal(&session).unwrap();
    let token = harness.negotiator.request_token(&session, &sealed_key).unwrap();

    let err = harness
        .responder
        .open_request(session.session_id(), &token, &other_key)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TOKEN_INVALID");
}

#[tokio::test]
async fn test_replayed_request_token_is_rejected() {
    let harness = Harness::new();
    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();
    let sealed_key = DataKey::for_session(&session).seal(&session).unwrap();
    let token = harness.negotiator.request_token(&session, &sealed_key).unwrap();

    harness.clock.advance_secs(301);
    let err = harness
        .responder
        .open_request(session.session_id(), &token, &sealed_key)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TOKEN_INVALID");
}

#[tokio::test]
async fn test_propagate_policy_surfaces_decrypt_failure() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes256Gcm],
        vec![EncryptionScheme::Aes256Gcm],
    );
    let session = gcm_session(&harness).await;
    let now = harness.clock.now_millis();

    let wire = FieldCryptoHook::default()
        .seal(
            &account(),
            FieldTag::ResponseSensitive,
            &cipher(&session, &DataKey::for_session(&session), CipherRole::Encrypt, now),
        )
        .unwrap();

    let wrong_key = cipher(&session, &DataKey::for_session(&session), CipherRole::Decrypt, now);
    let err = FieldCryptoHook::new(DecryptFailurePolicy::Propagate)
        .open::<Account>(wire, FieldTag::ResponseSensitive, &wrong_key)
        .unwrap_err();
    assert_eq!(err.code(), "DECRYPT_FAILED");
}

#[tokio::test]
async fn test_flag_policy_reports_every_degraded_field() {
    let harness = Harness::with_schemes(
        vec![EncryptionScheme::Aes128Gcm],
        vec![EncryptionScheme::Aes128Gcm],
    );
    let session = gcm_session(&harness).await;
    let now = harness.clock.now_millis();

    let wire = FieldCryptoHook::default()
        .seal(
            &account(),
            FieldTag::ResponseSensitive,
            &cipher(&session, &DataKey::for_session(&session), CipherRole::Encrypt, now),
        )
        .unwrap();

    let wrong_key = cipher(&session, &DataKey::for_session(&session), CipherRole::Decrypt, now);
    let decoded = FieldCryptoHook::new(DecryptFailurePolicy::FlagAndPassThrough)
        .open::<Account>(wire.clone(), FieldTag::ResponseSensitive, &wrong_key)
        .unwrap();

    assert!(decoded.is_degraded());
    assert_eq!(
        decoded.degraded_fields,
        vec!["idCard", "cards[0].pan", "cards[1].pan"]
    );
    assert_eq!(decoded.value.id_card, wire["idCard"].as_str().unwrap());
    assert_eq!(decoded.value.holder, "Lee");
}

#[tokio::test]
async fn test_plaintext_from_older_peer_is_accepted() {
    let harness = Harness::new();
    let session = harness.negotiator.session_for(DESTINATION).await.unwrap();
    let decrypt = cipher(
        &session,
        &DataKey::for_session(&session),
        CipherRole::Decrypt,
        harness.clock.now_millis(),
    );

    let legacy = json!({
        "holder": "Lee",
        "idCard": "110101199003077777",
        "cards": [{ "pan": "4111 1111 1111 1111", "brand": "visa" }]
    });
    for policy in [
        DecryptFailurePolicy::Propagate,
        DecryptFailurePolicy::FlagAndPassThrough,
    ] {
        let decoded = FieldCryptoHook::new(policy)
            .open::<Account>(legacy.clone(), FieldTag::ResponseSensitive, &decrypt)
            .unwrap();
        assert!(!decoded.is_degraded());
        assert_eq!(decoded.value.id_card, "110101199003077777");
    }
}
