// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Server-side handshake and request guard
//!
//! `NegotiationResponder::respond` answers a `NegotiationRequest`:
//! validate, check the client's self-signed token, pick the strongest common
//! scheme, generate an ephemeral pair, derive the session material and store
//! the session under `SessionCache[server][sessionId]`.
//!
//! The endpoint is idempotent per session id. A retried request carrying the
//! same client public key gets the already negotiated session back, re-signed
//! with a fresh timestamp. `refresh=true` discards the old session first.
//! The responder's ephemeral pair lives on the cached session, so expiry and
//! eviction release it along with the session.
//!
//! `open_request` guards every secured call made on an established session
//! and hands back the decrypt/encrypt cipher pair for that call.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;

use super::session_cache::SessionCache;
use super::single_flight::KeyedGate;
use super::transport_cipher::{DataKey, TransportCipher};
use super::types::{
    as_parts, NegotiationRequest, NegotiationResponse, NegotiationResult, SessionRole,
    DATA_KEY_HEADER, SESSION_ID_HEADER, TOKEN_HEADER,
};
use crate::config::NegotiationConfig;
use crate::crypto::ecdh::{derive_session_material, AsymmetricKeyPairProvider, EphemeralKeyPair};
use crate::crypto::error::{NegotiationError, Result};
use crate::crypto::scheme::EncryptionScheme;
use crate::crypto::signer::{EcdsaSignKey, EcdsaVerifyKey, HmacKey, Signer};

/// Ciphers for one inbound secured call
#[derive(Debug, Clone)]
pub struct ServerCryptoContext {
    pub session: NegotiationResult,
    /// Decrypts request-sensitive fields
    pub request: TransportCipher,
    /// Encrypts response-sensitive fields
    pub response: TransportCipher,
}

pub struct NegotiationResponder {
    config: Arc<NegotiationConfig>,
    cache: SessionCache,
    key_pairs: Arc<dyn AsymmetricKeyPairProvider>,
    signer: Signer,
    gates: KeyedGate,
}

impl NegotiationResponder {
    pub fn new(
        config: Arc<NegotiationConfig>,
        cache: SessionCache,
        key_pairs: Arc<dyn AsymmetricKeyPairProvider>,
    ) -> Self {
        let signer = Signer::new(cache.clock().clone());
        Self {
            config,
            cache,
            key_pairs,
            signer,
            gates: KeyedGate::new(),
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Answer a handshake request
    pub async fn respond(&self, request: &NegotiationRequest) -> Result<NegotiationResponse> {
        request.validate()?;

        let client_public_key = request
            .public_key_bytes()
            .map_err(|e| NegotiationError::token_invalid("negotiation_request", e))?;
        let verify_key = EcdsaVerifyKey::from_public_key(&client_public_key)
            .map_err(|e| NegotiationError::token_invalid("negotiation_request", e))?;
        if let Err(e) = self.signer.check(
            &request.token,
            &verify_key,
            self.config.token_window_secs,
            &as_parts(&request.signing_parts()),
        ) {
            tracing::warn!(
                "❌ Rejected negotiation request: session_id={} error={}",
                request.session_id,
                e
            );
            return Err(NegotiationError::token_invalid("negotiation_request", e));
        }

        let session_id = request.session_id.as_str();
        let _gate = self.gates.acquire(session_id).await;

        if request.refresh {
            self.discard(session_id).await;
        } else if let Some(existing) = self.cache.get(SessionRole::Server, session_id).await {
            return self.replay(&existing, &client_public_key, &request.public_key);
        }

        let scheme =
            EncryptionScheme::select_strongest(&self.config.supported_schemes, &request.known_schemes())
                .ok_or_else(|| {
                    NegotiationError::failed(
                        "select_scheme",
                        format!("no common scheme in [{}]", request.canonical_schemes()),
                    )
                })?;

        let pair = self.key_pairs.generate(session_id);
        let established = self.establish(request, &pair, &client_public_key, scheme);
        // From here on the pair lives on the cached session only
        self.key_pairs.remove(session_id);
        let (session, response) = established?;
        let session = session.with_local_key_pair(pair);

        self.cache
            .put(SessionRole::Server, session_id, session)
            .await;
        tracing::info!(
            "✅ Negotiation accepted: session_id={} scheme={} key_length={} ttl_ms={}",
            session_id,
            scheme,
            scheme.key_len(),
            response.expire_time_ms
        );
        Ok(response)
    }

    /// Validate a secured call and build its cipher pair
    pub async fn open_request(
        &self,
        session_id: &str,
        token: &str,
        sealed_data_key: &str,
    ) -> Result<ServerCryptoContext> {
        if session_id.trim().is_empty() {
            return Err(NegotiationError::missing(SESSION_ID_HEADER));
        }
        if token.trim().is_empty() {
            return Err(NegotiationError::missing(TOKEN_HEADER));
        }
        if sealed_data_key.trim().is_empty() {
            return Err(NegotiationError::missing(DATA_KEY_HEADER));
        }

        let session = self
            .cache
            .get(SessionRole::Server, session_id)
            .await
            .ok_or_else(|| NegotiationError::invalid(session_id, "unknown or expired session"))?;

        self.signer
            .check(
                token,
                &HmacKey::new(&session.token_key()),
                self.config.token_window_secs,
                &[session_id.as_bytes(), sealed_data_key.as_bytes()],
            )
            .map_err(|e| NegotiationError::token_invalid("request_token", e))?;

        let data_key = DataKey::open(&session, sealed_data_key)?;
        let (encrypt, decrypt) =
            TransportCipher::pair(&session, &data_key, self.cache.clock().now_millis())?;

        tracing::debug!("Secured request accepted: session_id={}", session_id);
        Ok(ServerCryptoContext {
            session,
            request: decrypt.into(),
            response: encrypt.into(),
        })
    }

    /// Forget a server session and its key pair
    pub async fn invalidate(&self, session_id: &str) -> bool {
        let _gate = self.gates.acquire(session_id).await;
        self.discard(session_id).await
    }

    async fn discard(&self, session_id: &str) -> bool {
        self.cache
            .invalidate(SessionRole::Server, session_id)
            .await
            .is_some()
    }

    fn establish(
        &self,
        request: &NegotiationRequest,
        pair: &EphemeralKeyPair,
        client_public_key: &[u8],
        scheme: EncryptionScheme,
    ) -> Result<(NegotiationResult, NegotiationResponse)> {
        let shared_secret = pair.diffie_hellman(client_public_key)?;
        let material =
            derive_session_material(&shared_secret, &request.session_id, scheme.key_len())?;

        let ttl_ms = self.config.session_ttl_ms();
        let session = NegotiationResult::new(
            client_public_key,
            request.session_id.clone(),
            &material.session_key,
            &material.local_iv,
            scheme,
            self.cache.clock().now_millis().saturating_add(ttl_ms),
            &material.token_key,
        );
        let response = self.signed_response(pair, &session, ttl_ms, &request.public_key)?;
        Ok((session, response))
    }

    /// Re-sign the stored session for a retried request
    fn replay(
        &self,
        existing: &NegotiationResult,
        client_public_key: &[u8],
        encoded_client_key: &str,
    ) -> Result<NegotiationResponse> {
        let session_id = existing.session_id();
        if existing.other_party_public_key() != client_public_key {
            return Err(NegotiationError::failed(
                "negotiate",
                format!("session {} is bound to a different client key", session_id),
            ));
        }
        let pair = existing.local_key_pair().ok_or_else(|| {
            NegotiationError::failed("negotiate", format!("key pair for {} is gone", session_id))
        })?;

        let remaining_ms = existing.expire_time_epoch_ms() - self.cache.clock().now_millis();
        tracing::info!(
            "🔁 Replaying negotiation: session_id={} remaining_ms={}",
            session_id,
            remaining_ms
        );
        self.signed_response(pair, existing, remaining_ms, encoded_client_key)
    }

    fn signed_response(
        &self,
        pair: &EphemeralKeyPair,
        session: &NegotiationResult,
        expire_time_ms: i64,
        encoded_client_key: &str,
    ) -> Result<NegotiationResponse> {
        let mut response = NegotiationResponse {
            session_id: session.session_id().to_string(),
            token: String::new(),
            public_key: STANDARD.encode(pair.public_key_bytes()),
            chosen_scheme: session.encryption_scheme(),
            key_bytes_length: session.key_length(),
            expire_time_ms,
        };
        response.token = self.signer.sign(
            &EcdsaSignKey::from_pair(pair),
            &as_parts(&response.signing_parts(encoded_client_key)),
        )?;
        Ok(response)
    }
}
