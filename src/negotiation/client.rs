// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client-side handshake
//!
//! `Negotiator` owns the client half of the state machine:
//!
//! 1. Look up `SessionCache[client][destination]`; a live entry is reused.
//! 2. Otherwise generate an ephemeral key pair, build and self-sign a
//!    `NegotiationRequest`, and POST it through the `Transport`.
//! 3. Verify the response token against the server's public key, derive the
//!    same session material as the server, and only then publish the
//!    session to the cache.
//!
//! Concurrent callers for one destination share a single handshake and all
//! receive its outcome, including a failure or a timeout.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;

use super::session_cache::SessionCache;
use super::single_flight::SingleFlight;
use super::transport::Transport;
use super::types::{as_parts, NegotiationRequest, NegotiationResponse, NegotiationResult, SessionRole};
use crate::config::NegotiationConfig;
use crate::crypto::ecdh::{derive_session_material, AsymmetricKeyPairProvider, EphemeralKeyPair};
use crate::crypto::error::{NegotiationError, Result};
use crate::crypto::signer::{EcdsaSignKey, EcdsaVerifyKey, HmacKey, Signer};

pub struct Negotiator {
    config: Arc<NegotiationConfig>,
    cache: SessionCache,
    key_pairs: Arc<dyn AsymmetricKeyPairProvider>,
    transport: Arc<dyn Transport>,
    signer: Signer,
    flights: SingleFlight<Result<NegotiationResult>>,
}

impl Negotiator {
    pub fn new(
        config: Arc<NegotiationConfig>,
        cache: SessionCache,
        key_pairs: Arc<dyn AsymmetricKeyPairProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let signer = Signer::new(cache.clock().clone());
        Self {
            config,
            cache,
            key_pairs,
            transport,
            signer,
            flights: SingleFlight::new(),
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn now_millis(&self) -> i64 {
        self.cache.clock().now_millis()
    }

    /// Live session for `destination`, negotiating one if needed
    pub async fn session_for(&self, destination: &str) -> Result<NegotiationResult> {
        if let Some(session) = self.cache.get(SessionRole::Client, destination).await {
            tracing::debug!(
                "Reusing session {} for {}",
                session.session_id(),
                destination
            );
            return Ok(session);
        }

        self.flights
            .run(destination, || async {
                // A flight may have landed between the lookup above and here
                if let Some(session) = self.cache.get(SessionRole::Client, destination).await {
                    return Ok(session);
                }
                self.handshake(destination, false).await
            })
            .await
    }

    /// Drop the cached session and negotiate a fresh one with `refresh=true`
    pub async fn renegotiate(&self, destination: &str) -> Result<NegotiationResult> {
        self.flights
            .run(destination, || async {
                self.cache.invalidate(SessionRole::Client, destination).await;
                self.handshake(destination, true).await
            })
            .await
    }

    /// Purge the cached session for `destination`
    pub async fn invalidate(&self, destination: &str) {
        self.cache.invalidate(SessionRole::Client, destination).await;
    }

    /// Per-request token over the session id and sealed data key
    pub fn request_token(&self, session: &NegotiationResult, sealed_data_key: &str) -> Result<String> {
        self.signer.sign(
            &HmacKey::new(&session.token_key()),
            &[session.session_id().as_bytes(), sealed_data_key.as_bytes()],
        )
    }

    async fn handshake(&self, destination: &str, refresh: bool) -> Result<NegotiationResult> {
        let pair = self.key_pairs.generate(destination);
        let mut request = NegotiationRequest {
            session_id: uuid::Uuid::new_v4().to_string(),
            token: String::new(),
            public_key: STANDARD.encode(pair.public_key_bytes()),
            supported_schemes: self
                .config
                .supported_schemes
                .iter()
                .map(|scheme| scheme.to_string())
                .collect(),
            refresh,
        };
        request.token = self
            .signer
            .sign(&EcdsaSignKey::from_pair(&pair), &as_parts(&request.signing_parts()))?;

        tracing::info!(
            "🤝 Negotiating with {}: session_id={} refresh={}",
            destination,
            request.session_id,
            refresh
        );

        let timeout = self.config.handshake_timeout;
        let outcome = match tokio::time::timeout(
            timeout,
            self.transport.negotiate(destination, &request),
        )
        .await
        {
            Ok(Ok(response)) => self.complete(&request, &pair, &response),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(NegotiationError::Timeout {
                destination: destination.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        // The pair is only needed for this exchange
        self.key_pairs.remove(destination);

        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    "❌ Negotiation with {} rejected: session_id={} error={}",
                    destination,
                    request.session_id,
                    e
                );
                return Err(e);
            }
        };

        self.cache
            .put(SessionRole::Client, destination, session.clone())
            .await;
        tracing::info!(
            "✅ Negotiated with {}: session_id={} scheme={} key_length={}",
            destination,
            session.session_id(),
            session.encryption_scheme(),
            session.key_length()
        );
        Ok(session)
    }

    /// Verify the response and derive the session it describes
    fn complete(
        &self,
        request: &NegotiationRequest,
        pair: &EphemeralKeyPair,
        response: &NegotiationResponse,
    ) -> Result<NegotiationResult> {
        if response.session_id != request.session_id {
            return Err(NegotiationError::token_invalid(
                "negotiation_response",
                "session id does not match request",
            ));
        }

        let server_public_key = response
            .public_key_bytes()
            .map_err(|e| NegotiationError::token_invalid("negotiation_response", e))?;
        let verify_key = EcdsaVerifyKey::from_public_key(&server_public_key)
            .map_err(|e| NegotiationError::token_invalid("negotiation_response", e))?;
        self.signer
            .check(
                &response.token,
                &verify_key,
                self.config.token_window_secs,
                &as_parts(&response.signing_parts(&request.public_key)),
            )
            .map_err(|e| NegotiationError::token_invalid("negotiation_response", e))?;

        let scheme = response.chosen_scheme;
        if !request.known_schemes().contains(&scheme) {
            return Err(NegotiationError::failed(
                "negotiation_response",
                format!("server chose unoffered scheme {}", scheme),
            ));
        }
        if response.key_bytes_length != scheme.key_len() {
            return Err(NegotiationError::failed(
                "negotiation_response",
                format!(
                    "key length {} does not match {}",
                    response.key_bytes_length, scheme
                ),
            ));
        }
        if response.expire_time_ms <= 0 {
            return Err(NegotiationError::failed(
                "negotiation_response",
                "non-positive session lifetime",
            ));
        }

        let shared_secret = pair.diffie_hellman(&server_public_key)?;
        let material =
            derive_session_material(&shared_secret, &request.session_id, scheme.key_len())?;

        Ok(NegotiationResult::new(
            &server_public_key,
            request.session_id.clone(),
            &material.session_key,
            &material.local_iv,
            scheme,
            self.now_millis().saturating_add(response.expire_time_ms),
            &material.token_key,
        ))
    }
}
