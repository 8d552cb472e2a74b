// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Negotiation data model and wire messages

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::crypto::ecdh::EphemeralKeyPair;
use crate::crypto::error::{NegotiationError, Result};
use crate::crypto::scheme::EncryptionScheme;

/// Header carrying the negotiated session id
pub const SESSION_ID_HEADER: &str = "X-S-xSessionID";
/// Header carrying the per-request signed token
pub const TOKEN_HEADER: &str = "X-S-xToken";
/// Header carrying the per-request data key, sealed under the session key
pub const DATA_KEY_HEADER: &str = "X-S-xDK";
/// Response header telling the client to drop its session and renegotiate
pub const NEGOTIATION_INVALID_TAG: &str = "Negotiation-Invalid-Tag";

/// Default negotiation endpoint path
pub const DEFAULT_NEGOTIATION_PATH: &str = "/api/security/v1/negotiation";

/// Which side of the handshake a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Keyed by destination service id
    Client,
    /// Keyed by inbound session id
    Server,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Client => f.write_str("client"),
            SessionRole::Server => f.write_str("server"),
        }
    }
}

/// Outcome of a completed handshake
///
/// Key bytes are private and only handed out as copies, so a caller holding
/// a clone can never mutate a cached session.
///
/// Responders keep their ephemeral pair on the session so that evicting the
/// session also releases the private key.
#[derive(Clone)]
pub struct NegotiationResult {
    other_party_public_key: Vec<u8>,
    session_id: String,
    shared_key: Vec<u8>,
    local_iv: Vec<u8>,
    encryption_scheme: EncryptionScheme,
    key_length: usize,
    expire_time_epoch_ms: i64,
    token_key: Vec<u8>,
    local_key_pair: Option<Arc<EphemeralKeyPair>>,
}

impl NegotiationResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        other_party_public_key: &[u8],
        session_id: impl Into<String>,
        shared_key: &[u8],
        local_iv: &[u8],
        encryption_scheme: EncryptionScheme,
        expire_time_epoch_ms: i64,
        token_key: &[u8],
    ) -> Self {
        Self {
            other_party_public_key: other_party_public_key.to_vec(),
            session_id: session_id.into(),
            shared_key: shared_key.to_vec(),
            local_iv: local_iv.to_vec(),
            encryption_scheme,
            key_length: encryption_scheme.key_len(),
            expire_time_epoch_ms,
            token_key: token_key.to_vec(),
            local_key_pair: None,
        }
    }

    /// Attach the local ephemeral pair that signed this session
    pub fn with_local_key_pair(mut self, pair: Arc<EphemeralKeyPair>) -> Self {
        self.local_key_pair = Some(pair);
        self
    }

    pub fn local_key_pair(&self) -> Option<&Arc<EphemeralKeyPair>> {
        self.local_key_pair.as_ref()
    }

    pub fn other_party_public_key(&self) -> Vec<u8> {
        self.other_party_public_key.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn shared_key(&self) -> Vec<u8> {
        self.shared_key.clone()
    }

    pub fn local_iv(&self) -> Vec<u8> {
        self.local_iv.clone()
    }

    pub fn token_key(&self) -> Vec<u8> {
        self.token_key.clone()
    }

    pub fn encryption_scheme(&self) -> EncryptionScheme {
        self.encryption_scheme
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    pub fn expire_time_epoch_ms(&self) -> i64 {
        self.expire_time_epoch_ms
    }

    /// Copy of this session with a different expiry
    pub fn with_expire_time(&self, expire_time_epoch_ms: i64) -> Self {
        Self {
            expire_time_epoch_ms,
            ..self.clone()
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expire_time_epoch_ms
    }

    /// Fail with `NegotiationInvalid` if the session is past its expiry
    pub fn ensure_live(&self, now_ms: i64) -> Result<()> {
        if self.is_expired(now_ms) {
            return Err(NegotiationError::invalid(
                &self.session_id,
                format!("session expired at {}", self.expire_time_epoch_ms),
            ));
        }
        Ok(())
    }
}

impl PartialEq for NegotiationResult {
    fn eq(&self, other: &Self) -> bool {
        let local_public_key =
            |session: &Self| session.local_key_pair.as_ref().map(|p| p.public_key_bytes());
        self.other_party_public_key == other.other_party_public_key
            && self.session_id == other.session_id
            && self.shared_key == other.shared_key
            && self.local_iv == other.local_iv
            && self.encryption_scheme == other.encryption_scheme
            && self.key_length == other.key_length
            && self.expire_time_epoch_ms == other.expire_time_epoch_ms
            && self.token_key == other.token_key
            && local_public_key(self) == local_public_key(other)
    }
}

impl Eq for NegotiationResult {}

impl fmt::Debug for NegotiationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationResult")
            .field("session_id", &self.session_id)
            .field("encryption_scheme", &self.encryption_scheme)
            .field("key_length", &self.key_length)
            .field("expire_time_epoch_ms", &self.expire_time_epoch_ms)
            .finish_non_exhaustive()
    }
}

/// Handshake initiation, client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub token: String,
    /// Base64 SEC1 public key of the client's ephemeral pair
    #[serde(default)]
    pub public_key: String,
    /// Scheme wire names as offered; names this side does not know are kept
    /// so the client's token still verifies
    #[serde(default)]
    pub supported_schemes: Vec<String>,
    #[serde(default)]
    pub refresh: bool,
}

impl NegotiationRequest {
    /// Reject requests with absent or empty required fields
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(NegotiationError::missing("sessionId"));
        }
        if self.token.trim().is_empty() {
            return Err(NegotiationError::missing("token"));
        }
        if self.public_key.trim().is_empty() {
            return Err(NegotiationError::missing("publicKey"));
        }
        if self.supported_schemes.is_empty() {
            return Err(NegotiationError::missing("supportedSchemes"));
        }
        Ok(())
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        decode_public_key(&self.public_key)
    }

    /// Fields covered by the client's initiation token
    pub fn signing_parts(&self) -> Vec<Vec<u8>> {
        vec![
            self.session_id.as_bytes().to_vec(),
            self.public_key.as_bytes().to_vec(),
            self.canonical_schemes().into_bytes(),
            self.refresh.to_string().into_bytes(),
        ]
    }

    /// Offered schemes this side understands, unknown names skipped
    pub fn known_schemes(&self) -> Vec<EncryptionScheme> {
        self.supported_schemes
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }

    /// Canonical scheme list: trimmed, deduplicated and sorted by wire name
    pub fn canonical_schemes(&self) -> String {
        let mut names: Vec<&str> = self.supported_schemes.iter().map(|s| s.trim()).collect();
        names.sort_unstable();
        names.dedup();
        names.join(",")
    }
}

/// Handshake reply, server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    pub session_id: String,
    pub token: String,
    /// Base64 SEC1 public key of the server's ephemeral pair
    pub public_key: String,
    pub chosen_scheme: EncryptionScheme,
    pub key_bytes_length: usize,
    /// Session lifetime relative to receipt
    pub expire_time_ms: i64,
}

impl NegotiationResponse {
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        decode_public_key(&self.public_key)
    }

    /// Fields covered by the server's token, bound to the client's public key
    pub fn signing_parts(&self, client_public_key: &str) -> Vec<Vec<u8>> {
        vec![
            self.session_id.as_bytes().to_vec(),
            self.public_key.as_bytes().to_vec(),
            self.chosen_scheme.as_str().as_bytes().to_vec(),
            self.key_bytes_length.to_string().into_bytes(),
            self.expire_time_ms.to_string().into_bytes(),
            client_public_key.as_bytes().to_vec(),
        ]
    }
}

/// Borrow owned signing parts as the slice form the signer takes
pub fn as_parts(parts: &[Vec<u8>]) -> Vec<&[u8]> {
    parts.iter().map(Vec::as_slice).collect()
}

/// Error body returned by the HTTP edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    /// Rebuild a typed error from a peer's error body
    pub fn into_error(self, status: u16) -> NegotiationError {
        let reason = self.message;
        match self.code.as_str() {
            "MISSING_REQUIRED_PARAM" => NegotiationError::MissingRequiredParam { param: reason },
            "TOKEN_INVALID" => NegotiationError::token_invalid("peer", reason),
            "NEGOTIATION_INVALID" => NegotiationError::invalid("peer", reason),
            "NEGOTIATION_FAILED" => NegotiationError::failed("peer", reason),
            "ENCRYPT_FAILED" => NegotiationError::EncryptFailed {
                target: "peer".to_string(),
                reason,
            },
            "DECRYPT_FAILED" => NegotiationError::DecryptFailed {
                target: "peer".to_string(),
                reason,
            },
            code => {
                NegotiationError::Transport(format!("peer answered {} {}: {}", status, code, reason))
            }
        }
    }
}

fn decode_public_key(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| NegotiationError::failed("decode_public_key", e))
}
