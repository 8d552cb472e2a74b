// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ECDH Key Agreement and Session Key Derivation
//!
//! Both peers generate an ephemeral secp256k1 key pair per handshake and
//! exchange only the public halves. Each side computes the same ECDH shared
//! point and runs it through HKDF-SHA256 (salted with the session id) to
//! obtain identical session material without ever sending a symmetric key.

use hkdf::Hkdf;
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    EncodedPoint, PublicKey, SecretKey,
};
use rand::rngs::OsRng;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::{NegotiationError, Result};

/// Length of the IV derived for CBC schemes
pub const LOCAL_IV_LEN: usize = 16;

/// Length of the HMAC key used for per-request tokens
pub const TOKEN_KEY_LEN: usize = 32;

const SESSION_KEY_INFO: &[u8] = b"shoulder-negotiation/session-key";
const LOCAL_IV_INFO: &[u8] = b"shoulder-negotiation/local-iv";
const TOKEN_KEY_INFO: &[u8] = b"shoulder-negotiation/request-token";

/// Ephemeral secp256k1 key pair owned by one side of a handshake
#[derive(Clone)]
pub struct EphemeralKeyPair {
    secret: SecretKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// SEC1 compressed public key (33 bytes)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.secret
            .public_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Compute the raw ECDH shared secret with a peer public key
    pub fn diffie_hellman(&self, peer_public_key: &[u8]) -> Result<[u8; 32]> {
        let peer = parse_public_key(peer_public_key)?;
        let shared = k256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Parse a SEC1 public key, compressed (33 bytes) or uncompressed (65 bytes)
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != 33 && bytes.len() != 65 {
        return Err(NegotiationError::failed(
            "parse_public_key",
            format!("expected 33 or 65 bytes, got {}", bytes.len()),
        ));
    }

    let encoded_point = EncodedPoint::from_bytes(bytes)
        .map_err(|e| NegotiationError::failed("parse_public_key", e))?;

    Option::<PublicKey>::from(PublicKey::from_encoded_point(&encoded_point))
        .ok_or_else(|| NegotiationError::failed("parse_public_key", "invalid curve point"))
}

/// Symmetric material shared by both peers after a handshake
#[derive(Clone, PartialEq, Eq)]
pub struct SessionMaterial {
    pub session_key: Vec<u8>,
    pub local_iv: Vec<u8>,
    pub token_key: Vec<u8>,
}

impl fmt::Debug for SessionMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMaterial")
            .field("session_key_len", &self.session_key.len())
            .finish_non_exhaustive()
    }
}

/// Derive session key, IV and request-token key from an ECDH secret
///
/// Deterministic for identical inputs, so client and server converge as
/// long as they agree on the session id and key length.
pub fn derive_session_material(
    shared_secret: &[u8],
    session_id: &str,
    key_len: usize,
) -> Result<SessionMaterial> {
    if !matches!(key_len, 16 | 24 | 32) {
        return Err(NegotiationError::failed(
            "derive_session_material",
            format!("unsupported key length {}", key_len),
        ));
    }

    let hkdf = Hkdf::<Sha256>::new(Some(session_id.as_bytes()), shared_secret);

    let mut session_key = vec![0u8; key_len];
    let mut local_iv = vec![0u8; LOCAL_IV_LEN];
    let mut token_key = vec![0u8; TOKEN_KEY_LEN];

    for (info, out) in [
        (SESSION_KEY_INFO, session_key.as_mut_slice()),
        (LOCAL_IV_INFO, local_iv.as_mut_slice()),
        (TOKEN_KEY_INFO, token_key.as_mut_slice()),
    ] {
        hkdf.expand(info, out)
            .map_err(|e| NegotiationError::failed("hkdf_expand", e))?;
    }

    Ok(SessionMaterial {
        session_key,
        local_iv,
        token_key,
    })
}

/// Generates and stores ephemeral key pairs by logical id
///
/// Clients key pairs by destination id, responders by session id. A pair is
/// held only while its handshake is in flight.
pub trait AsymmetricKeyPairProvider: Send + Sync {
    /// Generate a fresh key pair, replacing any pair stored under `id`
    fn generate(&self, id: &str) -> Arc<EphemeralKeyPair>;

    fn get(&self, id: &str) -> Option<Arc<EphemeralKeyPair>>;

    fn remove(&self, id: &str);
}

/// Process-local key pair provider
#[derive(Default)]
pub struct InMemoryKeyPairProvider {
    pairs: RwLock<HashMap<String, Arc<EphemeralKeyPair>>>,
}

impl InMemoryKeyPairProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsymmetricKeyPairProvider for InMemoryKeyPairProvider {
    fn generate(&self, id: &str) -> Arc<EphemeralKeyPair> {
        let pair = Arc::new(EphemeralKeyPair::generate());
        self.pairs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), pair.clone());
        pair
    }

    fn get(&self, id: &str) -> Option<Arc<EphemeralKeyPair>> {
        self.pairs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn remove(&self, id: &str) {
        self.pairs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}
