// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signed Tokens with Replay Window
//!
//! Every token on the wire has the same layout:
//!
//! ```text
//! base64(timestamp_ms) "." base64(tag(len_prefixed(parts) || timestamp_ms))
//! ```
//!
//! The tag is HMAC-SHA256 for per-request tokens (keyed by the negotiated
//! token key) and ECDSA over secp256k1 for handshake messages (keyed by the
//! sender's ephemeral private key). Verification recomputes or checks the tag
//! and separately enforces the freshness window.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use k256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::clock::Clock;
use super::ecdh::{parse_public_key, EphemeralKeyPair};
use super::error::{NegotiationError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Key able to produce a token tag
pub trait SignKey {
    fn tag(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Key able to check a token tag
pub trait VerifyKey {
    fn check_tag(&self, message: &[u8], tag: &[u8]) -> bool;
}

/// HMAC-SHA256 key, symmetric: signs and verifies
#[derive(Clone)]
pub struct HmacKey(Vec<u8>);

impl HmacKey {
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.0).map_err(|e| NegotiationError::failed("hmac_key", e))
    }
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacKey(..)")
    }
}

impl SignKey for HmacKey {
    fn tag(&self, message: &[u8]) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl VerifyKey for HmacKey {
    fn check_tag(&self, message: &[u8], tag: &[u8]) -> bool {
        match self.tag(message) {
            Ok(expected) => expected.ct_eq(tag).into(),
            Err(_) => false,
        }
    }
}

/// ECDSA signing half of an ephemeral key pair
pub struct EcdsaSignKey(SigningKey);

impl EcdsaSignKey {
    pub fn from_pair(pair: &EphemeralKeyPair) -> Self {
        Self(SigningKey::from(pair.secret()))
    }
}

impl SignKey for EcdsaSignKey {
    fn tag(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self.0.sign(message);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA verification key parsed from a peer's SEC1 public key
pub struct EcdsaVerifyKey(VerifyingKey);

impl EcdsaVerifyKey {
    pub fn from_public_key(bytes: &[u8]) -> Result<Self> {
        let public_key = parse_public_key(bytes)?;
        Ok(Self(VerifyingKey::from(public_key)))
    }
}

impl VerifyKey for EcdsaVerifyKey {
    fn check_tag(&self, message: &[u8], tag: &[u8]) -> bool {
        match Signature::from_slice(tag) {
            Ok(signature) => self.0.verify(message, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

/// Token signer and verifier bound to a clock
#[derive(Clone)]
pub struct Signer {
    clock: Arc<dyn Clock>,
    #[cfg(debug_assertions)]
    skip_freshness: bool,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            #[cfg(debug_assertions)]
            skip_freshness: false,
        }
    }

    /// Debug builds only: accept tokens regardless of age
    #[cfg(debug_assertions)]
    pub fn without_freshness_check(mut self) -> Self {
        tracing::warn!("Token freshness check disabled (debug build)");
        self.skip_freshness = true;
        self
    }

    #[cfg(debug_assertions)]
    fn freshness_disabled(&self) -> bool {
        self.skip_freshness
    }

    #[cfg(not(debug_assertions))]
    fn freshness_disabled(&self) -> bool {
        false
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `parts` together with the current timestamp
    pub fn sign<K: SignKey + ?Sized>(&self, key: &K, parts: &[&[u8]]) -> Result<String> {
        let timestamp = self.clock.now_millis().to_string();
        let tag = key.tag(&signing_input(parts, &timestamp))?;
        Ok(format!(
            "{}.{}",
            STANDARD.encode(timestamp.as_bytes()),
            STANDARD.encode(tag)
        ))
    }

    /// Boolean form of [`Signer::check`]
    pub fn verify<K: VerifyKey + ?Sized>(
        &self,
        signed_blob: &str,
        key: &K,
        window_secs: u64,
        parts: &[&[u8]],
    ) -> bool {
        self.check(signed_blob, key, window_secs, parts).is_ok()
    }

    /// Verify the tag over `parts`, then enforce the freshness window
    ///
    /// Timestamps further in the future than the window are rejected too, so
    /// clock skew between peers is bounded by the same window.
    pub fn check<K: VerifyKey + ?Sized>(
        &self,
        signed_blob: &str,
        key: &K,
        window_secs: u64,
        parts: &[&[u8]],
    ) -> Result<()> {
        let (encoded_ts, encoded_tag) = signed_blob
            .split_once('.')
            .ok_or_else(|| NegotiationError::token_invalid("verify", "malformed token"))?;

        let timestamp = STANDARD
            .decode(encoded_ts)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| NegotiationError::token_invalid("verify", "malformed timestamp"))?;
        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| NegotiationError::token_invalid("verify", "malformed timestamp"))?;
        let tag = STANDARD
            .decode(encoded_tag)
            .map_err(|_| NegotiationError::token_invalid("verify", "malformed tag"))?;

        if !key.check_tag(&signing_input(parts, &timestamp), &tag) {
            return Err(NegotiationError::token_invalid(
                "verify",
                "signature mismatch",
            ));
        }

        if self.freshness_disabled() {
            return Ok(());
        }

        let window_ms = i64::try_from(window_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        let age_ms = self.clock.now_millis().saturating_sub(issued_at);
        if age_ms > window_ms || age_ms < -window_ms {
            return Err(NegotiationError::token_invalid(
                "verify",
                format!("token outside {}s freshness window", window_secs),
            ));
        }

        Ok(())
    }
}

/// Length-prefixed concatenation of parts followed by the timestamp
fn signing_input(parts: &[&[u8]], timestamp: &str) -> Vec<u8> {
    let mut input = Vec::with_capacity(parts.iter().map(|p| p.len() + 4).sum::<usize>() + 24);
    for part in parts {
        input.extend_from_slice(&(part.len() as u32).to_be_bytes());
        input.extend_from_slice(part);
    }
    input.extend_from_slice(timestamp.as_bytes());
    input
}
