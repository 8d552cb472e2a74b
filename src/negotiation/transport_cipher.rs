// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Directional Transport Ciphers
//!
//! A `TransportCipher` is bound to one negotiated session plus one
//! per-request data key, and is either an `Encrypt` or a `Decrypt` cipher.
//! Each variant's inner type only exposes its own direction; the enum level
//! `encrypt`/`decrypt` calls return `UnsupportedCipherRole` for the other one.
//!
//! ## Data Keys
//!
//! Every secured request draws a random data key with the session key
//! length. It travels in the `X-S-xDK` header, sealed under the session key,
//! so field ciphertexts never reuse the session key directly.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::sync::Arc;

use super::types::NegotiationResult;
use crate::crypto::symmetric;
use crate::crypto::error::{NegotiationError, Result};
use crate::crypto::scheme::EncryptionScheme;

/// Direction a cipher was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherRole {
    Encrypt,
    Decrypt,
}

impl fmt::Display for CipherRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherRole::Encrypt => f.write_str("encrypt"),
            CipherRole::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Per-request symmetric key
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey(Vec<u8>);

impl DataKey {
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Generate a data key matching the session key length
    pub fn for_session(session: &NegotiationResult) -> Self {
        Self::generate(session.key_length())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encrypt this key under the session key, base64 encoded for the header
    pub fn seal(&self, session: &NegotiationResult) -> Result<String> {
        let sealed = symmetric::encrypt(
            session.encryption_scheme(),
            &session.shared_key(),
            &session.local_iv(),
            &self.0,
        )
        .map_err(|e| NegotiationError::EncryptFailed {
            target: "data_key".to_string(),
            reason: e.to_string(),
        })?;
        Ok(STANDARD.encode(sealed))
    }

    /// Recover a data key sealed by the peer
    pub fn open(session: &NegotiationResult, sealed: &str) -> Result<Self> {
        let failed = |reason: String| NegotiationError::DecryptFailed {
            target: "data_key".to_string(),
            reason,
        };
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|e| failed(format!("base64 decode error: {}", e)))?;
        let key = symmetric::decrypt(
            session.encryption_scheme(),
            &session.shared_key(),
            &session.local_iv(),
            &raw,
        )
        .map_err(|e| failed(e.to_string()))?;
        if key.len() != session.key_length() {
            return Err(failed(format!(
                "expected {} bytes, got {}",
                session.key_length(),
                key.len()
            )));
        }
        Ok(Self(key))
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey({} bytes)", self.0.len())
    }
}

struct BoundKey {
    session_id: String,
    scheme: EncryptionScheme,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl BoundKey {
    fn checked(session: &NegotiationResult, data_key: &DataKey, now_ms: i64) -> Result<Arc<Self>> {
        session.ensure_live(now_ms)?;
        if data_key.len() != session.key_length() {
            return Err(NegotiationError::failed(
                "bind_cipher",
                format!(
                    "data key is {} bytes but session {} uses {}",
                    data_key.len(),
                    session.session_id(),
                    session.key_length()
                ),
            ));
        }
        Ok(Arc::new(Self {
            session_id: session.session_id().to_string(),
            scheme: session.encryption_scheme(),
            key: data_key.0.clone(),
            iv: session.local_iv(),
        }))
    }
}

/// Encrypt-only half
#[derive(Clone)]
pub struct EncryptCipher {
    bound: Arc<BoundKey>,
}

impl EncryptCipher {
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        symmetric::encrypt(self.bound.scheme, &self.bound.key, &self.bound.iv, plaintext)
    }

    /// Encrypt a UTF-8 string into base64 ciphertext
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String> {
        Ok(STANDARD.encode(self.encrypt(plaintext.as_bytes())?))
    }
}

/// Decrypt-only half
#[derive(Clone)]
pub struct DecryptCipher {
    bound: Arc<BoundKey>,
}

impl DecryptCipher {
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        symmetric::decrypt(self.bound.scheme, &self.bound.key, &self.bound.iv, ciphertext)
    }

    /// Decrypt base64 ciphertext back into a UTF-8 string
    pub fn decrypt_str(&self, ciphertext: &str) -> Result<String> {
        let plaintext = self.decrypt(&STANDARD.decode(ciphertext)?)?;
        String::from_utf8(plaintext).map_err(|e| NegotiationError::DecryptFailed {
            target: "utf8".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Cipher bound to one session and one data key, restricted to one direction
#[derive(Clone)]
pub enum TransportCipher {
    Encrypt(EncryptCipher),
    Decrypt(DecryptCipher),
}

impl TransportCipher {
    /// Bind a cipher to a live session
    ///
    /// Binding to an expired session is a caller bug and fails with
    /// `NegotiationInvalid` rather than quietly producing a cipher.
    pub fn bind(
        session: &NegotiationResult,
        data_key: &DataKey,
        role: CipherRole,
        now_ms: i64,
    ) -> Result<Self> {
        let bound = BoundKey::checked(session, data_key, now_ms)?;
        Ok(match role {
            CipherRole::Encrypt => TransportCipher::Encrypt(EncryptCipher { bound }),
            CipherRole::Decrypt => TransportCipher::Decrypt(DecryptCipher { bound }),
        })
    }

    /// Encrypt and decrypt halves sharing one data key
    pub fn pair(
        session: &NegotiationResult,
        data_key: &DataKey,
        now_ms: i64,
    ) -> Result<(EncryptCipher, DecryptCipher)> {
        let bound = BoundKey::checked(session, data_key, now_ms)?;
        Ok((
            EncryptCipher {
                bound: bound.clone(),
            },
            DecryptCipher { bound },
        ))
    }

    pub fn role(&self) -> CipherRole {
        match self {
            TransportCipher::Encrypt(_) => CipherRole::Encrypt,
            TransportCipher::Decrypt(_) => CipherRole::Decrypt,
        }
    }

    fn bound(&self) -> &BoundKey {
        match self {
            TransportCipher::Encrypt(c) => &c.bound,
            TransportCipher::Decrypt(c) => &c.bound,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.bound().session_id
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.bound().scheme
    }

    /// True if this cipher was bound to `session`
    pub fn is_bound_to(&self, session: &NegotiationResult) -> bool {
        self.session_id() == session.session_id()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            TransportCipher::Encrypt(cipher) => cipher.encrypt(plaintext),
            TransportCipher::Decrypt(_) => Err(NegotiationError::UnsupportedCipherRole {
                role: CipherRole::Decrypt,
                operation: "encrypt",
            }),
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            TransportCipher::Decrypt(cipher) => cipher.decrypt(ciphertext),
            TransportCipher::Encrypt(_) => Err(NegotiationError::UnsupportedCipherRole {
                role: CipherRole::Encrypt,
                operation: "decrypt",
            }),
        }
    }
}

impl From<EncryptCipher> for TransportCipher {
    fn from(cipher: EncryptCipher) -> Self {
        TransportCipher::Encrypt(cipher)
    }
}

impl From<DecryptCipher> for TransportCipher {
    fn from(cipher: DecryptCipher) -> Self {
        TransportCipher::Decrypt(cipher)
    }
}

impl fmt::Debug for TransportCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCipher")
            .field("role", &self.role())
            .field("session_id", &self.session_id())
            .field("scheme", &self.scheme())
            .finish()
    }
}
