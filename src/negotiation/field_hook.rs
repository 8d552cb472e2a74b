// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Field-level selective encryption
//!
//! Payload types name their sensitive fields through [`SensitiveFields`]:
//! dot paths into the serialized JSON (`customer.idCard`). Arrays on the way
//! are walked element-wise, so `items.pan` covers every element of `items`.
//!
//! Only string leaves are ciphered. A tagged field that is absent or `null`
//! is left alone. On the inbound side a value that does not look like
//! ciphertext is passed through untouched, so a peer that has not started
//! encrypting a field yet keeps working.
//!
//! When an inbound field looks like ciphertext but fails to decrypt, the
//! hook applies its [`DecryptFailurePolicy`]. It never swaps in plaintext
//! silently.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::transport_cipher::TransportCipher;
use crate::crypto::error::{NegotiationError, Result};

/// Smallest ciphertext any supported scheme produces (one CBC block)
const MIN_CIPHERTEXT_LEN: usize = 16;

/// What to do with an inbound field that looks encrypted but will not decrypt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecryptFailurePolicy {
    /// Fail the whole payload with `DecryptFailed`
    #[default]
    Propagate,
    /// Keep the raw ciphertext and report the field in `degraded_fields`
    FlagAndPassThrough,
}

impl FromStr for DecryptFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(DecryptFailurePolicy::Propagate),
            "flag" | "flag_and_pass_through" => Ok(DecryptFailurePolicy::FlagAndPassThrough),
            other => Err(format!("Unknown decrypt failure policy: {}", other)),
        }
    }
}

impl fmt::Display for DecryptFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptFailurePolicy::Propagate => f.write_str("propagate"),
            DecryptFailurePolicy::FlagAndPassThrough => f.write_str("flag"),
        }
    }
}

/// Which direction a field is sensitive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    /// Encrypted by the client before sending, decrypted by the server
    RequestSensitive,
    /// Encrypted by the server before replying, decrypted by the client
    ResponseSensitive,
}

/// Declares the sensitive field paths of a payload type
pub trait SensitiveFields {
    fn sensitive_fields(tag: FieldTag) -> &'static [&'static str];
}

/// Plain JSON values carry no tags of their own
impl SensitiveFields for Value {
    fn sensitive_fields(_tag: FieldTag) -> &'static [&'static str] {
        &[]
    }
}

/// A decoded payload plus the fields left as ciphertext
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload<T> {
    pub value: T,
    pub degraded_fields: Vec<String>,
}

impl<T> DecodedPayload<T> {
    /// True if any field could not be decrypted
    pub fn is_degraded(&self) -> bool {
        !self.degraded_fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldCryptoHook {
    policy: DecryptFailurePolicy,
}

impl FieldCryptoHook {
    pub fn new(policy: DecryptFailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecryptFailurePolicy {
        self.policy
    }

    /// Serialize `payload` and encrypt the fields carrying `tag`
    pub fn seal<T: Serialize + SensitiveFields>(
        &self,
        payload: &T,
        tag: FieldTag,
        cipher: &TransportCipher,
    ) -> Result<Value> {
        let mut value = serde_json::to_value(payload).map_err(|e| NegotiationError::EncryptFailed {
            target: "payload".to_string(),
            reason: e.to_string(),
        })?;
        self.seal_value(&mut value, T::sensitive_fields(tag), cipher)?;
        Ok(value)
    }

    /// Decrypt the fields carrying `tag` and deserialize into `T`
    pub fn open<T: DeserializeOwned + SensitiveFields>(
        &self,
        mut value: Value,
        tag: FieldTag,
        cipher: &TransportCipher,
    ) -> Result<DecodedPayload<T>> {
        let degraded_fields = self.open_value(&mut value, T::sensitive_fields(tag), cipher)?;
        let value = serde_json::from_value(value).map_err(|e| NegotiationError::DecryptFailed {
            target: "payload".to_string(),
            reason: e.to_string(),
        })?;
        Ok(DecodedPayload {
            value,
            degraded_fields,
        })
    }

    /// Encrypt string leaves at `paths` in place
    pub fn seal_value(&self, value: &mut Value, paths: &[&str], cipher: &TransportCipher) -> Result<()> {
        for path in paths {
            let segments: Vec<&str> = path.split('.').collect();
            visit_leaves(value, &segments, String::new(), &mut |field, leaf| {
                seal_leaf(field, leaf, cipher)
            })?;
        }
        Ok(())
    }

    /// Decrypt string leaves at `paths` in place, returning degraded paths
    pub fn open_value(
        &self,
        value: &mut Value,
        paths: &[&str],
        cipher: &TransportCipher,
    ) -> Result<Vec<String>> {
        let mut degraded = Vec::new();
        for path in paths {
            let segments: Vec<&str> = path.split('.').collect();
            visit_leaves(value, &segments, String::new(), &mut |field, leaf| {
                match open_leaf(field, leaf, cipher) {
                    Ok(()) => Ok(()),
                    Err(e @ NegotiationError::UnsupportedCipherRole { .. }) => Err(e),
                    Err(e) => match self.policy {
                        DecryptFailurePolicy::Propagate => Err(e),
                        DecryptFailurePolicy::FlagAndPassThrough => {
                            tracing::warn!(
                                "⚠️ Field {} left encrypted on session {}: {}",
                                field,
                                cipher.session_id(),
                                e
                            );
                            degraded.push(field.to_string());
                            Ok(())
                        }
                    },
                }
            })?;
        }
        Ok(degraded)
    }
}

/// Cheap pre-check: canonical padded base64 of at least one cipher block
pub fn looks_like_ciphertext(candidate: &str) -> bool {
    if candidate.len() % 4 != 0 || candidate.is_empty() {
        return false;
    }
    match STANDARD.decode(candidate) {
        Ok(raw) => raw.len() >= MIN_CIPHERTEXT_LEN,
        Err(_) => false,
    }
}

fn seal_leaf(field: &str, leaf: &mut Value, cipher: &TransportCipher) -> Result<()> {
    match leaf {
        Value::Null => Ok(()),
        Value::String(plaintext) => {
            let ciphertext = cipher
                .encrypt(plaintext.as_bytes())
                .map_err(|e| retarget(e, field))?;
            *leaf = Value::String(STANDARD.encode(ciphertext));
            Ok(())
        }
        other => Err(NegotiationError::EncryptFailed {
            target: field.to_string(),
            reason: format!("only string fields can be encrypted, found {}", json_kind(other)),
        }),
    }
}

fn open_leaf(field: &str, leaf: &mut Value, cipher: &TransportCipher) -> Result<()> {
    let Value::String(encoded) = leaf else {
        return Ok(());
    };
    if !looks_like_ciphertext(encoded) {
        return Ok(());
    }
    let raw = STANDARD.decode(encoded.as_str())?;
    let plaintext = cipher.decrypt(&raw).map_err(|e| retarget(e, field))?;
    let plaintext = String::from_utf8(plaintext).map_err(|e| NegotiationError::DecryptFailed {
        target: field.to_string(),
        reason: e.to_string(),
    })?;
    *leaf = Value::String(plaintext);
    Ok(())
}

/// Point a cipher error at the field that produced it
fn retarget(error: NegotiationError, field: &str) -> NegotiationError {
    match error {
        NegotiationError::EncryptFailed { reason, .. } => NegotiationError::EncryptFailed {
            target: field.to_string(),
            reason,
        },
        NegotiationError::DecryptFailed { reason, .. } => NegotiationError::DecryptFailed {
            target: field.to_string(),
            reason,
        },
        other => other,
    }
}

fn visit_leaves<F>(value: &mut Value, segments: &[&str], path: String, visit: &mut F) -> Result<()>
where
    F: FnMut(&str, &mut Value) -> Result<()>,
{
    if let Value::Array(items) = value {
        for (i, item) in items.iter_mut().enumerate() {
            visit_leaves(item, segments, format!("{}[{}]", path, i), visit)?;
        }
        return Ok(());
    }

    let Some((head, rest)) = segments.split_first() else {
        return visit(&path, value);
    };
    match value {
        Value::Object(map) => match map.get_mut(*head) {
            Some(child) => {
                let child_path = if path.is_empty() {
                    head.to_string()
                } else {
                    format!("{}.{}", path, head)
                };
                visit_leaves(child, rest, child_path, visit)
            }
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
