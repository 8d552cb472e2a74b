// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Negotiation Error Types
//!
//! One error type covers the whole negotiation subsystem, from the handshake
//! down to field-level ciphering.
//!
//! ## Error Variants
//!
//! - **MissingRequiredParam**: malformed handshake request or missing header
//! - **NegotiationFailed**: handshake could not complete (primitive or KDF error)
//! - **TokenInvalid**: signature verification or freshness check failed
//! - **NegotiationInvalid**: session unknown or expired, renegotiation required
//! - **EncryptFailed** / **DecryptFailed**: field or payload ciphering failed
//! - **UnsupportedCipherRole**: a directional cipher was asked for the other direction
//! - **Transport** / **Timeout**: the HTTP collaborator failed or the deadline passed
//!
//! ## Key Material
//!
//! Variants carry session metadata and reasons only. Shared keys, IVs and
//! private keys must never be formatted into any of these messages.

use thiserror::Error;

use crate::negotiation::transport_cipher::CipherRole;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, NegotiationError>;

/// Error taxonomy for handshake, session and field ciphering failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// A required handshake parameter or header is absent or empty
    #[error("Missing required parameter: {param}")]
    MissingRequiredParam { param: String },

    /// The handshake could not be completed
    #[error("Negotiation failed during {operation}: {reason}")]
    NegotiationFailed { operation: String, reason: String },

    /// A signed token did not verify or is outside the freshness window
    #[error("Invalid token during {operation}: {reason}")]
    TokenInvalid { operation: String, reason: String },

    /// The session is unknown or expired and must be renegotiated
    #[error("Negotiation invalid for session '{session_id}': {reason}")]
    NegotiationInvalid { session_id: String, reason: String },

    /// Encrypting a field or data key failed
    #[error("Encrypt failed for {target}: {reason}")]
    EncryptFailed { target: String, reason: String },

    /// Decrypting a field or data key failed
    #[error("Decrypt failed for {target}: {reason}")]
    DecryptFailed { target: String, reason: String },

    /// The cipher was built for the other direction
    #[error("Operation '{operation}' is unsupported for this cipher role ({role})")]
    UnsupportedCipherRole {
        role: CipherRole,
        operation: &'static str,
    },

    /// The HTTP collaborator failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The handshake round-trip did not finish before the deadline
    #[error("Negotiation with '{destination}' timed out after {timeout_ms}ms")]
    Timeout { destination: String, timeout_ms: u64 },
}

impl NegotiationError {
    pub fn missing(param: impl Into<String>) -> Self {
        NegotiationError::MissingRequiredParam {
            param: param.into(),
        }
    }

    pub fn failed(operation: impl Into<String>, reason: impl ToString) -> Self {
        NegotiationError::NegotiationFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn token_invalid(operation: impl Into<String>, reason: impl ToString) -> Self {
        NegotiationError::TokenInvalid {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(session_id: impl Into<String>, reason: impl ToString) -> Self {
        NegotiationError::NegotiationInvalid {
            session_id: session_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Wire code sent back to peers in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            NegotiationError::MissingRequiredParam { .. } => "MISSING_REQUIRED_PARAM",
            NegotiationError::NegotiationFailed { .. } => "NEGOTIATION_FAILED",
            NegotiationError::TokenInvalid { .. } => "TOKEN_INVALID",
            NegotiationError::NegotiationInvalid { .. } => "NEGOTIATION_INVALID",
            NegotiationError::EncryptFailed { .. } => "ENCRYPT_FAILED",
            NegotiationError::DecryptFailed { .. } => "DECRYPT_FAILED",
            NegotiationError::UnsupportedCipherRole { .. } => "UNSUPPORTED_CIPHER_ROLE",
            NegotiationError::Transport(_) => "TRANSPORT_ERROR",
            NegotiationError::Timeout { .. } => "NEGOTIATION_TIMEOUT",
        }
    }

    /// True when the caller should drop the session and handshake again
    pub fn requires_renegotiation(&self) -> bool {
        matches!(self, NegotiationError::NegotiationInvalid { .. })
    }
}

impl From<base64::DecodeError> for NegotiationError {
    fn from(err: base64::DecodeError) -> Self {
        NegotiationError::DecryptFailed {
            target: "base64_field".to_string(),
            reason: format!("base64 decode error: {}", err),
        }
    }
}

impl From<serde_json::Error> for NegotiationError {
    fn from(err: serde_json::Error) -> Self {
        NegotiationError::Transport(format!("json error: {}", err))
    }
}

impl From<reqwest::Error> for NegotiationError {
    fn from(err: reqwest::Error) -> Self {
        NegotiationError::Transport(err.to_string())
    }
}
