// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for session negotiation

use std::env;
use std::time::Duration;

use crate::crypto::scheme::EncryptionScheme;
use crate::negotiation::field_hook::DecryptFailurePolicy;
use crate::negotiation::types::DEFAULT_NEGOTIATION_PATH;

/// Configuration shared by the client and server sides of a negotiation
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Path of the negotiation endpoint on every peer
    pub negotiation_path: String,
    /// Lifetime granted to a negotiated session
    pub session_ttl: Duration,
    /// Maximum age of a signed token before it counts as a replay
    pub token_window_secs: u64,
    /// Deadline for the handshake round-trip
    pub handshake_timeout: Duration,
    /// Schemes this peer offers (client) or accepts (server)
    pub supported_schemes: Vec<EncryptionScheme>,
    /// What to do with a response field that fails to decrypt
    pub decrypt_failure_policy: DecryptFailurePolicy,
    /// Background expiry sweep interval, `None` disables the sweeper
    pub sweep_interval: Option<Duration>,
    /// Listen address of the responder node
    pub bind_addr: String,
}

impl NegotiationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            negotiation_path: env::var("SHOULDER_NEGOTIATION_PATH")
                .unwrap_or(defaults.negotiation_path),
            session_ttl: env::var("SHOULDER_SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            token_window_secs: env::var("SHOULDER_TOKEN_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.token_window_secs),
            handshake_timeout: env::var("SHOULDER_HANDSHAKE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.handshake_timeout),
            supported_schemes: env::var("SHOULDER_SUPPORTED_SCHEMES")
                .ok()
                .map(|v| parse_schemes(&v))
                .filter(|schemes| !schemes.is_empty())
                .unwrap_or(defaults.supported_schemes),
            decrypt_failure_policy: env::var("SHOULDER_DECRYPT_FAILURE_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.decrypt_failure_policy),
            sweep_interval: match env::var("SHOULDER_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
            {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.sweep_interval,
            },
            bind_addr: env::var("SHOULDER_BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.negotiation_path.starts_with('/') {
            return Err("Negotiation path must start with '/'".to_string());
        }
        if self.session_ttl.is_zero() {
            return Err("Session TTL must be greater than 0".to_string());
        }
        if self.token_window_secs == 0 {
            return Err("Token window must be greater than 0".to_string());
        }
        if self.handshake_timeout.is_zero() {
            return Err("Handshake timeout must be greater than 0".to_string());
        }
        if self.supported_schemes.is_empty() {
            return Err("At least one encryption scheme must be supported".to_string());
        }
        Ok(())
    }

    pub fn session_ttl_ms(&self) -> i64 {
        i64::try_from(self.session_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            negotiation_path: DEFAULT_NEGOTIATION_PATH.to_string(),
            session_ttl: Duration::from_secs(30 * 60),
            token_window_secs: 300,
            handshake_timeout: Duration::from_millis(10_000),
            supported_schemes: EncryptionScheme::ALL.to_vec(),
            decrypt_failure_policy: DecryptFailurePolicy::Propagate,
            sweep_interval: Some(Duration::from_secs(60)),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Parse a comma separated list of scheme names, skipping unknown entries
pub fn parse_schemes(raw: &str) -> Vec<EncryptionScheme> {
    raw.split(',')
        .filter(|name| !name.trim().is_empty())
        .filter_map(|name| match name.parse() {
            Ok(scheme) => Some(scheme),
            Err(e) => {
                tracing::warn!("Ignoring {}", e);
                None
            }
        })
        .collect()
}
