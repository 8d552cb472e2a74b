// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the shoulder negotiation node

/// Full version string with feature description
pub const VERSION: &str = "v1.2.0-field-encryption-2025-10-13";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.2.0";

/// Major version number
pub const VERSION_MAJOR: u32 = 1;

/// Minor version number
pub const VERSION_MINOR: u32 = 2;

/// Patch version number
pub const VERSION_PATCH: u32 = 0;

/// Build date
pub const BUILD_DATE: &str = "2025-10-13";

/// Negotiation protocol revision, bumped on any wire change
pub const PROTOCOL_VERSION: u32 = 1;

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "ecdh-negotiation",
    "ecdsa-handshake-tokens",
    "hmac-request-tokens",
    "replay-window",
    "aes-cbc",
    "aes-gcm",
    "per-request-data-keys",
    "field-encryption",
    "single-flight-handshake",
    "session-expiry-sweeper",
    "negotiation-invalid-retry",
];

/// Breaking changes from previous version
pub const BREAKING_CHANGES: &[&str] = &[
    "Server response token now covers the client public key",
    "Decrypt failures propagate by default; set SHOULDER_DECRYPT_FAILURE_POLICY=flag to degrade",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Shoulder Negotiation {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "protocol": PROTOCOL_VERSION,
        "features": FEATURES,
        "breaking_changes": BREAKING_CHANGES,
    })
}
