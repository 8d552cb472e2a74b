// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Secured echo payloads, used by the node's probe endpoint and the CLI

use serde::{Deserialize, Serialize};

use crate::negotiation::field_hook::{FieldTag, SensitiveFields};

/// Path of the secured echo endpoint
pub const ECHO_PATH: &str = "/api/security/v1/echo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoRequest {
    pub message: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl SensitiveFields for EchoRequest {
    fn sensitive_fields(tag: FieldTag) -> &'static [&'static str] {
        match tag {
            FieldTag::RequestSensitive => &["message"],
            FieldTag::ResponseSensitive => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    pub message: String,
    pub session_id: String,
    pub scheme: String,
    pub received_at_ms: i64,
}

impl SensitiveFields for EchoResponse {
    fn sensitive_fields(tag: FieldTag) -> &'static [&'static str] {
        match tag {
            FieldTag::RequestSensitive => &[],
            FieldTag::ResponseSensitive => &["message"],
        }
    }
}
