// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Outbound HTTP seam
//!
//! The negotiation layer never talks to the network directly. A `Transport`
//! carries the handshake and the secured calls; `api::http_client` provides
//! the reqwest implementation and tests plug in counting mocks.

use async_trait::async_trait;
use serde_json::Value;

use super::types::{NegotiationRequest, NegotiationResponse};
use crate::crypto::error::Result;

/// Security headers attached to every call on an established session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeaders {
    pub session_id: String,
    pub token: String,
    pub data_key: String,
}

/// A call whose sensitive fields are already encrypted
#[derive(Debug, Clone)]
pub struct SecuredCall {
    pub path: String,
    pub headers: SecurityHeaders,
    pub body: Value,
}

/// Raw reply from the peer, before field decryption
#[derive(Debug, Clone)]
pub struct SecuredReply {
    pub status: u16,
    /// Peer sent `Negotiation-Invalid-Tag`
    pub negotiation_invalid: bool,
    pub body: Value,
}

impl SecuredReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a handshake request to the destination's negotiation endpoint
    async fn negotiate(
        &self,
        destination: &str,
        request: &NegotiationRequest,
    ) -> Result<NegotiationResponse>;

    /// Send a secured call to the destination
    async fn send(&self, destination: &str, call: SecuredCall) -> Result<SecuredReply>;
}
