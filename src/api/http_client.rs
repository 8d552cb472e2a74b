// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! reqwest-backed `Transport`
//!
//! Destinations are logical service ids mapped to base URLs. Handshakes go to
//! `{base}{negotiation_path}`, secured calls to `{base}{call.path}`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::crypto::error::{NegotiationError, Result};
use crate::negotiation::transport::{SecuredCall, SecuredReply, Transport};
use crate::negotiation::types::{
    ErrorBody, NegotiationRequest, NegotiationResponse, DATA_KEY_HEADER, NEGOTIATION_INVALID_TAG,
    SESSION_ID_HEADER, TOKEN_HEADER,
};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    negotiation_path: String,
    destinations: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(negotiation_path: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            negotiation_path: negotiation_path.into(),
            destinations: HashMap::new(),
        })
    }

    /// Register the base URL for a destination id
    pub fn with_destination(mut self, destination: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.destinations
            .insert(destination.into(), base_url.trim_end_matches('/').to_string());
        self
    }

    fn url(&self, destination: &str, path: &str) -> Result<String> {
        let base = self.destinations.get(destination).ok_or_else(|| {
            NegotiationError::Transport(format!("unknown destination '{}'", destination))
        })?;
        Ok(format!("{}{}", base, path))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn negotiate(
        &self,
        destination: &str,
        request: &NegotiationRequest,
    ) -> Result<NegotiationResponse> {
        let url = self.url(destination, &self.negotiation_path)?;
        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_else(|_| ErrorBody {
                code: "TRANSPORT_ERROR".to_string(),
                message: format!("negotiation endpoint {} answered {}", url, status),
            });
            return Err(body.into_error(status.as_u16()));
        }

        Ok(response.json().await?)
    }

    async fn send(&self, destination: &str, call: SecuredCall) -> Result<SecuredReply> {
        let url = self.url(destination, &call.path)?;
        let response = self
            .client
            .post(&url)
            .header(SESSION_ID_HEADER, &call.headers.session_id)
            .header(TOKEN_HEADER, &call.headers.token)
            .header(DATA_KEY_HEADER, &call.headers.data_key)
            .json(&call.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let negotiation_invalid = response.headers().contains_key(NEGOTIATION_INVALID_TAG);
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(SecuredReply {
            status,
            negotiation_invalid,
            body,
        })
    }
}
