// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client call wrapper: negotiate if needed, encrypt, send, decrypt

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use super::client::Negotiator;
use super::field_hook::{DecodedPayload, FieldCryptoHook, FieldTag, SensitiveFields};
use super::transport::{SecuredCall, SecurityHeaders, Transport};
use super::transport_cipher::{DataKey, TransportCipher};
use super::types::ErrorBody;
use crate::crypto::error::{NegotiationError, Result};

pub struct ClientNegotiationInterceptor {
    negotiator: Arc<Negotiator>,
    transport: Arc<dyn Transport>,
    hook: FieldCryptoHook,
}

impl ClientNegotiationInterceptor {
    pub fn new(
        negotiator: Arc<Negotiator>,
        transport: Arc<dyn Transport>,
        hook: FieldCryptoHook,
    ) -> Self {
        Self {
            negotiator,
            transport,
            hook,
        }
    }

    pub fn negotiator(&self) -> &Arc<Negotiator> {
        &self.negotiator
    }

    /// Send `request` to `destination` over a negotiated session
    ///
    /// If the peer no longer knows the session, the cached entry is purged
    /// and the call is retried once on a fresh session.
    pub async fn exchange<Req, Resp>(
        &self,
        destination: &str,
        path: &str,
        request: &Req,
    ) -> Result<DecodedPayload<Resp>>
    where
        Req: Serialize + SensitiveFields,
        Resp: DeserializeOwned + SensitiveFields,
    {
        match self.attempt(destination, path, request).await {
            Err(e) if e.requires_renegotiation() => {
                tracing::warn!(
                    "🔄 Session with {} invalidated ({}), renegotiating",
                    destination,
                    e
                );
                self.negotiator.invalidate(destination).await;
                self.attempt(destination, path, request).await
            }
            other => other,
        }
    }

    /// Purge the session held for `destination`
    pub async fn invalidate(&self, destination: &str) {
        self.negotiator.invalidate(destination).await;
    }

    async fn attempt<Req, Resp>(
        &self,
        destination: &str,
        path: &str,
        request: &Req,
    ) -> Result<DecodedPayload<Resp>>
    where
        Req: Serialize + SensitiveFields,
        Resp: DeserializeOwned + SensitiveFields,
    {
        let session = self.negotiator.session_for(destination).await?;

        let data_key = DataKey::for_session(&session);
        let sealed_data_key = data_key.seal(&session)?;
        let token = self.negotiator.request_token(&session, &sealed_data_key)?;
        let (encrypt, decrypt) =
            TransportCipher::pair(&session, &data_key, self.negotiator.now_millis())?;

        let body = self
            .hook
            .seal(request, FieldTag::RequestSensitive, &encrypt.into())?;
        let call = SecuredCall {
            path: path.to_string(),
            headers: SecurityHeaders {
                session_id: session.session_id().to_string(),
                token,
                data_key: sealed_data_key,
            },
            body,
        };

        let reply = self.transport.send(destination, call).await?;
        if reply.negotiation_invalid {
            return Err(NegotiationError::invalid(
                session.session_id(),
                "peer rejected session",
            ));
        }
        if !reply.is_success() {
            let error = match serde_json::from_value::<ErrorBody>(reply.body) {
                Ok(body) => body.into_error(reply.status),
                Err(_) => NegotiationError::Transport(format!(
                    "{} answered {} on {} without an error body",
                    destination, reply.status, path
                )),
            };
            tracing::warn!(
                "❌ {} rejected call to {}: {} ({})",
                destination,
                path,
                error,
                error.code()
            );
            return Err(error);
        }

        let decoded = self
            .hook
            .open(reply.body, FieldTag::ResponseSensitive, &decrypt.into())?;
        if decoded.is_degraded() {
            tracing::warn!(
                "⚠️ Response from {} degraded: fields {:?} left encrypted",
                destination,
                decoded.degraded_fields
            );
        }
        Ok(decoded)
    }
}
