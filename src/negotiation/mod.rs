// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Negotiation and Field Encryption
//!
//! ## Protocol Flow
//!
//! 1. Client generates an ephemeral key pair and a fresh session id
//! 2. Client signs a `NegotiationRequest` with that key and POSTs it
//! 3. Server picks the strongest common scheme, generates its own pair,
//!    derives the session via ECDH + HKDF and signs a `NegotiationResponse`
//! 4. Client verifies the response, derives the same session and caches it
//! 5. Each secured call carries the session id, a fresh HMAC token and a
//!    per-request data key sealed under the session key
//! 6. Tagged fields are encrypted on the way out and decrypted on the way in
//!
//! A `Negotiation-Invalid-Tag` from the server purges the client's session
//! and the call is retried once on a new one.

pub mod client;
pub mod field_hook;
pub mod interceptor;
pub mod server;
pub mod session_cache;
pub mod single_flight;
pub mod transport;
pub mod transport_cipher;
pub mod types;

pub use client::Negotiator;
pub use field_hook::{DecodedPayload, DecryptFailurePolicy, FieldCryptoHook, FieldTag, SensitiveFields};
pub use interceptor::ClientNegotiationInterceptor;
pub use server::{NegotiationResponder, ServerCryptoContext};
pub use session_cache::SessionCache;
pub use transport::{SecuredCall, SecuredReply, SecurityHeaders, Transport};
pub use transport_cipher::{CipherRole, DataKey, DecryptCipher, EncryptCipher, TransportCipher};
pub use types::{
    NegotiationRequest, NegotiationResponse, NegotiationResult, SessionRole, DATA_KEY_HEADER,
    NEGOTIATION_INVALID_TAG, SESSION_ID_HEADER, TOKEN_HEADER,
};
