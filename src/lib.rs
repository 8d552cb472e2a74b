// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod negotiation;
pub mod version;

// Re-export main types
pub use config::NegotiationConfig;
pub use crypto::{EncryptionScheme, NegotiationError};
pub use negotiation::{
    ClientNegotiationInterceptor, FieldCryptoHook, NegotiationResponder, NegotiationResult,
    Negotiator, SessionCache, TransportCipher,
};
