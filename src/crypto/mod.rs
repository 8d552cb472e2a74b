// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cryptographic Primitives
//!
//! Building blocks used by the negotiation protocol:
//!
//! - **ECDH**: Ephemeral secp256k1 key pairs and HKDF-SHA256 session derivation
//! - **Symmetric**: AES-128/192/256 in CBC (PKCS#7) and GCM modes
//! - **Signer**: HMAC-SHA256 and ECDSA tokens with a freshness window
//! - **Clock**: Injectable time source for expiry and replay checks
//!
//! ## Security Considerations
//!
//! - Key material is never logged; `Debug` impls are redacted
//! - GCM nonces are random per encryption, never derived from the session
//! - Token tags are compared in constant time

pub mod clock;
pub mod ecdh;
pub mod error;
pub mod scheme;
pub mod signer;
pub mod symmetric;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use ecdh::{
    derive_session_material, AsymmetricKeyPairProvider, EphemeralKeyPair,
    InMemoryKeyPairProvider, SessionMaterial,
};
pub use error::{NegotiationError, Result};
pub use scheme::{CipherMode, EncryptionScheme};
pub use signer::{EcdsaSignKey, EcdsaVerifyKey, HmacKey, Signer};
