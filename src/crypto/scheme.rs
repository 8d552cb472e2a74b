// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Symmetric encryption schemes offered during negotiation
//!
//! Schemes travel on the wire under their transformation names, e.g.
//! `AES-256/CBC/PKCS5Padding` or `AES-128/GCM/NoPadding`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Block cipher mode paired with an AES key length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CipherMode {
    Cbc,
    Gcm,
}

/// AES family schemes, ordered weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionScheme {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl EncryptionScheme {
    pub const ALL: [EncryptionScheme; 6] = [
        EncryptionScheme::Aes128Cbc,
        EncryptionScheme::Aes192Cbc,
        EncryptionScheme::Aes256Cbc,
        EncryptionScheme::Aes128Gcm,
        EncryptionScheme::Aes192Gcm,
        EncryptionScheme::Aes256Gcm,
    ];

    /// AES key length in bytes (16, 24 or 32)
    pub fn key_len(self) -> usize {
        match self {
            EncryptionScheme::Aes128Cbc | EncryptionScheme::Aes128Gcm => 16,
            EncryptionScheme::Aes192Cbc | EncryptionScheme::Aes192Gcm => 24,
            EncryptionScheme::Aes256Cbc | EncryptionScheme::Aes256Gcm => 32,
        }
    }

    pub fn mode(self) -> CipherMode {
        match self {
            EncryptionScheme::Aes128Cbc
            | EncryptionScheme::Aes192Cbc
            | EncryptionScheme::Aes256Cbc => CipherMode::Cbc,
            EncryptionScheme::Aes128Gcm
            | EncryptionScheme::Aes192Gcm
            | EncryptionScheme::Aes256Gcm => CipherMode::Gcm,
        }
    }

    /// Wire name of the scheme
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionScheme::Aes128Cbc => "AES-128/CBC/PKCS5Padding",
            EncryptionScheme::Aes192Cbc => "AES-192/CBC/PKCS5Padding",
            EncryptionScheme::Aes256Cbc => "AES-256/CBC/PKCS5Padding",
            EncryptionScheme::Aes128Gcm => "AES-128/GCM/NoPadding",
            EncryptionScheme::Aes192Gcm => "AES-192/GCM/NoPadding",
            EncryptionScheme::Aes256Gcm => "AES-256/GCM/NoPadding",
        }
    }

    /// Strength rank: key length first, GCM before CBC at equal length
    fn strength(self) -> (usize, CipherMode) {
        (self.key_len(), self.mode())
    }

    /// Pick the strongest scheme present in both lists
    pub fn select_strongest(
        local: &[EncryptionScheme],
        remote: &[EncryptionScheme],
    ) -> Option<EncryptionScheme> {
        local
            .iter()
            .copied()
            .filter(|scheme| remote.contains(scheme))
            .max_by_key(|scheme| scheme.strength())
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unknown scheme names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown encryption scheme: {0}")]
pub struct UnknownScheme(pub String);

impl FromStr for EncryptionScheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EncryptionScheme::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownScheme(wanted.to_string()))
    }
}

impl Serialize for EncryptionScheme {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EncryptionScheme {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
