// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! AES Primitives for Negotiated Schemes
//!
//! **CBC Format** (`AES-*/CBC/PKCS5Padding`):
//! ```text
//! [ciphertext (PKCS#7 padded, multiple of 16 bytes)]
//! ```
//! The IV is the negotiated session IV and is not transmitted.
//!
//! **GCM Format** (`AES-*/GCM/NoPadding`):
//! ```text
//! [nonce (12 bytes) | ciphertext+tag]
//! ```
//! A fresh random nonce is drawn for every encryption.

use aes::cipher::{
    block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use aes_gcm::{
    aead::{consts::U12, Aead, AeadCore, KeyInit},
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use super::error::{NegotiationError, Result};
use super::scheme::EncryptionScheme;

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

/// GCM nonce length in bytes
pub const GCM_NONCE_LEN: usize = 12;

/// CBC IV length in bytes
pub const CBC_IV_LEN: usize = 16;

/// Encrypt `plaintext` under `scheme`
///
/// `iv` is only consulted by CBC schemes and must be at least 16 bytes.
pub fn encrypt(
    scheme: EncryptionScheme,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    check_key(scheme, key, "encrypt")?;
    match scheme {
        EncryptionScheme::Aes128Cbc => cbc_encrypt::<aes::Aes128>(key, cbc_iv(iv)?, plaintext),
        EncryptionScheme::Aes192Cbc => cbc_encrypt::<aes::Aes192>(key, cbc_iv(iv)?, plaintext),
        EncryptionScheme::Aes256Cbc => cbc_encrypt::<aes::Aes256>(key, cbc_iv(iv)?, plaintext),
        EncryptionScheme::Aes128Gcm => gcm_encrypt::<Aes128Gcm>(key, plaintext),
        EncryptionScheme::Aes192Gcm => gcm_encrypt::<Aes192Gcm>(key, plaintext),
        EncryptionScheme::Aes256Gcm => gcm_encrypt::<Aes256Gcm>(key, plaintext),
    }
}

/// Decrypt `ciphertext` produced by [`encrypt`] with the same parameters
pub fn decrypt(
    scheme: EncryptionScheme,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    check_key(scheme, key, "decrypt")?;
    match scheme {
        EncryptionScheme::Aes128Cbc => cbc_decrypt::<aes::Aes128>(key, cbc_iv(iv)?, ciphertext),
        EncryptionScheme::Aes192Cbc => cbc_decrypt::<aes::Aes192>(key, cbc_iv(iv)?, ciphertext),
        EncryptionScheme::Aes256Cbc => cbc_decrypt::<aes::Aes256>(key, cbc_iv(iv)?, ciphertext),
        EncryptionScheme::Aes128Gcm => gcm_decrypt::<Aes128Gcm>(key, ciphertext),
        EncryptionScheme::Aes192Gcm => gcm_decrypt::<Aes192Gcm>(key, ciphertext),
        EncryptionScheme::Aes256Gcm => gcm_decrypt::<Aes256Gcm>(key, ciphertext),
    }
}

fn check_key(scheme: EncryptionScheme, key: &[u8], operation: &str) -> Result<()> {
    if key.len() != scheme.key_len() {
        let reason = format!(
            "invalid key size for {}: expected {} bytes, got {}",
            scheme,
            scheme.key_len(),
            key.len()
        );
        return Err(if operation == "encrypt" {
            NegotiationError::EncryptFailed {
                target: operation.to_string(),
                reason,
            }
        } else {
            NegotiationError::DecryptFailed {
                target: operation.to_string(),
                reason,
            }
        });
    }
    Ok(())
}

fn cbc_iv(iv: &[u8]) -> Result<&[u8]> {
    iv.get(..CBC_IV_LEN).ok_or_else(|| NegotiationError::EncryptFailed {
        target: "cbc_iv".to_string(),
        reason: format!("expected at least {} bytes, got {}", CBC_IV_LEN, iv.len()),
    })
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher,
    cbc::Encryptor<C>: KeyIvInit + BlockEncryptMut,
{
    let cipher = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|e| {
        NegotiationError::EncryptFailed {
            target: "aes_cbc".to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher,
    cbc::Decryptor<C>: KeyIvInit + BlockDecryptMut,
{
    let failed = |reason: String| NegotiationError::DecryptFailed {
        target: "aes_cbc".to_string(),
        reason,
    };
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(failed(format!(
            "ciphertext length {} is not a positive multiple of 16",
            ciphertext.len()
        )));
    }
    let cipher = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|e| failed(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| failed("bad padding (wrong key or corrupted data)".to_string()))
}

fn gcm_encrypt<A>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    A: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let failed = |reason: String| NegotiationError::EncryptFailed {
        target: "aes_gcm".to_string(),
        reason,
    };
    let cipher = A::new_from_slice(key).map_err(|e| failed(e.to_string()))?;

    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| failed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn gcm_decrypt<A>(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>>
where
    A: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let failed = |reason: String| NegotiationError::DecryptFailed {
        target: "aes_gcm".to_string(),
        reason,
    };
    if sealed.len() < GCM_NONCE_LEN + 16 {
        return Err(failed(format!(
            "data too short: expected at least {} bytes, got {}",
            GCM_NONCE_LEN + 16,
            sealed.len()
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(GCM_NONCE_LEN);
    let cipher = A::new_from_slice(key).map_err(|e| failed(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| failed("authentication error (wrong key or corrupted data)".to_string()))
}
