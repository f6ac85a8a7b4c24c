//! Credential encryption module using AES-256-GCM
//!
//! Encrypts and decrypts per-tenant source-system passwords stored in the
//! database, using AES-256-GCM with additional authenticated data (AAD)
//! bound to the tenant key and username.
//!
//! A payload without the version marker is rejected outright: a value whose
//! confidentiality cannot be verified (legacy plaintext, a one-way hash)
//! must never be handed to the credential resolver.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("ciphertext is not in a supported encrypted format")]
    UnsupportedFormat,
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialKey(Vec<u8>);

impl CredentialKey {
    /// Create a new credential key from raw bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CredentialKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// AAD binding a ciphertext to the tenant and username it belongs to, so a
/// ciphertext copied between rows fails authentication.
pub fn credential_aad(tenant_key: &str, username: &str) -> Vec<u8> {
    format!("{}|{}", tenant_key, username).into_bytes()
}

/// Encrypt bytes using AES-256-GCM with versioned framing.
pub fn encrypt_bytes(
    key: &CredentialKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // version byte + nonce + ciphertext-with-tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM.
///
/// Unversioned payloads are rejected, never passed through.
pub fn decrypt_bytes(
    key: &CredentialKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::UnsupportedFormat);
    }

    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let body = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(nonce, Payload { msg: body, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Encrypt a tenant's source-system password for storage.
pub fn encrypt_password(
    key: &CredentialKey,
    tenant_key: &str,
    username: &str,
    password: &str,
) -> Result<Vec<u8>, CryptoError> {
    let aad = credential_aad(tenant_key, username);
    encrypt_bytes(key, &aad, password.as_bytes())
}

/// Decrypt a tenant's stored source-system password.
pub fn decrypt_password(
    key: &CredentialKey,
    tenant_key: &str,
    username: &str,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let aad = credential_aad(tenant_key, username);
    let bytes = decrypt_bytes(key, &aad, ciphertext)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}
