//! Wraps session keys under the device secret.
//!
//! The default on-disk format is AES-256-CBC with PKCS#7 padding and a fresh
//! 16-byte IV per key. CBC carries no integrity check: a corrupted blob
//! shows up as a padding error at best and as garbage at worst. AES-256-GCM
//! is available as an opt-in suite that detects tampering, but blobs written
//! under one suite do not decrypt under the other.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key_provider::DeviceSecret;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const CBC_IV_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;

/// A session key wrapped under the device secret. Both fields are base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedKey {
    #[serde(rename = "cipherTextB64")]
    pub cipher_text_b64: String,
    #[serde(rename = "ivB64")]
    pub iv_b64: String,
}

/// Encryption or decryption of a single key failed. For decryption this
/// means "key unrecoverable"; callers are expected to carry on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("base64 decode failed: {0}")]
    Decode(String),
    #[error("invalid iv: expected {expected} bytes, got {actual}")]
    InvalidIv { expected: usize, actual: usize },
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("decrypt failed: {0}")]
    Decrypt(String),
}

/// Symmetric wrapping of base64 session keys under the device secret.
pub trait KeyCipher: Send + Sync {
    fn suite(&self) -> CipherSuite;

    fn encrypt(
        &self,
        plain_key_b64: &str,
        secret: &DeviceSecret,
    ) -> Result<EncryptedKey, CipherError>;

    fn decrypt(&self, key: &EncryptedKey, secret: &DeviceSecret) -> Result<String, CipherError>;
}

/// Selectable cipher implementation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "aes-256-cbc")]
    Aes256Cbc,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl CipherSuite {
    pub fn build(self) -> Box<dyn KeyCipher> {
        match self {
            CipherSuite::Aes256Cbc => Box::new(Aes256CbcCipher),
            CipherSuite::Aes256Gcm => Box::new(Aes256GcmCipher),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256CbcCipher;

impl KeyCipher for Aes256CbcCipher {
    fn suite(&self) -> CipherSuite {
        CipherSuite::Aes256Cbc
    }

    fn encrypt(
        &self,
        plain_key_b64: &str,
        secret: &DeviceSecret,
    ) -> Result<EncryptedKey, CipherError> {
        let plaintext = decode(plain_key_b64)?;

        let mut iv = [0u8; CBC_IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new_from_slices(secret.as_bytes(), &iv)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        Ok(EncryptedKey {
            cipher_text_b64: STANDARD.encode(ciphertext),
            iv_b64: STANDARD.encode(iv),
        })
    }

    fn decrypt(&self, key: &EncryptedKey, secret: &DeviceSecret) -> Result<String, CipherError> {
        let iv = decode(&key.iv_b64)?;
        check_iv_len(&iv, CBC_IV_LEN)?;
        let ciphertext = decode(&key.cipher_text_b64)?;

        let plaintext = Aes256CbcDec::new_from_slices(secret.as_bytes(), &iv)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;
        Ok(STANDARD.encode(plaintext))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256GcmCipher;

impl KeyCipher for Aes256GcmCipher {
    fn suite(&self) -> CipherSuite {
        CipherSuite::Aes256Gcm
    }

    fn encrypt(
        &self,
        plain_key_b64: &str,
        secret: &DeviceSecret,
    ) -> Result<EncryptedKey, CipherError> {
        let plaintext = decode(plain_key_b64)?;
        let cipher = build_gcm(secret)?;
        let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        Ok(EncryptedKey {
            cipher_text_b64: STANDARD.encode(ciphertext),
            iv_b64: STANDARD.encode(nonce.as_slice()),
        })
    }

    fn decrypt(&self, key: &EncryptedKey, secret: &DeviceSecret) -> Result<String, CipherError> {
        let nonce_bytes = decode(&key.iv_b64)?;
        check_iv_len(&nonce_bytes, GCM_NONCE_LEN)?;
        let ciphertext = decode(&key.cipher_text_b64)?;

        let plaintext = build_gcm(secret)?
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| CipherError::Decrypt(e.to_string()))?;
        Ok(STANDARD.encode(plaintext))
    }
}

fn build_gcm(secret: &DeviceSecret) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(secret.as_bytes()).map_err(|e| CipherError::Encrypt(e.to_string()))
}

fn decode(encoded: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| CipherError::Decode(e.to_string()))
}

fn check_iv_len(iv: &[u8], expected: usize) -> Result<(), CipherError> {
    if iv.len() == expected {
        Ok(())
    } else {
        Err(CipherError::InvalidIv {
            expected,
            actual: iv.len(),
        })
    }
}
