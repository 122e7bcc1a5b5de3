//! Recipient key material
//!
//! The private key never leaves [`KeyStore`]; the only operation it
//! exposes is decrypt-with-private-key. Unwrap failures are reported as
//! [`CryptoError::KeyMismatch`] since a well-formed wrapped key that fails
//! OAEP almost always means the token was issued for a different key pair.

use std::fmt;
use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use ring::digest;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Hex SHA-256 of the SubjectPublicKeyInfo DER
fn fingerprint_of(key: &RsaPublicKey) -> Result<String> {
    let der = key
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    Ok(hex::encode(digest::digest(&digest::SHA256, der.as_bytes())))
}

/// Long-lived holder of the client's private key. Read-only, shareable.
pub struct KeyStore {
    key: RsaPrivateKey,
    fingerprint: String,
}

impl KeyStore {
    pub fn from_private_key(key: RsaPrivateKey) -> Result<Self> {
        let fingerprint = fingerprint_of(&key.to_public_key())?;
        Ok(Self { key, fingerprint })
    }

    /// Load a PEM private key (PKCS#8 or PKCS#1)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidKey(format!("unreadable private key: {e}")))?;
        if key.size() * 8 < 2048 {
            tracing::warn!(bits = key.size() * 8, "private key is shorter than 2048 bits");
        }
        Self::from_private_key(key)
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
            CryptoError::InvalidKey(format!("cannot read {}: {e}", path.display()))
        })?);
        Self::from_pem(&pem)
    }

    /// Generate a fresh key pair (development and sandbox use)
    pub fn generate(bits: usize) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_private_key(key)
    }

    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Hex SHA-256 fingerprint of the matching public key
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Modulus size in bytes; every wrapped key must be exactly this long
    pub fn key_size(&self) -> usize {
        self.key.size()
    }

    /// Public half, for issuers that need to encrypt to this store
    pub fn recipient_key(&self) -> RecipientKey {
        RecipientKey {
            key: self.key.to_public_key(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Decrypt-with-private-key (RSA-OAEP-SHA256)
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() != self.key.size() {
            return Err(CryptoError::KeyMismatch(format!(
                "wrapped key is {} bytes, key modulus is {} bytes",
                ciphertext.len(),
                self.key.size()
            )));
        }
        self.key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::KeyMismatch("OAEP unwrap failed".into()))
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("fingerprint", &self.fingerprint)
            .field("bits", &(self.key.size() * 8))
            .finish_non_exhaustive()
    }
}

/// Public key a token is encrypted to
#[derive(Debug, Clone)]
pub struct RecipientKey {
    key: RsaPublicKey,
    fingerprint: String,
}

impl RecipientKey {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CryptoError::InvalidKey(format!("unreadable public key: {e}")))?;
        let fingerprint = fingerprint_of(&key)?;
        Ok(Self { key, fingerprint })
    }

    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }
}
