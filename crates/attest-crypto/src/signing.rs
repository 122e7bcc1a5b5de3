//! Ed25519 service signatures
//!
//! The verifying key is configured out of band. A token never gets to
//! choose the key it is checked against.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Ed25519 public key length
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Ed25519 signature length
pub const SIGNATURE_SIZE: usize = 64;

/// Domain separation prefix for signed payloads
const SIGNING_CONTEXT: &[u8] = b"attest.profile.v1\0";

/// The exact byte string a service signature covers.
///
/// Layout: context, u32-BE length of the associated data, the associated
/// data, then the payload.
pub fn signed_message(associated_data: &[u8], payload: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut message =
        Vec::with_capacity(SIGNING_CONTEXT.len() + 4 + associated_data.len() + payload.len());
    message.extend_from_slice(SIGNING_CONTEXT);
    message.extend_from_slice(&(associated_data.len() as u32).to_be_bytes());
    message.extend_from_slice(associated_data);
    message.extend_from_slice(payload);
    Zeroizing::new(message)
}

/// The service's published verification key
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceVerifyingKey([u8; PUBLIC_KEY_SIZE]);

impl ServiceVerifyingKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "service key must be {PUBLIC_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Parse a hex or URL-safe base64 encoded key
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = if encoded.len() == PUBLIC_KEY_SIZE * 2 {
            hex::decode(encoded).map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        } else {
            URL_SAFE_NO_PAD
                .decode(encoded.trim_end_matches('='))
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        };
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(CryptoError::SignatureInvalid);
        }
        UnparsedPublicKey::new(&signature::ED25519, &self.0)
            .verify(message, signature)
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

impl fmt::Debug for ServiceVerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceVerifyingKey({})", self.to_hex())
    }
}

/// Issuer-side signing key, used by the sandbox
pub struct ServiceSigner {
    pair: Ed25519KeyPair,
}

impl ServiceSigner {
    /// Generate a key pair, returning the signer and its PKCS#8 encoding
    pub fn generate() -> Result<(Self, Zeroizing<Vec<u8>>)> {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new())
            .map_err(|_| CryptoError::InvalidKey("Ed25519 key generation failed".into()))?;
        let pkcs8 = Zeroizing::new(pkcs8.as_ref().to_vec());
        let signer = Self::from_pkcs8(&pkcs8)?;
        Ok((signer, pkcs8))
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self> {
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| CryptoError::InvalidKey(format!("Ed25519 key rejected: {e}")))?;
        Ok(Self { pair })
    }

    pub fn verifying_key(&self) -> ServiceVerifyingKey {
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key.copy_from_slice(self.pair.public_key().as_ref());
        ServiceVerifyingKey(key)
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.pair.sign(message).as_ref().to_vec()
    }
}
