//! Attest Crypto - token envelope layer
//!
//! This crate provides:
//! - Version 1 token wire format (decode and encode)
//! - RSA-OAEP key store for unwrapping the per-token symmetric key
//! - ChaCha20-Poly1305 payload cipher
//! - Ed25519 verification against the configured service key
//! - The sealing mirror used to issue sandbox tokens
//!
//! Nothing leaves [`open`] unless it decrypted and verified.

pub mod cipher;
pub mod envelope;
pub mod keystore;
pub mod seal;
pub mod signing;
pub mod unwrap;

pub use envelope::{Envelope, FORMAT_V1};
pub use keystore::{KeyStore, RecipientKey};
pub use seal::seal;
pub use signing::{ServiceSigner, ServiceVerifyingKey};
pub use unwrap::{decrypt_payload, open, DecryptedPayload, VerifiedPayload};

/// Errors that can occur while opening or sealing a token
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
