//! Symmetric unwrap and payload authentication
//!
//! `Envelope -> DecryptedPayload -> VerifiedPayload`. Only a
//! [`VerifiedPayload`] exposes its bytes, so nothing downstream can read
//! a payload whose signature has not been checked.

use std::fmt;

use tracing::debug;
use zeroize::Zeroizing;

use crate::cipher::{self, CipherError, KEY_SIZE};
use crate::envelope::Envelope;
use crate::keystore::KeyStore;
use crate::signing::{signed_message, ServiceVerifyingKey};
use crate::{CryptoError, Result};

/// Plaintext that has been decrypted but not yet authenticated
pub struct DecryptedPayload {
    plaintext: Zeroizing<Vec<u8>>,
    associated_data: Vec<u8>,
}

/// Plaintext that decrypted and carries a valid service signature
pub struct VerifiedPayload {
    plaintext: Zeroizing<Vec<u8>>,
}

/// Recover the symmetric key with the key store, then decrypt the payload.
///
/// The symmetric key is dropped (and zeroed) before this returns, on every
/// path.
pub fn decrypt_payload(envelope: &Envelope, keys: &KeyStore) -> Result<DecryptedPayload> {
    if let Some(kid) = envelope.key_id() {
        if !kid.eq_ignore_ascii_case(keys.fingerprint()) {
            return Err(CryptoError::KeyMismatch(format!(
                "token issued for key {kid}, store holds {}",
                keys.fingerprint()
            )));
        }
    }

    let symmetric_key = keys.decrypt(&envelope.wrapped_key)?;
    if symmetric_key.len() != KEY_SIZE {
        return Err(CryptoError::Decryption(format!(
            "unwrapped key is {} bytes, expected {KEY_SIZE}",
            symmetric_key.len()
        )));
    }

    let associated_data = envelope.associated_data()?;
    let plaintext = cipher::decrypt(&symmetric_key, &envelope.encrypted_payload, &associated_data)
        .map_err(|e| match e {
            CipherError::Truncated(_) | CipherError::InvalidKeySize(_) => {
                CryptoError::Decryption(e.to_string())
            }
            _ => CryptoError::Decryption("payload authentication tag mismatch".into()),
        })?;

    debug!(bytes = plaintext.len(), "payload decrypted");
    Ok(DecryptedPayload {
        plaintext,
        associated_data,
    })
}

impl DecryptedPayload {
    /// Check the envelope signature against the configured service key
    pub fn verify(
        self,
        envelope: &Envelope,
        service_key: &ServiceVerifyingKey,
    ) -> Result<VerifiedPayload> {
        let message = signed_message(&self.associated_data, &self.plaintext);
        service_key.verify(&message, &envelope.signature)?;
        debug!("payload signature verified");
        Ok(VerifiedPayload {
            plaintext: self.plaintext,
        })
    }
}

impl VerifiedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.plaintext
    }
}

impl fmt::Debug for VerifiedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifiedPayload({} bytes)", self.plaintext.len())
    }
}

/// Decrypt and verify in one step
pub fn open(
    envelope: &Envelope,
    keys: &KeyStore,
    service_key: &ServiceVerifyingKey,
) -> Result<VerifiedPayload> {
    decrypt_payload(envelope, keys)?.verify(envelope, service_key)
}
