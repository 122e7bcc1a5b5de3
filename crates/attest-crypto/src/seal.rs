//! Issuer side of the envelope, used by the sandbox and tests

use crate::cipher;
use crate::envelope::{Envelope, KEY_ID};
use crate::keystore::RecipientKey;
use crate::signing::{signed_message, ServiceSigner};
use crate::{CryptoError, Result};

/// Encrypt `payload` to `recipient` and sign it as the service.
pub fn seal(payload: &[u8], recipient: &RecipientKey, signer: &ServiceSigner) -> Result<Envelope> {
    let key = cipher::generate_key();
    let wrapped_key = recipient.encrypt(key.as_ref())?;

    let mut envelope = Envelope::new(wrapped_key, Vec::new(), Vec::new())
        .with_metadata(KEY_ID, recipient.fingerprint());
    let associated_data = envelope.associated_data()?;

    envelope.encrypted_payload = cipher::encrypt(key.as_ref(), payload, &associated_data)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    envelope.signature = signer.sign(&signed_message(&associated_data, payload));
    Ok(envelope)
}
