//! Token → verified profile
//!
//! `EnvelopeDecode → SymmetricUnwrap → SignatureVerify → AttributeDecode →
//! ProfileAssembly`. Stateless apart from the two read-only keys, so one
//! pipeline can serve any number of threads.

use std::sync::Arc;

use attest_crypto::{decrypt_payload, Envelope, KeyStore, ServiceVerifyingKey};
use tracing::{debug, info, warn};

use crate::decoder::{timestamp_from_micros, AttributeDecoder};
use crate::error::{Cause, ProfileError, Stage, StageError};
use crate::payload::ProfilePayload;
use crate::profile::{self, ActivityDetails};

#[derive(Debug, Clone)]
pub struct TokenPipeline {
    keys: Arc<KeyStore>,
    service_key: ServiceVerifyingKey,
}

impl TokenPipeline {
    pub fn new(keys: Arc<KeyStore>, service_key: ServiceVerifyingKey) -> Self {
        Self { keys, service_key }
    }

    /// Turn a single-use token into verified activity details.
    ///
    /// Callers must not submit the same token twice; replay tracking is not
    /// done here.
    pub fn retrieve_profile(&self, token: &str) -> Result<ActivityDetails, ProfileError> {
        let envelope =
            Envelope::decode(token).map_err(|e| ProfileError::new(Stage::EnvelopeDecode, e))?;
        debug!(
            wrapped_key = envelope.wrapped_key.len(),
            payload = envelope.encrypted_payload.len(),
            "envelope decoded"
        );

        let decrypted = decrypt_payload(&envelope, &self.keys)
            .map_err(|e| ProfileError::new(Stage::SymmetricUnwrap, e))?;
        let verified = decrypted
            .verify(&envelope, &self.service_key)
            .map_err(|e| ProfileError::new(Stage::SignatureVerify, e))?;

        let payload = ProfilePayload::decode_bytes(verified.as_bytes()).map_err(|e| {
            ProfileError::new(
                Stage::AttributeDecode,
                StageError::MalformedPayload(e.to_string()),
            )
        })?;

        if let Some(err) = duplicates_error(profile::duplicate_record_names(&payload.attributes)) {
            warn!(count = err.causes().len(), "payload repeats attribute names");
            return Err(err);
        }

        let mut decoder = AttributeDecoder::new(&payload.attributes);
        let assembled = profile::assemble(decoder.by_ref());
        let warnings = decoder.into_warnings();
        let profile = assembled.map_err(|names| {
            duplicates_error(names).unwrap_or_else(|| {
                ProfileError::new(
                    Stage::ProfileAssembly,
                    StageError::MalformedPayload("profile assembly failed".into()),
                )
            })
        })?;

        let timestamp = match payload.timestamp_micros {
            0 => None,
            micros => {
                let ts = timestamp_from_micros(micros);
                if ts.is_none() {
                    warn!(micros, "receipt timestamp out of range, ignored");
                }
                ts
            }
        };

        info!(
            attributes = profile.len(),
            warnings = warnings.len(),
            "profile assembled"
        );
        Ok(ActivityDetails {
            receipt_id: payload.receipt_id,
            remember_me_id: non_empty(payload.remember_me_id),
            parent_remember_me_id: non_empty(payload.parent_remember_me_id),
            timestamp,
            profile,
            warnings,
        })
    }
}

fn duplicates_error(names: Vec<String>) -> Option<ProfileError> {
    ProfileError::from_causes(
        names
            .into_iter()
            .map(|name| Cause {
                stage: Stage::ProfileAssembly,
                error: StageError::DuplicateAttribute(name),
            })
            .collect(),
    )
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
