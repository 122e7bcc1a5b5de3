//! Sandbox tokens for local development
//!
//! [`SandboxTokenRequest`] describes the profile a test user should share;
//! [`SandboxIssuer`] plays the service and seals it into a real version 1
//! token, so the same pipeline that reads production tokens reads these.

use std::collections::BTreeMap;

use attest_crypto::{seal, CryptoError, RecipientKey, ServiceSigner};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::attribute::{names, DerivationRule};
use crate::payload::{AnchorRecord, AttributeRecord, ContentType, ProfilePayload};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Invalid sandbox attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Sealing failed: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxAnchor {
    #[serde(rename = "type")]
    pub anchor_type: String,
    pub sub_type: String,
    pub value: String,
    /// Microseconds since the epoch
    pub timestamp: u64,
}

impl SandboxAnchor {
    pub fn source(sub_type: &str, value: &str, at: DateTime<Utc>) -> Self {
        Self::new("SOURCE", sub_type, value, at)
    }

    pub fn verifier(sub_type: &str, value: &str, at: DateTime<Utc>) -> Self {
        Self::new("VERIFIER", sub_type, value, at)
    }

    fn new(anchor_type: &str, sub_type: &str, value: &str, at: DateTime<Utc>) -> Self {
        Self {
            anchor_type: anchor_type.to_string(),
            sub_type: sub_type.to_string(),
            value: value.to_string(),
            timestamp: u64::try_from(at.timestamp_micros()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxAttribute {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,
    pub optional: bool,
    pub anchors: Vec<SandboxAnchor>,
}

impl SandboxAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            derivation: None,
            optional: false,
            anchors: Vec::new(),
        }
    }

    pub fn with_anchor(mut self, anchor: SandboxAnchor) -> Self {
        self.anchors.push(anchor);
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Name the record travels under: the derivation when there is one
    fn record_name(&self) -> &str {
        self.derivation.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxTokenRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_me_id: Option<String>,
    #[serde(rename = "profile_attributes")]
    pub attributes: Vec<SandboxAttribute>,
}

impl SandboxTokenRequest {
    pub fn builder() -> SandboxTokenRequestBuilder {
        SandboxTokenRequestBuilder::default()
    }
}

/// Collects attributes keyed by record name; later writes replace earlier ones
#[derive(Debug, Clone, Default)]
pub struct SandboxTokenRequestBuilder {
    remember_me_id: Option<String>,
    attributes: BTreeMap<String, SandboxAttribute>,
}

impl SandboxTokenRequestBuilder {
    pub fn with_remember_me_id(mut self, value: impl Into<String>) -> Self {
        self.remember_me_id = Some(value.into());
        self
    }

    pub fn with_attribute(mut self, attribute: SandboxAttribute) -> Self {
        self.attributes
            .insert(attribute.record_name().to_string(), attribute);
        self
    }

    pub fn with_given_names(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::GIVEN_NAMES, value))
    }

    pub fn with_family_name(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::FAMILY_NAME, value))
    }

    pub fn with_full_name(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::FULL_NAME, value))
    }

    pub fn with_date_of_birth(self, value: NaiveDate) -> Self {
        self.with_attribute(SandboxAttribute::new(
            names::DATE_OF_BIRTH,
            value.format(crate::decoder::DATE_FORMAT).to_string(),
        ))
    }

    /// Derived age check, e.g. `age_over:18` = true
    pub fn with_age_verification(self, rule: DerivationRule, result: bool) -> Self {
        let mut attribute = SandboxAttribute::new(rule.base_attribute(), result.to_string());
        attribute.derivation = Some(rule.to_string());
        self.with_attribute(attribute)
    }

    pub fn with_gender(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::GENDER, value))
    }

    pub fn with_phone_number(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::PHONE_NUMBER, value))
    }

    pub fn with_nationality(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::NATIONALITY, value))
    }

    pub fn with_postal_address(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::POSTAL_ADDRESS, value))
    }

    /// JSON object text
    pub fn with_structured_postal_address(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::STRUCTURED_POSTAL_ADDRESS, value))
    }

    pub fn with_selfie(self, jpeg: &[u8]) -> Self {
        self.with_base64_selfie(&STANDARD.encode(jpeg))
    }

    pub fn with_base64_selfie(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::SELFIE, value))
    }

    pub fn with_email_address(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::EMAIL_ADDRESS, value))
    }

    pub fn with_document_details(self, value: &str) -> Self {
        self.with_attribute(SandboxAttribute::new(names::DOCUMENT_DETAILS, value).optional(true))
    }

    pub fn build(self) -> SandboxTokenRequest {
        SandboxTokenRequest {
            remember_me_id: self.remember_me_id,
            attributes: self.attributes.into_values().collect(),
        }
    }
}

/// Plays the service: seals sandbox requests into tokens
pub struct SandboxIssuer {
    recipient: RecipientKey,
    signer: ServiceSigner,
}

impl SandboxIssuer {
    pub fn new(recipient: RecipientKey, signer: ServiceSigner) -> Self {
        Self { recipient, signer }
    }

    pub fn issue(&self, request: &SandboxTokenRequest) -> Result<String, SandboxError> {
        let payload = ProfilePayload {
            receipt_id: uuid::Uuid::new_v4().to_string(),
            remember_me_id: request.remember_me_id.clone().unwrap_or_default(),
            parent_remember_me_id: String::new(),
            timestamp_micros: u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0),
            attributes: request
                .attributes
                .iter()
                .map(to_record)
                .collect::<Result<_, _>>()?,
        };
        debug!(attributes = payload.attributes.len(), "issuing sandbox token");
        let envelope = seal(&payload.encode_bytes(), &self.recipient, &self.signer)?;
        Ok(envelope.encode()?)
    }
}

fn to_record(attribute: &SandboxAttribute) -> Result<AttributeRecord, SandboxError> {
    let name = attribute.record_name();
    let (content_type, value) = match name {
        names::SELFIE => {
            let jpeg = STANDARD
                .decode(&attribute.value)
                .map_err(|e| SandboxError::InvalidAttribute {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            (ContentType::Jpeg, jpeg)
        }
        names::DATE_OF_BIRTH => (ContentType::Date, attribute.value.clone().into_bytes()),
        names::STRUCTURED_POSTAL_ADDRESS => {
            (ContentType::Json, attribute.value.clone().into_bytes())
        }
        _ => (ContentType::String, attribute.value.clone().into_bytes()),
    };
    Ok(AttributeRecord {
        name: name.to_string(),
        value,
        content_type: content_type as i32,
        anchors: attribute
            .anchors
            .iter()
            .map(|a| AnchorRecord {
                anchor_type: a.anchor_type.clone(),
                sub_type: a.sub_type.clone(),
                signed_timestamp_micros: a.timestamp,
                issuing_entity: String::new(),
                value: a.value.clone(),
            })
            .collect(),
    })
}
