//! AML check requests
//!
//! Plain JSON, no encryption. The builder keeps the last value written
//! for each field; `build` is where required fields are enforced.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::TransportError;

#[derive(Debug, Error)]
pub enum AmlError {
    #[error("Invalid AML profile: {0}")]
    InvalidProfile(String),

    #[error("Could not encode AML request: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("AML check failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Unexpected AML response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmlAddress {
    /// ISO 3166-1 alpha-3
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmlProfile {
    pub given_names: String,
    pub family_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    pub address: AmlAddress,
}

impl AmlProfile {
    pub fn builder() -> AmlProfileBuilder {
        AmlProfileBuilder::default()
    }

    /// Re-check required fields; profiles can also be built by hand
    pub fn validate(&self) -> Result<(), AmlError> {
        for (field, value) in [
            ("given_names", &self.given_names),
            ("family_name", &self.family_name),
            ("address.country", &self.address.country),
        ] {
            if value.trim().is_empty() {
                return Err(AmlError::InvalidProfile(format!("{field} is required")));
            }
        }
        Ok(())
    }

    pub fn to_request_body(&self) -> Result<Vec<u8>, AmlError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AmlProfileBuilder {
    given_names: Option<String>,
    family_name: Option<String>,
    ssn: Option<String>,
    country: Option<String>,
    post_code: Option<String>,
}

impl AmlProfileBuilder {
    pub fn with_given_names(mut self, value: impl Into<String>) -> Self {
        self.given_names = Some(value.into());
        self
    }

    pub fn with_family_name(mut self, value: impl Into<String>) -> Self {
        self.family_name = Some(value.into());
        self
    }

    pub fn with_ssn(mut self, value: impl Into<String>) -> Self {
        self.ssn = Some(value.into());
        self
    }

    pub fn with_country(mut self, value: impl Into<String>) -> Self {
        self.country = Some(value.into());
        self
    }

    pub fn with_post_code(mut self, value: impl Into<String>) -> Self {
        self.post_code = Some(value.into());
        self
    }

    pub fn build(self) -> Result<AmlProfile, AmlError> {
        let profile = AmlProfile {
            given_names: self.given_names.unwrap_or_default(),
            family_name: self.family_name.unwrap_or_default(),
            ssn: self.ssn,
            address: AmlAddress {
                country: self.country.unwrap_or_default(),
                post_code: self.post_code,
            },
        };
        profile.validate()?;
        Ok(profile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmlResult {
    pub on_pep_list: bool,
    pub on_fraud_list: bool,
    pub on_watch_list: bool,
}

impl AmlResult {
    pub fn from_response(body: &[u8]) -> Result<Self, AmlError> {
        serde_json::from_slice(body).map_err(|e| AmlError::Response(e.to_string()))
    }

    pub fn is_flagged(&self) -> bool {
        self.on_pep_list || self.on_fraud_list || self.on_watch_list
    }
}
