//! Dynamic sharing scenarios
//!
//! A scenario names the callback endpoint, the policy (which attributes
//! and auth types the relying party wants) and optional extensions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::attribute::{names, DerivationRule};
use crate::client::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid scenario: {0}")]
pub struct InvalidScenarioError(pub String);

#[derive(Debug, Error)]
pub enum DynamicShareError {
    #[error(transparent)]
    InvalidScenario(#[from] InvalidScenarioError),

    #[error("Could not encode scenario: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Share URL request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Unexpected share URL response: {0}")]
    Response(String),
}

/// Auth types a policy can require
pub const SELFIE_AUTH: i32 = 1;
pub const PIN_AUTH: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantedAttribute {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_self_asserted: Option<bool>,
}

impl WantedAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            derivation: None,
            optional: false,
            accept_self_asserted: None,
        }
    }

    pub fn with_derivation(mut self, derivation: impl Into<String>) -> Self {
        self.derivation = Some(derivation.into());
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn accept_self_asserted(mut self, accept: bool) -> Self {
        self.accept_self_asserted = Some(accept);
        self
    }

    /// Policy key: the derivation when there is one, else the name
    fn key(&self) -> String {
        self.derivation.clone().unwrap_or_else(|| self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicPolicy {
    pub wanted: Vec<WantedAttribute>,
    pub wanted_auth_types: Vec<i32>,
    pub wanted_remember_me: bool,
    pub wanted_remember_me_optional: bool,
}

impl DynamicPolicy {
    pub fn builder() -> DynamicPolicyBuilder {
        DynamicPolicyBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicPolicyBuilder {
    wanted: BTreeMap<String, WantedAttribute>,
    auth_types: BTreeMap<i32, bool>,
    remember_me: bool,
    remember_me_optional: bool,
}

impl DynamicPolicyBuilder {
    /// Add (or replace) a wanted attribute
    pub fn with_wanted_attribute(mut self, attribute: WantedAttribute) -> Self {
        self.wanted.insert(attribute.key(), attribute);
        self
    }

    pub fn with_attribute(self, name: &str, optional: bool) -> Self {
        self.with_wanted_attribute(WantedAttribute::new(name).optional(optional))
    }

    pub fn with_given_names(self, optional: bool) -> Self {
        self.with_attribute(names::GIVEN_NAMES, optional)
    }

    pub fn with_family_name(self, optional: bool) -> Self {
        self.with_attribute(names::FAMILY_NAME, optional)
    }

    pub fn with_full_name(self, optional: bool) -> Self {
        self.with_attribute(names::FULL_NAME, optional)
    }

    pub fn with_date_of_birth(self, optional: bool) -> Self {
        self.with_attribute(names::DATE_OF_BIRTH, optional)
    }

    pub fn with_email(self, optional: bool) -> Self {
        self.with_attribute(names::EMAIL_ADDRESS, optional)
    }

    pub fn with_phone_number(self, optional: bool) -> Self {
        self.with_attribute(names::PHONE_NUMBER, optional)
    }

    pub fn with_selfie(self, optional: bool) -> Self {
        self.with_attribute(names::SELFIE, optional)
    }

    pub fn with_structured_postal_address(self, optional: bool) -> Self {
        self.with_attribute(names::STRUCTURED_POSTAL_ADDRESS, optional)
    }

    pub fn with_age_derived_attribute(self, rule: DerivationRule, optional: bool) -> Self {
        self.with_wanted_attribute(
            WantedAttribute::new(rule.base_attribute())
                .with_derivation(rule.to_string())
                .optional(optional),
        )
    }

    pub fn with_age_over(self, age: u32, optional: bool) -> Self {
        self.with_age_derived_attribute(DerivationRule::AgeOver(age), optional)
    }

    pub fn with_age_under(self, age: u32, optional: bool) -> Self {
        self.with_age_derived_attribute(DerivationRule::AgeUnder(age), optional)
    }

    pub fn with_selfie_auth(mut self, enabled: bool) -> Self {
        self.auth_types.insert(SELFIE_AUTH, enabled);
        self
    }

    pub fn with_pin_auth(mut self, enabled: bool) -> Self {
        self.auth_types.insert(PIN_AUTH, enabled);
        self
    }

    pub fn with_remember_me_id(mut self, wanted: bool) -> Self {
        self.remember_me = wanted;
        self
    }

    pub fn with_remember_me_id_optional(mut self, optional: bool) -> Self {
        self.remember_me_optional = optional;
        self
    }

    pub fn build(self) -> DynamicPolicy {
        DynamicPolicy {
            wanted: self.wanted.into_values().collect(),
            wanted_auth_types: self
                .auth_types
                .into_iter()
                .filter_map(|(auth, on)| on.then_some(auth))
                .collect(),
            wanted_remember_me: self.remember_me,
            wanted_remember_me_optional: self.remember_me_optional,
        }
    }
}

pub const LOCATION_CONSTRAINT: &str = "LOCATION_CONSTRAINT";
pub const TRANSACTIONAL_FLOW: &str = "TRANSACTIONAL_FLOW";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    #[serde(rename = "type")]
    pub extension_type: String,
    pub content: Value,
}

impl Extension {
    pub fn new(extension_type: impl Into<String>, content: Value) -> Self {
        Self {
            extension_type: extension_type.into(),
            content,
        }
    }

    /// Require the sharing device to be within `radius` metres of a point
    pub fn location_constraint(
        latitude: f64,
        longitude: f64,
        radius: f64,
        max_uncertainty_radius: f64,
    ) -> Result<Self, InvalidScenarioError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidScenarioError(format!("latitude {latitude} out of range")));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidScenarioError(format!("longitude {longitude} out of range")));
        }
        if radius < 0.0 || max_uncertainty_radius < 0.0 {
            return Err(InvalidScenarioError("radius must not be negative".into()));
        }
        Ok(Self::new(
            LOCATION_CONSTRAINT,
            json!({
                "expected_device_location": {
                    "latitude": latitude,
                    "longitude": longitude,
                    "radius": radius,
                    "max_uncertainty_radius": max_uncertainty_radius,
                }
            }),
        ))
    }

    pub fn transactional_flow(content: Value) -> Self {
        Self::new(TRANSACTIONAL_FLOW, content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicScenario {
    pub callback_endpoint: String,
    pub policy: DynamicPolicy,
    pub extensions: Vec<Extension>,
}

impl DynamicScenario {
    pub fn builder() -> DynamicScenarioBuilder {
        DynamicScenarioBuilder::default()
    }

    /// Re-check required fields; scenarios can also be built by hand
    pub fn validate(&self) -> Result<(), InvalidScenarioError> {
        if self.callback_endpoint.trim().is_empty() {
            return Err(InvalidScenarioError("callback endpoint is required".into()));
        }
        Ok(())
    }

    pub fn to_request_body(&self) -> Result<Vec<u8>, DynamicShareError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicScenarioBuilder {
    callback_endpoint: Option<String>,
    policy: Option<DynamicPolicy>,
    extensions: Vec<Extension>,
}

impl DynamicScenarioBuilder {
    pub fn with_callback_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.callback_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_policy(mut self, policy: DynamicPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn build(self) -> Result<DynamicScenario, InvalidScenarioError> {
        let policy = self
            .policy
            .ok_or_else(|| InvalidScenarioError("policy is required".into()))?;
        let scenario = DynamicScenario {
            callback_endpoint: self.callback_endpoint.unwrap_or_default(),
            policy,
            extensions: self.extensions,
        };
        scenario.validate()?;
        Ok(scenario)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareUrlResult {
    #[serde(rename = "qrcode")]
    pub share_url: String,
    pub ref_id: String,
}

impl ShareUrlResult {
    pub fn from_response(body: &[u8]) -> Result<Self, DynamicShareError> {
        serde_json::from_slice(body).map_err(|e| DynamicShareError::Response(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_last_write_wins() {
        let policy = DynamicPolicy::builder()
            .with_given_names(false)
            .with_given_names(true)
            .with_age_over(18, false)
            .with_age_under(21, false)
            .with_selfie_auth(true)
            .with_pin_auth(true)
            .with_pin_auth(false)
            .build();

        assert_eq!(policy.wanted.len(), 3);
        let given = policy.wanted.iter().find(|w| w.name == "given_names").unwrap();
        assert!(given.optional);
        let derivations: Vec<_> = policy
            .wanted
            .iter()
            .filter_map(|w| w.derivation.as_deref())
            .collect();
        assert_eq!(derivations, ["age_over:18", "age_under:21"]);
        assert_eq!(policy.wanted_auth_types, [SELFIE_AUTH]);
    }

    #[test]
    fn test_scenario_json() {
        let scenario = DynamicScenario::builder()
            .with_callback_endpoint("/callback")
            .with_policy(DynamicPolicy::builder().with_full_name(false).build())
            .with_extension(Extension::transactional_flow(json!({"amount": 10})))
            .build()
            .unwrap();

        let body: Value = serde_json::from_slice(&scenario.to_request_body().unwrap()).unwrap();
        assert_eq!(body["callback_endpoint"], "/callback");
        assert_eq!(body["policy"]["wanted"][0]["name"], "full_name");
        assert_eq!(body["policy"]["wanted_remember_me"], false);
        assert_eq!(body["extensions"][0]["type"], TRANSACTIONAL_FLOW);
        assert_eq!(body["extensions"][0]["content"]["amount"], 10);
    }

    #[test]
    fn test_missing_callback_rejected() {
        let policy = DynamicPolicy::builder().build();
        let err = DynamicScenario::builder()
            .with_policy(policy.clone())
            .build()
            .unwrap_err();
        assert!(err.0.contains("callback"));

        let err = DynamicScenario::builder()
            .with_callback_endpoint("   ")
            .with_policy(policy)
            .build()
            .unwrap_err();
        assert!(err.0.contains("callback"));

        let err = DynamicScenario::builder()
            .with_callback_endpoint("/cb")
            .build()
            .unwrap_err();
        assert!(err.0.contains("policy"));
    }

    #[test]
    fn test_location_constraint() {
        let ext = Extension::location_constraint(51.5, -0.12, 1500.0, 150.0).unwrap();
        assert_eq!(ext.content["expected_device_location"]["radius"], 1500.0);
        assert!(Extension::location_constraint(91.0, 0.0, 1.0, 1.0).is_err());
        assert!(Extension::location_constraint(0.0, 181.0, 1.0, 1.0).is_err());
        assert!(Extension::location_constraint(0.0, 0.0, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_share_url_response() {
        let body = br#"{"qrcode":"https://code.example/abc","ref_id":"r-1"}"#;
        let result = ShareUrlResult::from_response(body).unwrap();
        assert_eq!(result.share_url, "https://code.example/abc");
        assert_eq!(result.ref_id, "r-1");
    }
}
