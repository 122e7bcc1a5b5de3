//! Typed attribute values and their provenance

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};

/// Canonical human-profile attribute names
pub mod names {
    pub const GIVEN_NAMES: &str = "given_names";
    pub const FAMILY_NAME: &str = "family_name";
    pub const FULL_NAME: &str = "full_name";
    pub const DATE_OF_BIRTH: &str = "date_of_birth";
    pub const GENDER: &str = "gender";
    pub const NATIONALITY: &str = "nationality";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const EMAIL_ADDRESS: &str = "email_address";
    pub const POSTAL_ADDRESS: &str = "postal_address";
    pub const STRUCTURED_POSTAL_ADDRESS: &str = "structured_postal_address";
    pub const SELFIE: &str = "selfie";
    pub const DOCUMENT_DETAILS: &str = "document_details";

    pub const AGE_OVER: &str = "age_over:";
    pub const AGE_UNDER: &str = "age_under:";
}

/// A decoded attribute with every anchor the service attached to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    /// Empty for self-asserted data
    pub anchors: Vec<Anchor>,
}

impl Attribute {
    pub fn sources(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors
            .iter()
            .filter(|a| a.anchor_type == AnchorType::Source)
    }

    pub fn verifiers(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors
            .iter()
            .filter(|a| a.anchor_type == AnchorType::Verifier)
    }

    pub fn is_self_asserted(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Date(NaiveDate),
    Int(i64),
    Image(Image),
    StructuredAddress(BTreeMap<String, String>),
    Json(serde_json::Value),
    Derived(Derived),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Self::Image(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_derived(&self) -> Option<&Derived> {
        match self {
            Self::Derived(d) => Some(d),
            _ => None,
        }
    }
}

/// Image bytes exactly as sent, with the declared mime type
#[derive(Clone, PartialEq, Serialize)]
pub struct Image {
    #[serde(serialize_with = "as_base64")]
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Image {
    pub fn base64_content(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({}, {} bytes)", self.mime_type, self.data.len())
    }
}

fn as_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

/// A value the service derived from another attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Derived {
    pub base: String,
    pub rule: DerivationRule,
    pub result: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationRule {
    AgeOver(u32),
    AgeUnder(u32),
}

impl DerivationRule {
    /// Attribute the rule is evaluated against
    pub fn base_attribute(&self) -> &'static str {
        names::DATE_OF_BIRTH
    }
}

impl fmt::Display for DerivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgeOver(age) => write!(f, "{}{age}", names::AGE_OVER),
            Self::AgeUnder(age) => write!(f, "{}{age}", names::AGE_UNDER),
        }
    }
}

impl FromStr for DerivationRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ctor, age): (fn(u32) -> Self, &str) =
            if let Some(age) = s.strip_prefix(names::AGE_OVER) {
                (Self::AgeOver, age)
            } else if let Some(age) = s.strip_prefix(names::AGE_UNDER) {
                (Self::AgeUnder, age)
            } else {
                return Err(format!("unknown derivation '{s}'"));
            };
        age.parse::<u32>()
            .map(ctor)
            .map_err(|_| format!("bad age in derivation '{s}'"))
    }
}

impl Serialize for DerivationRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Provenance of an attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub anchor_type: AnchorType,
    pub sub_type: String,
    pub signed_timestamp: Option<DateTime<Utc>>,
    pub issuing_entity: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorType {
    Source,
    Verifier,
    Unknown(String),
}

impl AnchorType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SOURCE" => Self::Source,
            "VERIFIER" => Self::Verifier,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_rule_parse() {
        assert_eq!("age_over:18".parse(), Ok(DerivationRule::AgeOver(18)));
        assert_eq!("age_under:21".parse(), Ok(DerivationRule::AgeUnder(21)));
        assert!("age_over:".parse::<DerivationRule>().is_err());
        assert!("age_over:-3".parse::<DerivationRule>().is_err());
        assert!("height_over:2".parse::<DerivationRule>().is_err());
        assert_eq!(DerivationRule::AgeOver(18).to_string(), "age_over:18");
    }

    #[test]
    fn test_anchor_filters() {
        let anchor = |t: &str| Anchor {
            anchor_type: AnchorType::parse(t),
            sub_type: String::new(),
            signed_timestamp: None,
            issuing_entity: String::new(),
            value: String::new(),
        };
        let attr = Attribute {
            name: "given_names".into(),
            value: AttributeValue::Text("Jane".into()),
            anchors: vec![anchor("SOURCE"), anchor("VERIFIER"), anchor("NOTARY")],
        };
        assert_eq!(attr.sources().count(), 1);
        assert_eq!(attr.verifiers().count(), 1);
        assert_eq!(attr.anchors[2].anchor_type, AnchorType::Unknown("NOTARY".into()));
        assert!(!attr.is_self_asserted());
    }

    #[test]
    fn test_value_serialization() {
        let value = AttributeValue::Image(Image {
            data: vec![0xff, 0xd8],
            mime_type: "image/jpeg".into(),
        });
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["value"]["data"], "/9g=");

        let derived = AttributeValue::Derived(Derived {
            base: "date_of_birth".into(),
            rule: DerivationRule::AgeOver(18),
            result: true,
        });
        assert_eq!(serde_json::to_value(&derived).unwrap()["value"]["rule"], "age_over:18");
    }
}
