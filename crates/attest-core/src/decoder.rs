//! Attribute decoding
//!
//! Data-driven: every record in the payload is dispatched on its content
//! type. Records that cannot be decoded become [`DecodeWarning`]s and are
//! left out of the profile; they never abort the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::attribute::{
    names, Anchor, AnchorType, Attribute, AttributeValue, DerivationRule, Derived, Image,
};
use crate::payload::{AnchorRecord, AttributeRecord, ContentType};

/// Calendar format for date attributes
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A soft, per-attribute decode failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("attribute '{attribute}': {kind}")]
pub struct DecodeWarning {
    pub attribute: String,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WarningKind {
    #[error("unsupported content type {0}, skipped")]
    UnknownContentType(i32),

    #[error("attribute has no name")]
    EmptyName,

    #[error("value is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed date '{0}', expected YYYY-MM-DD")]
    MalformedDate(String),

    #[error("malformed integer '{0}'")]
    MalformedInt(String),

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("structured address must be a JSON object")]
    AddressNotObject,

    #[error("malformed derivation: {0}")]
    MalformedDerivation(String),

    #[error("anchor dropped: {0}")]
    AnchorDropped(String),
}

impl DecodeWarning {
    fn new(attribute: &str, kind: WarningKind) -> Self {
        Self {
            attribute: attribute.to_string(),
            kind,
        }
    }
}

/// Lazily decodes attribute records, collecting soft failures on the side.
///
/// ```ignore
/// let mut decoder = AttributeDecoder::new(&payload.attributes);
/// let attributes: Vec<_> = decoder.by_ref().collect();
/// let warnings = decoder.into_warnings();
/// ```
pub struct AttributeDecoder<'a> {
    records: std::slice::Iter<'a, AttributeRecord>,
    warnings: Vec<DecodeWarning>,
}

impl<'a> AttributeDecoder<'a> {
    pub fn new(records: &'a [AttributeRecord]) -> Self {
        Self {
            records: records.iter(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<DecodeWarning> {
        self.warnings
    }

    fn record_warning(&mut self, warning: DecodeWarning) {
        warn!(attribute = %warning.attribute, "{}", warning.kind);
        self.warnings.push(warning);
    }
}

impl Iterator for AttributeDecoder<'_> {
    type Item = Attribute;

    fn next(&mut self) -> Option<Attribute> {
        while let Some(record) = self.records.next() {
            match decode_value(record) {
                Ok(value) => {
                    let mut anchors = Vec::with_capacity(record.anchors.len());
                    for anchor in &record.anchors {
                        match decode_anchor(anchor) {
                            Ok(a) => anchors.push(a),
                            Err(reason) => self.record_warning(DecodeWarning::new(
                                &record.name,
                                WarningKind::AnchorDropped(reason),
                            )),
                        }
                    }
                    return Some(Attribute {
                        name: record.name.clone(),
                        value,
                        anchors,
                    });
                }
                Err(kind) => self.record_warning(DecodeWarning::new(&record.name, kind)),
            }
        }
        None
    }
}

fn decode_value(record: &AttributeRecord) -> Result<AttributeValue, WarningKind> {
    if record.name.is_empty() {
        return Err(WarningKind::EmptyName);
    }
    if record.name.starts_with(names::AGE_OVER) || record.name.starts_with(names::AGE_UNDER) {
        return decode_derived(record);
    }

    let content_type = ContentType::from_raw(record.content_type)
        .ok_or(WarningKind::UnknownContentType(record.content_type))?;

    match content_type {
        ContentType::String => Ok(AttributeValue::Text(utf8(&record.value)?.to_string())),
        ContentType::Date => decode_date(utf8(&record.value)?).map(AttributeValue::Date),
        ContentType::Int => {
            let raw = utf8(&record.value)?.trim();
            raw.parse::<i64>()
                .map(AttributeValue::Int)
                .map_err(|_| WarningKind::MalformedInt(raw.to_string()))
        }
        ContentType::Jpeg => Ok(image(record, "image/jpeg")),
        ContentType::Png => Ok(image(record, "image/png")),
        ContentType::Json => decode_json(record),
    }
}

fn utf8(value: &[u8]) -> Result<&str, WarningKind> {
    std::str::from_utf8(value).map_err(|_| WarningKind::InvalidUtf8)
}

fn decode_date(raw: &str) -> Result<NaiveDate, WarningKind> {
    // chrono accepts unpadded fields; the wire format does not
    if raw.len() != 10 {
        return Err(WarningKind::MalformedDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| WarningKind::MalformedDate(raw.to_string()))
}

fn image(record: &AttributeRecord, mime_type: &str) -> AttributeValue {
    AttributeValue::Image(Image {
        data: record.value.clone(),
        mime_type: mime_type.to_string(),
    })
}

fn decode_json(record: &AttributeRecord) -> Result<AttributeValue, WarningKind> {
    let value: serde_json::Value = serde_json::from_slice(&record.value)
        .map_err(|e| WarningKind::MalformedJson(e.to_string()))?;

    if record.name != names::STRUCTURED_POSTAL_ADDRESS {
        return Ok(AttributeValue::Json(value));
    }

    let serde_json::Value::Object(fields) = value else {
        return Err(WarningKind::AddressNotObject);
    };
    let address: BTreeMap<String, String> = fields
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();
    Ok(AttributeValue::StructuredAddress(address))
}

fn decode_derived(record: &AttributeRecord) -> Result<AttributeValue, WarningKind> {
    let rule: DerivationRule = record
        .name
        .parse()
        .map_err(WarningKind::MalformedDerivation)?;
    let result = match utf8(&record.value)?.trim() {
        "true" => true,
        "false" => false,
        other => {
            return Err(WarningKind::MalformedDerivation(format!(
                "expected true/false, got '{other}'"
            )))
        }
    };
    Ok(AttributeValue::Derived(Derived {
        base: rule.base_attribute().to_string(),
        rule,
        result,
    }))
}

fn decode_anchor(record: &AnchorRecord) -> Result<Anchor, String> {
    let signed_timestamp = match record.signed_timestamp_micros {
        0 => None,
        micros => Some(timestamp_from_micros(micros).ok_or_else(|| {
            format!("signed timestamp {micros} out of range")
        })?),
    };
    Ok(Anchor {
        anchor_type: AnchorType::parse(&record.anchor_type),
        sub_type: record.sub_type.clone(),
        signed_timestamp,
        issuing_entity: record.issuing_entity.clone(),
        value: record.value.clone(),
    })
}

pub(crate) fn timestamp_from_micros(micros: u64) -> Option<DateTime<Utc>> {
    i64::try_from(micros)
        .ok()
        .and_then(DateTime::from_timestamp_micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, content_type: i32, value: &[u8]) -> AttributeRecord {
        AttributeRecord {
            name: name.into(),
            value: value.to_vec(),
            content_type,
            anchors: vec![],
        }
    }

    fn decode_all(records: &[AttributeRecord]) -> (Vec<Attribute>, Vec<DecodeWarning>) {
        let mut decoder = AttributeDecoder::new(records);
        let attributes: Vec<_> = decoder.by_ref().collect();
        (attributes, decoder.into_warnings())
    }

    #[test]
    fn test_each_known_type() {
        let records = vec![
            record("given_names", 1, b"Jane Anne"),
            record("date_of_birth", 3, b"1990-02-28"),
            record("selfie", 2, &[0xff, 0xd8, 0xff]),
            record("document_scan", 4, &[0x89, b'P']),
            record(
                "structured_postal_address",
                5,
                br#"{"building_number":15,"town_city":"London"}"#,
            ),
            record("document_images", 5, br#"[1,2]"#),
            record("age_over:18", 1, b"true"),
            record("loyalty_points", 7, b"-12"),
        ];
        let (attrs, warnings) = decode_all(&records);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(attrs.len(), records.len());

        assert_eq!(attrs[0].value.as_text(), Some("Jane Anne"));
        assert_eq!(attrs[1].value.as_date(), NaiveDate::from_ymd_opt(1990, 2, 28));
        assert_eq!(attrs[2].value.as_image().unwrap().mime_type, "image/jpeg");
        assert_eq!(attrs[3].value.as_image().unwrap().mime_type, "image/png");
        match &attrs[4].value {
            AttributeValue::StructuredAddress(map) => {
                assert_eq!(map["building_number"], "15");
                assert_eq!(map["town_city"], "London");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(attrs[5].value, AttributeValue::Json(serde_json::json!([1, 2])));
        let derived = attrs[6].value.as_derived().unwrap();
        assert_eq!(derived.rule, DerivationRule::AgeOver(18));
        assert_eq!(derived.base, "date_of_birth");
        assert!(derived.result);
        assert_eq!(attrs[7].value, AttributeValue::Int(-12));
    }

    #[test]
    fn test_unknown_type_skipped_with_warning() {
        let records = vec![
            record("hologram", 99, b"?"),
            record("family_name", 1, b"Doe"),
            record("undefined", 0, b""),
        ];
        let (attrs, warnings) = decode_all(&records);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "family_name");
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].kind, WarningKind::UnknownContentType(99));
        assert_eq!(warnings[1].attribute, "undefined");
    }

    #[test]
    fn test_bad_date_only_fails_that_attribute() {
        let records = vec![
            record("date_of_birth", 3, b"28/02/1990"),
            record("expiry", 3, b"2020-2-1"),
            record("issued", 3, b"2020-02-30"),
            record("given_names", 1, b"Jane"),
        ];
        let (attrs, warnings) = decode_all(&records);
        assert_eq!(attrs.len(), 1);
        assert_eq!(warnings.len(), 3);
        assert!(warnings
            .iter()
            .all(|w| matches!(w.kind, WarningKind::MalformedDate(_))));
    }

    #[test]
    fn test_soft_failures() {
        let records = vec![
            record("", 1, b"x"),
            record("given_names", 1, &[0xc3, 0x28]),
            record("structured_postal_address", 5, b"[1]"),
            record("extra", 5, b"{nope"),
            record("age_over:eighteen", 1, b"true"),
            record("age_under:21", 1, b"maybe"),
            record("count", 7, b"1.5"),
        ];
        let (attrs, warnings) = decode_all(&records);
        assert!(attrs.is_empty());
        let kinds: Vec<_> = warnings.iter().map(|w| &w.kind).collect();
        assert_eq!(kinds[0], &WarningKind::EmptyName);
        assert_eq!(kinds[1], &WarningKind::InvalidUtf8);
        assert_eq!(kinds[2], &WarningKind::AddressNotObject);
        assert!(matches!(kinds[3], WarningKind::MalformedJson(_)));
        assert!(matches!(kinds[4], WarningKind::MalformedDerivation(_)));
        assert!(matches!(kinds[5], WarningKind::MalformedDerivation(_)));
        assert!(matches!(kinds[6], WarningKind::MalformedInt(_)));
    }

    #[test]
    fn test_anchors_decoded_independently() {
        let mut rec = record("given_names", 1, b"Jane");
        rec.anchors = vec![
            AnchorRecord {
                anchor_type: "SOURCE".into(),
                sub_type: "PASSPORT".into(),
                signed_timestamp_micros: 1_600_000_000_000_000,
                issuing_entity: "GBR".into(),
                value: "PASSPORT".into(),
            },
            AnchorRecord {
                anchor_type: "VERIFIER".into(),
                signed_timestamp_micros: u64::MAX,
                ..Default::default()
            },
            AnchorRecord {
                anchor_type: "VERIFIER".into(),
                value: "YOTI_ADMIN".into(),
                ..Default::default()
            },
        ];
        let (attrs, warnings) = decode_all(&[rec]);
        assert_eq!(attrs.len(), 1);
        let anchors = &attrs[0].anchors;
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].anchor_type, AnchorType::Source);
        assert_eq!(
            anchors[0].signed_timestamp.unwrap().timestamp(),
            1_600_000_000
        );
        assert_eq!(anchors[1].signed_timestamp, None);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0].kind, WarningKind::AnchorDropped(_)));
    }

    #[test]
    fn test_decoding_is_lazy() {
        let records = vec![record("a", 1, b"1"), record("b", 99, b""), record("c", 1, b"3")];
        let mut decoder = AttributeDecoder::new(&records);
        assert_eq!(decoder.next().unwrap().name, "a");
        assert!(decoder.warnings().is_empty());
        assert_eq!(decoder.next().unwrap().name, "c");
        assert_eq!(decoder.warnings().len(), 1);
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_self_asserted_attribute_is_valid() {
        let (attrs, _) = decode_all(&[record("nickname", 1, b"JJ")]);
        assert!(attrs[0].is_self_asserted());
    }
}
