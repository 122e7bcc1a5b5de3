//! Profile assembly
//!
//! Attribute names are unique within a profile. A repeated name means the
//! payload is malformed and the whole profile is refused; nothing is
//! overwritten.

use std::collections::btree_map::{self, Entry};
use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::attribute::{names, Attribute, Derived, DerivationRule, Image};
use crate::decoder::DecodeWarning;
use crate::payload::AttributeRecord;

/// Verified attributes keyed by name. Immutable once assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Profile {
    attributes: BTreeMap<String, Attribute>,
}

impl Profile {
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, Attribute> {
        self.attributes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|a| a.value.as_text())
    }

    pub fn given_names(&self) -> Option<&str> {
        self.text(names::GIVEN_NAMES)
    }

    pub fn family_name(&self) -> Option<&str> {
        self.text(names::FAMILY_NAME)
    }

    pub fn full_name(&self) -> Option<&str> {
        self.text(names::FULL_NAME)
    }

    pub fn date_of_birth(&self) -> Option<NaiveDate> {
        self.get(names::DATE_OF_BIRTH).and_then(|a| a.value.as_date())
    }

    pub fn gender(&self) -> Option<&str> {
        self.text(names::GENDER)
    }

    pub fn nationality(&self) -> Option<&str> {
        self.text(names::NATIONALITY)
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.text(names::PHONE_NUMBER)
    }

    pub fn email_address(&self) -> Option<&str> {
        self.text(names::EMAIL_ADDRESS)
    }

    pub fn postal_address(&self) -> Option<&str> {
        self.text(names::POSTAL_ADDRESS)
    }

    pub fn document_details(&self) -> Option<&str> {
        self.text(names::DOCUMENT_DETAILS)
    }

    pub fn structured_postal_address(&self) -> Option<&BTreeMap<String, String>> {
        match &self.get(names::STRUCTURED_POSTAL_ADDRESS)?.value {
            crate::attribute::AttributeValue::StructuredAddress(map) => Some(map),
            _ => None,
        }
    }

    pub fn selfie(&self) -> Option<&Image> {
        self.get(names::SELFIE).and_then(|a| a.value.as_image())
    }

    /// Every derived age check in the profile
    pub fn age_verifications(&self) -> Vec<&Derived> {
        self.iter().filter_map(|a| a.value.as_derived()).collect()
    }

    /// Result of the `age_over:<age>` check, if the service performed it
    pub fn age_over(&self, age: u32) -> Option<bool> {
        self.get(&DerivationRule::AgeOver(age).to_string())
            .and_then(|a| a.value.as_derived())
            .map(|d| d.result)
    }

    pub fn age_under(&self, age: u32) -> Option<bool> {
        self.get(&DerivationRule::AgeUnder(age).to_string())
            .and_then(|a| a.value.as_derived())
            .map(|d| d.result)
    }
}

impl<'a> IntoIterator for &'a Profile {
    type Item = &'a Attribute;
    type IntoIter = btree_map::Values<'a, String, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Everything a successful pipeline run hands back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDetails {
    pub receipt_id: String,
    pub remember_me_id: Option<String>,
    pub parent_remember_me_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub profile: Profile,
    /// Soft per-attribute failures; the profile is still fully verified
    pub warnings: Vec<DecodeWarning>,
}

/// Names carried by more than one record, in order of first repetition.
///
/// Checked on raw records so a duplicate cannot hide behind a copy that
/// later fails to decode. Empty names are left to the decoder, which
/// warns about each of them.
pub fn duplicate_record_names(records: &[AttributeRecord]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut reported = HashSet::new();
    let mut duplicates = Vec::new();
    for record in records.iter().filter(|record| !record.name.is_empty()) {
        if !seen.insert(record.name.as_str()) && reported.insert(record.name.as_str()) {
            duplicates.push(record.name.clone());
        }
    }
    duplicates
}

/// Build a profile, refusing repeated names.
///
/// On failure returns every repeated name in encounter order.
pub fn assemble<I>(attributes: I) -> Result<Profile, Vec<String>>
where
    I: IntoIterator<Item = Attribute>,
{
    let mut map = BTreeMap::new();
    let mut duplicates = Vec::new();
    for attribute in attributes {
        match map.entry(attribute.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(attribute);
            }
            Entry::Occupied(_) => duplicates.push(attribute.name),
        }
    }
    if duplicates.is_empty() {
        Ok(Profile { attributes: map })
    } else {
        Err(duplicates)
    }
}
