#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use attest_core::payload::{AnchorRecord, AttributeRecord, ProfilePayload};
use attest_core::TokenPipeline;
use attest_crypto::{seal, KeyStore, ServiceSigner};

/// RSA generation is slow in debug builds; one pair per test binary.
pub fn keys() -> Arc<KeyStore> {
    static KEYS: OnceLock<Arc<KeyStore>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyStore::generate(1024).unwrap()))
        .clone()
}

pub fn other_keys() -> Arc<KeyStore> {
    static KEYS: OnceLock<Arc<KeyStore>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyStore::generate(1024).unwrap()))
        .clone()
}

pub fn signer() -> &'static ServiceSigner {
    static SIGNER: OnceLock<ServiceSigner> = OnceLock::new();
    SIGNER.get_or_init(|| ServiceSigner::generate().unwrap().0)
}

pub fn pipeline() -> TokenPipeline {
    TokenPipeline::new(keys(), signer().verifying_key())
}

pub fn record(name: &str, content_type: i32, value: &[u8]) -> AttributeRecord {
    AttributeRecord {
        name: name.into(),
        value: value.to_vec(),
        content_type,
        anchors: vec![],
    }
}

pub fn passport_source() -> AnchorRecord {
    AnchorRecord {
        anchor_type: "SOURCE".into(),
        sub_type: "OCR".into(),
        signed_timestamp_micros: 1_580_000_000_000_000,
        issuing_entity: "GBR".into(),
        value: "PASSPORT".into(),
    }
}

pub fn payload(records: Vec<AttributeRecord>) -> ProfilePayload {
    ProfilePayload {
        receipt_id: "receipt-123".into(),
        remember_me_id: "remember-me".into(),
        parent_remember_me_id: String::new(),
        timestamp_micros: 1_700_000_000_000_000,
        attributes: records,
    }
}

/// Seal a payload the way the service would, to our key store
pub fn token_for(payload: &ProfilePayload) -> String {
    seal(&payload.encode_bytes(), &keys().recipient_key(), signer())
        .unwrap()
        .encode()
        .unwrap()
}
