mod common;

use std::thread;

use attest_core::payload::ContentType;
use attest_core::{
    AnchorType, AttributeValue, DerivationRule, Stage, StageError, TokenPipeline, WarningKind,
};
use attest_crypto::{seal, Envelope, ServiceSigner};
use chrono::NaiveDate;
use common::*;

#[test]
fn test_valid_token_yields_exact_profile() {
    let mut given = record("given_names", ContentType::String as i32, b"Jane");
    given.anchors = vec![passport_source()];
    let payload = payload(vec![
        given,
        record("date_of_birth", ContentType::Date as i32, b"1980-07-14"),
        record("selfie", ContentType::Png as i32, &[0x89, b'P', b'N', b'G']),
        record(
            "structured_postal_address",
            ContentType::Json as i32,
            br#"{"postal_code":"E1 6DB","country_iso":"GBR"}"#,
        ),
        record("age_over:18", ContentType::String as i32, b"true"),
    ]);

    let details = pipeline().retrieve_profile(&token_for(&payload)).unwrap();

    assert_eq!(details.receipt_id, "receipt-123");
    assert_eq!(details.remember_me_id.as_deref(), Some("remember-me"));
    assert_eq!(details.parent_remember_me_id, None);
    assert_eq!(details.timestamp.unwrap().timestamp(), 1_700_000_000);
    assert!(details.warnings.is_empty());

    let profile = &details.profile;
    assert_eq!(profile.len(), 5);
    assert_eq!(profile.given_names(), Some("Jane"));
    assert_eq!(profile.date_of_birth(), NaiveDate::from_ymd_opt(1980, 7, 14));
    assert_eq!(profile.selfie().unwrap().mime_type, "image/png");
    assert_eq!(
        profile.structured_postal_address().unwrap()["country_iso"],
        "GBR"
    );
    assert_eq!(profile.age_over(18), Some(true));

    let anchors = &profile.get("given_names").unwrap().anchors;
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].anchor_type, AnchorType::Source);
    assert_eq!(anchors[0].value, "PASSPORT");
    assert!(profile.get("date_of_birth").unwrap().is_self_asserted());
}

#[test]
fn test_tampered_payload_never_decodes() {
    let token = token_for(&payload(vec![record("given_names", 1, b"Jane")]));
    let envelope = Envelope::decode(&token).unwrap();

    for i in 0..envelope.encrypted_payload.len() {
        let mut tampered = envelope.clone();
        tampered.encrypted_payload[i] ^= 0x01;
        let err = pipeline()
            .retrieve_profile(&tampered.encode().unwrap())
            .unwrap_err();
        assert!(
            matches!(
                err.primary().error,
                StageError::Decryption(_) | StageError::SignatureVerification
            ),
            "byte {i}: {err}"
        );
    }
}

#[test]
fn test_wrong_key_pair_is_key_mismatch() {
    let payload = payload(vec![record("given_names", 1, b"Jane")]);
    let foreign = seal(
        &payload.encode_bytes(),
        &other_keys().recipient_key(),
        signer(),
    )
    .unwrap();

    let err = pipeline()
        .retrieve_profile(&foreign.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.primary().stage, Stage::SymmetricUnwrap);
    assert!(matches!(err.primary().error, StageError::KeyMismatch(_)));

    // Same without the key id hint: OAEP itself catches it
    let mut anonymous = foreign.clone();
    anonymous.metadata.clear();
    let err = pipeline()
        .retrieve_profile(&anonymous.encode().unwrap())
        .unwrap_err();
    assert!(matches!(err.primary().error, StageError::KeyMismatch(_)));

    // Payload corruption with the right key is a different error
    let mut corrupted = Envelope::decode(&token_for(&payload)).unwrap();
    let last = corrupted.encrypted_payload.len() - 1;
    corrupted.encrypted_payload[last] ^= 0xff;
    let err = pipeline()
        .retrieve_profile(&corrupted.encode().unwrap())
        .unwrap_err();
    assert!(matches!(err.primary().error, StageError::Decryption(_)));
}

#[test]
fn test_unknown_signer_rejected_before_decoding() {
    let (impostor, _) = ServiceSigner::generate().unwrap();
    let payload = payload(vec![record("given_names", 1, b"Mallory")]);
    let forged = seal(&payload.encode_bytes(), &keys().recipient_key(), &impostor).unwrap();

    let err = pipeline()
        .retrieve_profile(&forged.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.primary().stage, Stage::SignatureVerify);
    assert_eq!(err.primary().error, StageError::SignatureVerification);
    assert_eq!(err.causes().len(), 1);
}

#[test]
fn test_duplicate_names_refuse_profile() {
    let payload = payload(vec![
        record("given_names", 1, b"Jane"),
        record("family_name", 1, b"Doe"),
        record("given_names", 1, b"Eve"),
    ]);

    let err = pipeline().retrieve_profile(&token_for(&payload)).unwrap_err();
    assert_eq!(err.primary().stage, Stage::ProfileAssembly);
    assert_eq!(
        err.primary().error,
        StageError::DuplicateAttribute("given_names".into())
    );
}

#[test]
fn test_repeated_empty_names_are_warnings_not_duplicates() {
    let payload = payload(vec![
        record("", 1, b"first"),
        record("", 1, b"second"),
        record("given_names", 1, b"Jane"),
    ]);

    let details = pipeline().retrieve_profile(&token_for(&payload)).unwrap();
    assert_eq!(details.profile.len(), 1);
    assert_eq!(details.profile.given_names(), Some("Jane"));
    assert_eq!(details.warnings.len(), 2);
    assert!(details
        .warnings
        .iter()
        .all(|w| w.kind == WarningKind::EmptyName));
}

#[test]
fn test_duplicate_hidden_behind_bad_copy_still_refused() {
    let payload = payload(vec![
        record("date_of_birth", 3, b"1980-07-14"),
        record("date_of_birth", 3, b"not a date"),
    ]);
    let err = pipeline().retrieve_profile(&token_for(&payload)).unwrap_err();
    assert!(err.has(|e| matches!(e, StageError::DuplicateAttribute(n) if n == "date_of_birth")));
}

#[test]
fn test_unknown_type_is_skipped() {
    let payload = payload(vec![
        record("given_names", 1, b"Jane"),
        record("iris_scan", 64, b"\x00\x01"),
        record("date_of_birth", 3, b"14/07/1980"),
        record("family_name", 1, b"Doe"),
    ]);

    let details = pipeline().retrieve_profile(&token_for(&payload)).unwrap();
    assert_eq!(
        details.profile.names().collect::<Vec<_>>(),
        ["family_name", "given_names"]
    );
    assert_eq!(details.warnings.len(), 2);
    assert_eq!(details.warnings[0].attribute, "iris_scan");
    assert_eq!(details.warnings[0].kind, WarningKind::UnknownContentType(64));
    assert!(matches!(details.warnings[1].kind, WarningKind::MalformedDate(_)));
}

#[test]
fn test_malformed_tokens() {
    let p = pipeline();
    for token in ["", "%%%", "AQ", "Ag"] {
        let err = p.retrieve_profile(token).unwrap_err();
        assert_eq!(err.primary().stage, Stage::EnvelopeDecode, "{token:?}");
        assert!(matches!(err.primary().error, StageError::MalformedToken(_)));
    }
}

#[test]
fn test_signed_garbage_payload_is_malformed() {
    let envelope = seal(b"\xff\xff\xff\xff", &keys().recipient_key(), signer()).unwrap();
    let err = pipeline()
        .retrieve_profile(&envelope.encode().unwrap())
        .unwrap_err();
    assert_eq!(err.primary().stage, Stage::AttributeDecode);
    assert!(matches!(err.primary().error, StageError::MalformedPayload(_)));
}

#[test]
fn test_derived_attributes() {
    let payload = payload(vec![
        record("age_over:18", 1, b"true"),
        record("age_under:16", 1, b"false"),
    ]);
    let details = pipeline().retrieve_profile(&token_for(&payload)).unwrap();
    let mut rules: Vec<_> = details
        .profile
        .age_verifications()
        .iter()
        .map(|d| (d.rule, d.result))
        .collect();
    rules.sort_by_key(|(rule, _)| rule.to_string());
    assert_eq!(
        rules,
        [
            (DerivationRule::AgeOver(18), true),
            (DerivationRule::AgeUnder(16), false)
        ]
    );
    assert!(matches!(
        details.profile.get("age_under:16").unwrap().value,
        AttributeValue::Derived(_)
    ));
}

#[test]
fn test_pipeline_shared_across_threads() {
    let pipeline: TokenPipeline = pipeline();
    let pipeline = &pipeline;
    let tokens: Vec<String> = (0..4)
        .map(|i| {
            let name = format!("User {i}");
            token_for(&payload(vec![record("given_names", 1, name.as_bytes())]))
        })
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = tokens
            .iter()
            .map(|token| scope.spawn(move || pipeline.retrieve_profile(token)))
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let details = handle.join().unwrap().unwrap();
            assert_eq!(details.profile.given_names(), Some(format!("User {i}").as_str()));
        }
    });
}
