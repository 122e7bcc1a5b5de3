//! Attest Core - verified profiles and outbound requests
//!
//! This crate contains everything above the envelope layer:
//! - decoding verified payloads into typed attributes
//! - assembling profiles and aggregating failures
//! - AML check and dynamic share request encoding
//! - sandbox token issuing
//! - the client façade and its transport seam

pub mod aml;
pub mod attribute;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod payload;
pub mod pipeline;
pub mod profile;
pub mod sandbox;
pub mod share;

pub use aml::{AmlAddress, AmlError, AmlProfile, AmlResult};
pub use attribute::{Anchor, AnchorType, Attribute, AttributeValue, DerivationRule, Derived, Image};
pub use client::{AttestClient, Transport, TransportError};
pub use config::{ClientConfig, ConfigError};
pub use decoder::{AttributeDecoder, DecodeWarning, WarningKind};
pub use error::{Cause, ProfileError, Stage, StageError};
pub use pipeline::TokenPipeline;
pub use profile::{ActivityDetails, Profile};
pub use sandbox::{SandboxIssuer, SandboxTokenRequest};
pub use share::{
    DynamicPolicy, DynamicScenario, DynamicShareError, Extension, InvalidScenarioError,
    ShareUrlResult, WantedAttribute,
};
