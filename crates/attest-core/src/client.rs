//! Client façade
//!
//! Three operations: retrieve a profile from a token (local, synchronous),
//! request an AML check, and create a share URL. The latter two go through
//! a [`Transport`], which owns timeouts and retries.

use std::future::Future;
use std::sync::Arc;

use attest_crypto::{KeyStore, ServiceVerifyingKey};
use thiserror::Error;
use tracing::{debug, info};

use crate::aml::{AmlError, AmlProfile, AmlResult};
use crate::config::{ClientConfig, ConfigError};
use crate::error::ProfileError;
use crate::pipeline::TokenPipeline;
use crate::profile::ActivityDetails;
use crate::share::{DynamicScenario, DynamicShareError, ShareUrlResult};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// Outbound request seam. Implementations POST `body` (JSON) to `path`
/// relative to the service base URL and return the response body.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        path: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Entry point for applications. Cheap to share across tasks.
pub struct AttestClient<T> {
    sdk_id: String,
    pipeline: TokenPipeline,
    transport: T,
}

impl<T: Transport> AttestClient<T> {
    pub fn new(
        sdk_id: impl Into<String>,
        keys: Arc<KeyStore>,
        service_key: ServiceVerifyingKey,
        transport: T,
    ) -> Self {
        Self {
            sdk_id: sdk_id.into(),
            pipeline: TokenPipeline::new(keys, service_key),
            transport,
        }
    }

    pub fn from_config(config: &ClientConfig, transport: T) -> Result<Self, ConfigError> {
        let keys = Arc::new(config.key_store()?);
        let service_key = config.service_key()?;
        Ok(Self::new(config.sdk_id.clone(), keys, service_key, transport))
    }

    pub fn sdk_id(&self) -> &str {
        &self.sdk_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Decrypt, verify and decode a single-use token.
    ///
    /// Do not call twice with the same token.
    pub fn retrieve_profile(&self, token: &str) -> Result<ActivityDetails, ProfileError> {
        self.pipeline.retrieve_profile(token)
    }

    pub async fn perform_aml_check(&self, profile: &AmlProfile) -> Result<AmlResult, AmlError> {
        let body = profile.to_request_body()?;
        let path = format!("/aml-check?appId={}", self.sdk_id);
        debug!(%path, "requesting AML check");

        let response = self.transport.post(&path, body).await?;
        let result = AmlResult::from_response(&response)?;
        info!(flagged = result.is_flagged(), "AML check complete");
        Ok(result)
    }

    pub async fn create_share_url(
        &self,
        scenario: &DynamicScenario,
    ) -> Result<ShareUrlResult, DynamicShareError> {
        // Validation happens before anything touches the network
        let body = scenario.to_request_body()?;
        let path = format!("/qrcodes/apps/{}", self.sdk_id);
        debug!(%path, "requesting share URL");

        let response = self.transport.post(&path, body).await?;
        let result = ShareUrlResult::from_response(&response)?;
        info!(ref_id = %result.ref_id, "share URL created");
        Ok(result)
    }
}
