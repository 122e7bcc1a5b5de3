//! reqwest-backed transport

use std::time::Duration;

use attest_core::{Transport, TransportError};
use tracing::debug;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    sdk_id: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, sdk_id: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            sdk_id: sdk_id.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, bytes = body.len(), "POST");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Attest-SDK-Id", &self.sdk_id)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}
