//! HTTP transport used by probes.

use async_trait::async_trait;
use std::time::Duration;

use super::ProbeError;

/// Issues a single GET request and reports the response status.
///
/// Any response, whatever its status, is `Ok`. Only failing to get a
/// response at all is an error.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

/// `HttpTransport` backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("statuswatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let to_probe_error = |e: reqwest::Error| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(to_probe_error)?;

        let status = response.status().as_u16();

        // Read the full body to measure complete transfer time
        let _body = response.bytes().await.map_err(to_probe_error)?;

        Ok(status)
    }
}
