//! Endpoint probing with bounded retries, and the concurrent fan-out over all endpoints.

use futures::future::join_all;
use tokio::time::Instant;

use super::{HttpTransport, ProbeError, BACKOFF_STEP, MAX_ATTEMPTS, PROBE_TIMEOUT};
use crate::config::EndpointConfig;
use crate::db::ProbeResult;

/// Probe one endpoint. Never fails: an endpoint that cannot be reached
/// after `MAX_ATTEMPTS` yields the unreachable sentinel result.
pub async fn probe_endpoint<T>(transport: &T, endpoint: &EndpointConfig) -> ProbeResult
where
    T: HttpTransport + ?Sized,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let start = Instant::now();

        let request = transport.get(&endpoint.url, PROBE_TIMEOUT);
        let outcome = match tokio::time::timeout(PROBE_TIMEOUT, request).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(PROBE_TIMEOUT)),
        };

        match outcome {
            Ok(status_code) => {
                let response_time_ms = start.elapsed().as_millis() as i64;
                tracing::debug!(
                    "Pinged {} ({}): {} in {}ms",
                    endpoint.name,
                    endpoint.url,
                    status_code,
                    response_time_ms
                );
                return ProbeResult {
                    endpoint: endpoint.url.clone(),
                    status_code,
                    response_time_ms,
                };
            }
            Err(e) => {
                tracing::warn!(
                    "Ping attempt {} failed for {} ({}): {}",
                    attempt,
                    endpoint.name,
                    endpoint.url,
                    e
                );
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(BACKOFF_STEP * attempt).await;
                }
            }
        }
    }

    tracing::error!("All ping attempts failed for {} ({})", endpoint.name, endpoint.url);
    ProbeResult::unreachable(&endpoint.url)
}

/// Probe every endpoint concurrently.
///
/// Results come back in the order of `endpoints`, one per endpoint, and only
/// once every probe (retries included) has finished.
pub async fn probe_all<T>(transport: &T, endpoints: &[EndpointConfig]) -> Vec<ProbeResult>
where
    T: HttpTransport + ?Sized,
{
    tracing::info!("Pinging {} endpoints", endpoints.len());
    join_all(endpoints.iter().map(|endpoint| probe_endpoint(transport, endpoint))).await
}
