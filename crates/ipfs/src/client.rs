use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use invoice_anchor_common::JitteredExponential;

use crate::error::IpfsError;
use crate::rate_limiter::RateLimiter;

/// Everything the client needs to know about the gateway it talks to; no
/// policy decisions (what to pin, when to batch) live here — that's the
/// kernel's job.
#[derive(Debug, Clone)]
pub struct IpfsClientConfig {
    /// Base URL the pin endpoint is mounted on, e.g. `https://pin.example.com`.
    pub pin_base_url: String,
    /// Base URL used for `{gateway}/ipfs/{cid}` fetches.
    pub gateway_base_url: String,
    pub rate_per_minute: u32,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
}

#[derive(Serialize)]
struct PinRequest<'a> {
    name: &'a str,
    content: &'a Value,
    timestamp: chrono::DateTime<Utc>,
    size: usize,
}

#[derive(serde::Deserialize)]
struct PinResponse {
    cid: String,
}

#[derive(serde::Deserialize)]
struct PinStatusResponse {
    pinned: bool,
}

pub struct IpfsClient {
    http: reqwest::Client,
    config: IpfsClientConfig,
    limiter: Arc<RateLimiter>,
}

impl IpfsClient {
    pub fn new(config: IpfsClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()
            .expect("static client configuration is always valid");
        let limiter = Arc::new(RateLimiter::new(config.rate_per_minute));
        Self {
            http,
            config,
            limiter,
        }
    }

    fn retry_policy(&self) -> JitteredExponential {
        JitteredExponential {
            base_delay: self.config.base_delay,
            max_retries: self.config.max_retries,
        }
    }

    /// Pins `content` under `name`, returning the resulting CID. Tags the
    /// upload with `{timestamp, size}` per §4.2.
    pub async fn pin_json(&self, content: &Value, name: &str) -> Result<String, IpfsError> {
        self.limiter.acquire().await;
        let body = serde_json::to_vec(content)
            .map_err(|e| IpfsError::Permanent(format!("content is not serializable: {e}")))?;
        let request = PinRequest {
            name,
            content,
            timestamp: Utc::now(),
            size: body.len(),
        };

        (|| self.try_pin(&request)).retry(self.retry_policy()).when(IpfsError::is_retryable).await
    }

    async fn try_pin(&self, request: &PinRequest<'_>) -> Result<String, IpfsError> {
        let url = format!("{}/pin", self.config.pin_base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| IpfsError::Retryable(format!("pin transport error: {e}")))?;

        classify_status(response.status(), "pin")?;

        response
            .json::<PinResponse>()
            .await
            .map(|parsed| parsed.cid)
            .map_err(|e| IpfsError::Permanent(format!("malformed pin response: {e}")))
    }

    /// Fetches content by CID. `None` on 4xx (the gateway has no such CID
    /// cached/pinned), retryable error on 5xx/transport failure.
    pub async fn get_json(&self, cid: &str) -> Result<Option<Value>, IpfsError> {
        self.limiter.acquire().await;
        (|| self.try_get(cid)).retry(self.retry_policy()).when(IpfsError::is_retryable).await
    }

    async fn try_get(&self, cid: &str) -> Result<Option<Value>, IpfsError> {
        let url = format!("{}/ipfs/{cid}", self.config.gateway_base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| IpfsError::Retryable(format!("fetch transport error: {e}")))?;

        if response.status().is_client_error() {
            return Ok(None);
        }
        classify_status(response.status(), "fetch")?;

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| IpfsError::Permanent(format!("malformed fetch response: {e}")))
    }

    /// Pin-status lookup, retried on transient failure like every other call.
    pub async fn is_pinned(&self, cid: &str) -> Result<bool, IpfsError> {
        self.limiter.acquire().await;
        (|| self.try_is_pinned(cid)).retry(self.retry_policy()).when(IpfsError::is_retryable).await
    }

    async fn try_is_pinned(&self, cid: &str) -> Result<bool, IpfsError> {
        let url = format!("{}/pins/{cid}", self.config.pin_base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| IpfsError::Retryable(format!("pin-status transport error: {e}")))?;

        classify_status(response.status(), "pin-status")?;

        response
            .json::<PinStatusResponse>()
            .await
            .map(|parsed| parsed.pinned)
            .map_err(|e| IpfsError::Permanent(format!("malformed pin-status response: {e}")))
    }
}

fn classify_status(status: reqwest::StatusCode, op: &str) -> Result<(), IpfsError> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() {
        return Err(IpfsError::Retryable(format!("{op} returned {status}")));
    }
    if status.as_u16() == 429 {
        return Err(IpfsError::Retryable(format!("{op} rate limited ({status})")));
    }
    Err(IpfsError::Permanent(format!("{op} returned {status}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::*;
    use httptest::{responders::*, Expectation, Server};
    use serde_json::json;

    fn config_for(server: &Server) -> IpfsClientConfig {
        IpfsClientConfig {
            pin_base_url: server.url("").to_string().trim_end_matches('/').to_string(),
            gateway_base_url: server.url("").to_string().trim_end_matches('/').to_string(),
            rate_per_minute: 600,
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn pin_json_returns_cid_on_success() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/pin"))
                .respond_with(json_encoded(json!({"cid": "bafyreicid"}))),
        );
        let client = IpfsClient::new(config_for(&server));
        let cid = client.pin_json(&json!({"a": 1}), "name").await.unwrap();
        assert_eq!(cid, "bafyreicid");
    }

    #[tokio::test]
    async fn pin_json_is_permanent_on_4xx_other_than_429() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/pin"))
                .times(1)
                .respond_with(status_code(400)),
        );
        let client = IpfsClient::new(config_for(&server));
        let err = client.pin_json(&json!({}), "name").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn get_json_returns_none_on_4xx() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/ipfs/QmMissing"))
                .respond_with(status_code(404)),
        );
        let client = IpfsClient::new(config_for(&server));
        assert_eq!(client.get_json("QmMissing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_json_retries_on_5xx_then_succeeds() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/ipfs/QmOk"))
                .times(1)
                .respond_with(status_code(503)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/ipfs/QmOk"))
                .times(1)
                .respond_with(json_encoded(json!({"hello": "world"}))),
        );
        let client = IpfsClient::new(config_for(&server));
        let body = client.get_json("QmOk").await.unwrap();
        assert_eq!(body, Some(json!({"hello": "world"})));
    }

    #[tokio::test]
    async fn is_pinned_parses_boolean_response() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/pins/QmX"))
                .respond_with(json_encoded(json!({"pinned": true}))),
        );
        let client = IpfsClient::new(config_for(&server));
        assert!(client.is_pinned("QmX").await.unwrap());
    }
}
