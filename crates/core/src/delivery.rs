//! Delivery Client: outbound HTTP to the LIS.
//!
//! Any response the LIS returns, including 4xx/5xx, is a completed delivery and is handed
//! back as-is. Only transport failures (connect errors, timeouts) before a status line arrives
//! are retried, with a fixed delay, up to the configured attempt count. No call ever returns an `Err`; failures become
//! a `DeliveryOutcome` with `success == false`.

use crate::config::{BridgeConfig, DeliverySettings};
use crate::{BridgeError, BridgeResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// HTTP status reported when the LIS could not be reached.
pub const TRANSPORT_FAILURE_STATUS: u16 = 503;

/// HTTP status reported for any other client-side failure.
pub const UNEXPECTED_FAILURE_STATUS: u16 = 500;

/// Result of one logical delivery (all attempts included).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    /// `true` when the LIS answered, whatever the status.
    pub success: bool,
    pub status: u16,
    /// Response body decoded as JSON, or the raw text when it is not JSON.
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw response text.
    #[serde(skip)]
    pub body: Option<String>,
    #[serde(skip)]
    pub attempts: u32,
}

impl DeliveryOutcome {
    fn received(status: u16, body: String, attempts: u32) -> Self {
        let data = match serde_json::from_str::<Value>(&body) {
            Ok(json) => Some(json),
            Err(_) if body.is_empty() => None,
            Err(_) => Some(Value::String(body.clone())),
        };

        Self {
            success: true,
            status,
            data,
            error: None,
            body: Some(body),
            attempts,
        }
    }

    fn failed(status: u16, error: String, attempts: u32) -> Self {
        Self {
            success: false,
            status,
            data: None,
            error: Some(error),
            body: None,
            attempts,
        }
    }

    pub fn is_2xx(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn is_transport(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

#[derive(Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    config: Arc<BridgeConfig>,
}

impl DeliveryClient {
    pub fn new(config: Arc<BridgeConfig>) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.delivery().timeout)
            .build()
            .map_err(BridgeError::HttpClient)?;
        Ok(Self { http, config })
    }

    /// Send to an LIS endpoint with the configured policy.
    pub async fn send_to_lis(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&Value>,
    ) -> DeliveryOutcome {
        let url = self.config.lis_url(endpoint);
        self.send(method, &url, payload, &[], self.config.delivery())
            .await
    }

    /// Send a request. `headers` override the JSON defaults.
    ///
    /// GET payloads are sent as query parameters, all other methods as a JSON body.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
        headers: &[(&str, &str)],
        settings: &DeliverySettings,
    ) -> DeliveryOutcome {
        let headers = match merge_headers(headers) {
            Ok(headers) => headers,
            Err(e) => return DeliveryOutcome::failed(UNEXPECTED_FAILURE_STATUS, e, 0),
        };
        let max_attempts = settings.retries.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut request = self
                .http
                .request(method.clone(), url)
                .headers(headers.clone())
                .timeout(settings.timeout);
            if let Some(payload) = payload {
                request = if method == Method::GET {
                    request.query(payload)
                } else {
                    request.json(payload)
                };
            }

            let error = match request.send().await {
                Ok(response) => {
                    // The LIS has seen the request; resending could duplicate it.
                    let status = response.status().as_u16();
                    return match response.text().await {
                        Ok(body) => {
                            tracing::debug!(%url, status, attempt, "LIS responded");
                            DeliveryOutcome::received(status, body, attempt)
                        }
                        Err(e) => {
                            tracing::error!(%url, status, attempt, "LIS response body unreadable: {e}");
                            let status = if is_transport(&e) {
                                TRANSPORT_FAILURE_STATUS
                            } else {
                                UNEXPECTED_FAILURE_STATUS
                            };
                            DeliveryOutcome::failed(
                                status,
                                format!("Response body read failed: {e}"),
                                attempt,
                            )
                        }
                    };
                }
                Err(e) => e,
            };

            if !is_transport(&error) {
                tracing::error!(%url, attempt, "LIS request failed: {error}");
                return DeliveryOutcome::failed(
                    UNEXPECTED_FAILURE_STATUS,
                    format!("Request failed: {error}"),
                    attempt,
                );
            }

            if attempt >= max_attempts {
                tracing::error!(%url, attempts = attempt, "LIS unreachable: {error}");
                return DeliveryOutcome::failed(
                    TRANSPORT_FAILURE_STATUS,
                    format!("Connection timeout: {error}"),
                    attempt,
                );
            }

            tracing::warn!(%url, attempt, "LIS transport failure, retrying: {error}");
            tokio::time::sleep(settings.retry_delay).await;
        }
    }
}

fn merge_headers(overrides: &[(&str, &str)]) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    for (name, value) in overrides {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("invalid header name {name:?}: {e}"))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| format!("invalid header value: {e}"))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
