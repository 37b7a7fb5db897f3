use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransmitError {
    /// 4xx other than 429. Resending the same request will not help.
    #[error("client error (status {status}): {message}")]
    Client { status: u16, message: String },

    /// 429, 5xx, timeouts and connection failures.
    #[error("transient error (status {status:?}): {message}")]
    Transient { status: Option<u16>, message: String },
}

impl TransmitError {
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 || status >= 500 {
            TransmitError::Transient {
                status: Some(status),
                message,
            }
        } else {
            TransmitError::Client { status, message }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub to: String,
    pub from: String,
    pub media_url: String,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    #[serde(alias = "id")]
    pub external_id: String,
    pub status: String,
}

#[async_trait]
pub trait FaxTransmitter: Send + Sync {
    async fn send(&self, request: &SendRequest) -> Result<SendResponse, TransmitError>;
}

/// Outbound fax gateway over HTTP: `POST {base}/faxes` with a bearer key.
#[derive(Clone)]
pub struct HttpFaxTransmitter {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpFaxTransmitter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl FaxTransmitter for HttpFaxTransmitter {
    async fn send(&self, request: &SendRequest) -> Result<SendResponse, TransmitError> {
        let transient = |e: reqwest::Error| TransmitError::Transient {
            status: None,
            message: e.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/faxes", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transient)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransmitError::from_status(status.as_u16(), body));
        }

        let parsed: SendResponse = response.json().await.map_err(transient)?;
        debug!(external_id = %parsed.external_id, status = %parsed.status, "Fax accepted by gateway");
        Ok(parsed)
    }
}
