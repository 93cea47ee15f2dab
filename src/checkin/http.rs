//! HTTP check-in submitter
//!
//! Posts the decoded payload as the multipart field `qrCodeData` to
//! `{base_url}/events/{eventId}/check-in` with bearer authentication.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::Form;
use reqwest::Url;
use std::time::Duration;

use crate::checkin::{classify_response, CheckInOutcome, CheckInRequest, CheckInSubmitter};
use crate::core::config::ApiConfig;
use crate::core::error::{Result, ScanError};

/// Multipart field carrying the decoded payload
pub const PAYLOAD_FIELD: &str = "qrCodeData";

/// reqwest-backed check-in submitter
pub struct HttpCheckInSubmitter {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCheckInSubmitter {
    /// Create a submitter for the given API base URL
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScanError::Validation(format!("invalid API base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ScanError::Validation(format!(
                "API base URL '{}' cannot hold a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Create a submitter from the API section of the configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let submitter = Self::new(&config.base_url, config.timeout())?;
        Ok(match config.effective_token() {
            Some(token) => submitter.with_token(&token),
            None => submitter,
        })
    }

    /// Send this bearer token with every request
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Full check-in URL for an event
    pub fn endpoint(&self, event_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ScanError::Validation("API base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["events", event_id, "check-in"]);
        Ok(url)
    }
}

#[async_trait]
impl CheckInSubmitter for HttpCheckInSubmitter {
    async fn submit(&self, request: &CheckInRequest) -> Result<CheckInOutcome> {
        request.validate()?;
        let url = self.endpoint(&request.event_id)?;
        debug!("POST {}", url);

        let form = Form::new().text(PAYLOAD_FIELD, request.payload.clone());
        let mut builder = self.client.post(url).multipart(form);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let outcome = classify_response(status, &body);
        match &outcome {
            Ok(o) => info!("Check-in accepted for event {}: {}", request.event_id, o.message),
            Err(e) => warn!("Check-in rejected for event {}: {}", request.event_id, e),
        }
        outcome
    }
}
