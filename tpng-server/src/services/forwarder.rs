//! Cross-instance forwarding client
//!
//! Transmissions are re-submitted to the peer's ingestion endpoint under
//! the forwarder's recorder key, exactly like a field recorder would.
//! Incidents go to the peer's incident receiver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tpng_common::db::Incident;

use crate::error::DispatchError;
use crate::ingest::Submission;

/// Body of `POST /api/incidents/forward`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentForward {
    /// Recorder key the peer authenticates
    pub recorder: String,
    pub is_new: bool,
    pub incident: Incident,
}

/// One outbound request to a peer
#[derive(Debug, Clone)]
pub enum ForwardRequest {
    Transmission(Submission),
    Incident(IncidentForward),
}

impl ForwardRequest {
    pub fn path(&self) -> &'static str {
        match self {
            ForwardRequest::Transmission(_) => "/api/transmissions/ingest",
            ForwardRequest::Incident(_) => "/api/incidents/forward",
        }
    }
}

#[async_trait]
pub trait RemoteForwarder: Send + Sync {
    async fn forward(&self, base_url: &str, request: ForwardRequest) -> Result<(), DispatchError>;
}

/// HTTP client for peer instances
pub struct HttpForwarder {
    http_client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("tpng-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl RemoteForwarder for HttpForwarder {
    async fn forward(&self, base_url: &str, request: ForwardRequest) -> Result<(), DispatchError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), request.path());
        tracing::debug!(url = %url, "Forwarding to peer");

        let builder = self.http_client.post(&url);
        let builder = match &request {
            ForwardRequest::Transmission(submission) => builder.json(submission),
            ForwardRequest::Incident(incident) => builder.json(incident),
        };

        let response = builder.send().await.map_err(|e| DispatchError::Forward {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Forward {
                url,
                reason: format!("{}: {}", status.as_u16(), error_text),
            });
        }

        Ok(())
    }
}
