//! Third-party notification gateway
//!
//! Alerts with `app_rise_notification` are delivered through an Apprise API
//! server, which fans a title and body out to the user's service URLs.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::DispatchError;

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, urls: &[String], title: &str, body: &str) -> Result<(), DispatchError>;
}

#[derive(Debug, Serialize)]
struct NotifyRequest<'a> {
    urls: &'a [String],
    title: &'a str,
    body: &'a str,
}

/// Apprise API client (`POST {base}/notify`)
pub struct AppriseGateway {
    http_client: reqwest::Client,
    base_url: String,
}

impl AppriseGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("tpng-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NotificationGateway for AppriseGateway {
    async fn notify(&self, urls: &[String], title: &str, body: &str) -> Result<(), DispatchError> {
        let url = format!("{}/notify", self.base_url);
        tracing::debug!(url = %url, targets = urls.len(), "Sending gateway notification");

        let response = self
            .http_client
            .post(&url)
            .json(&NotifyRequest { urls, title, body })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Gateway(format!("{}: {}", status.as_u16(), error_text)));
        }

        Ok(())
    }
}
