//! Job execution against the real collaborators

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::sync::Arc;
use tpng_common::events::{Room, USER_NOTIFICATION_EVENT};
use tracing::{debug, warn};

use crate::dispatch::{DispatchJob, ForwardJob, ForwardPayload, GatewayNotifyJob};
use crate::error::DispatchError;
use crate::ingest::Submission;
use crate::live::LiveBroadcaster;
use crate::runner::JobExecutor;
use crate::services::{BlobStore, ForwardRequest, IncidentForward, NotificationGateway, RemoteForwarder};

pub struct DispatchExecutor {
    live: LiveBroadcaster,
    blobs: Arc<dyn BlobStore>,
    /// `None` when no gateway is configured
    gateway: Option<Arc<dyn NotificationGateway>>,
    forwarder: Arc<dyn RemoteForwarder>,
}

impl DispatchExecutor {
    pub fn new(
        live: LiveBroadcaster,
        blobs: Arc<dyn BlobStore>,
        gateway: Option<Arc<dyn NotificationGateway>>,
        forwarder: Arc<dyn RemoteForwarder>,
    ) -> Self {
        Self {
            live,
            blobs,
            gateway,
            forwarder,
        }
    }

    async fn notify(&self, job: GatewayNotifyJob) -> Result<(), DispatchError> {
        let title = job.title();
        let body = job.body();

        if job.web_notification {
            self.live.broadcast(
                Room::User { user_id: job.user_id },
                USER_NOTIFICATION_EVENT,
                json!({
                    "title": title,
                    "body": body,
                    "transmission_id": job.transmission_id,
                    "emergency": job.emergency,
                    "kind": job.kind,
                    "alert_id": job.alert_id,
                }),
            );
        }

        if !job.app_rise_notification {
            return Ok(());
        }
        if job.urls.is_empty() {
            warn!(alert_id = %job.alert_id, "Alert has no gateway URLs, skipping");
            return Ok(());
        }
        let Some(gateway) = &self.gateway else {
            warn!(alert_id = %job.alert_id, "No notification gateway configured, skipping");
            return Ok(());
        };

        gateway.notify(&job.urls, &title, &body).await?;
        debug!(alert_id = %job.alert_id, targets = job.urls.len(), "Gateway notification sent");
        Ok(())
    }

    async fn forward(&self, job: ForwardJob) -> Result<(), DispatchError> {
        let recorder = job.recorder_key.to_string();
        let request = match job.payload {
            ForwardPayload::Transmission {
                transmission_id,
                audio_file,
                call,
            } => {
                let audio = self
                    .blobs
                    .fetch(&audio_file)
                    .await
                    .map_err(|e| DispatchError::Storage(format!("{}: {}", transmission_id, e)))?;
                ForwardRequest::Transmission(Submission {
                    recorder,
                    json: serde_json::to_value(&call)?,
                    audio_file: STANDARD.encode(audio),
                    name: Some(audio_file),
                })
            }
            ForwardPayload::Incident { incident, is_new } => ForwardRequest::Incident(IncidentForward {
                recorder,
                is_new,
                incident,
            }),
        };

        self.forwarder.forward(&job.remote_url, request).await?;
        debug!(forwarder = %job.forwarder_name, "Forwarded to peer");
        Ok(())
    }
}

#[async_trait]
impl JobExecutor for DispatchExecutor {
    async fn execute(&self, job: DispatchJob) -> Result<(), DispatchError> {
        match job {
            DispatchJob::Broadcast(job) => {
                self.live.broadcast(job.room, &job.event, job.payload);
                Ok(())
            }
            DispatchJob::GatewayNotify(job) => self.notify(job).await,
            DispatchJob::Forward(job) => self.forward(job).await,
        }
    }
}
