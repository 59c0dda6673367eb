//! Database models
//!
//! Plain records mirroring the schema in [`super::init`]. Many-to-many
//! memberships are loaded into `Vec<Uuid>` fields by the query layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    /// Global override of every ACL check
    pub site_admin: bool,
    pub description: Option<String>,
    pub site_theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAcl {
    pub id: Uuid,
    pub name: String,
    pub public: bool,
    pub users: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: Uuid,
    pub name: String,
    pub system_acl_id: Uuid,
    pub enable_talkgroup_acls: bool,
    pub prune_transmissions: bool,
    pub prune_transmissions_after_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkGroup {
    pub id: Uuid,
    pub system_id: Uuid,
    /// Radio-protocol identifier, unique within the system only
    pub decimal_id: i64,
    pub alpha_tag: String,
    pub description: Option<String>,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub system_id: Uuid,
    pub decimal_id: i64,
    pub description: Option<String>,
}

impl Unit {
    /// Human label: the description when set, else the decimal ID
    pub fn label(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => self.decimal_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecorder {
    pub id: Uuid,
    pub system_id: Uuid,
    pub name: String,
    pub site_id: Option<String>,
    pub enabled: bool,
    /// Owning user; ingestion is authorized as this user when set
    pub user_id: Option<Uuid>,
    /// Secret key recorders present when uploading
    pub forwarder_webhook_uuid: Uuid,
    pub talkgroups_allowed: Vec<Uuid>,
    pub talkgroups_denied: Vec<Uuid>,
}

impl SystemRecorder {
    /// Recorder talkgroup policy: the deny-list wins, and a non-empty
    /// allow-list admits only its members
    pub fn permits_talkgroup(&self, talkgroup_id: Uuid) -> bool {
        if self.talkgroups_denied.contains(&talkgroup_id) {
            return false;
        }
        self.talkgroups_allowed.is_empty() || self.talkgroups_allowed.contains(&talkgroup_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub id: Uuid,
    pub system_id: Uuid,
    pub recorder_id: Uuid,
    pub talkgroup_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Blob store reference of the audio payload
    pub audio_file: String,
    pub encrypted: bool,
    pub emergency: bool,
    pub locked: bool,
    pub frequency: f64,
    pub length: f64,
}

/// Per-unit timeline entry, owned by exactly one transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionUnit {
    pub id: Uuid,
    pub transmission_id: Uuid,
    pub time: DateTime<Utc>,
    pub unit_id: Uuid,
    pub pos: i64,
    pub emergency: bool,
    pub signal_system: String,
    pub tag: String,
    pub length: f64,
}

/// Per-frequency timeline entry, owned by exactly one transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionFreq {
    pub id: Uuid,
    pub transmission_id: Uuid,
    pub time: DateTime<Utc>,
    pub freq: i64,
    pub pos: i64,
    pub len: i64,
    pub error_count: i64,
    pub spike_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub system_id: Uuid,
    pub active: bool,
    pub time: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    /// Referenced, not owned
    pub transmissions: Vec<Uuid>,
    pub agencies: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkGroupAcl {
    pub id: Uuid,
    pub name: String,
    pub users: Vec<Uuid>,
    pub talkgroups: Vec<Uuid>,
    pub default_new_users: bool,
    pub default_new_talkgroups: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAlert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub web_notification: bool,
    pub app_rise_notification: bool,
    /// Comma-separated gateway URLs
    pub app_rise_urls: String,
    pub emergency_only: bool,
    pub title: String,
    pub body: String,
    pub talkgroups: Vec<Uuid>,
    pub units: Vec<Uuid>,
}

impl UserAlert {
    /// Split `app_rise_urls` into trimmed, non-empty entries
    pub fn app_rise_url_list(&self) -> Vec<String> {
        self.app_rise_urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A peer instance that receives replicated transmissions and incidents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemForwarder {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    /// Recorder key registered on the remote instance
    pub recorder_key: Uuid,
    pub remote_url: String,
    pub forward_incidents: bool,
    pub forwarded_systems: Vec<Uuid>,
}

impl SystemForwarder {
    pub fn forwards_system(&self, system_id: Uuid) -> bool {
        self.enabled && self.forwarded_systems.contains(&system_id)
    }
}
