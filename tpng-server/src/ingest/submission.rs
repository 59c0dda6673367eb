//! Recorder upload format
//!
//! A submission carries the recorder key, the trunk-recorder call metadata
//! (as an object or a JSON string), and the base64 audio payload.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tpng_common::time::{from_unix_seconds, to_millis};
use uuid::Uuid;

use crate::db::transmissions::{NewTransmissionFreq, NewTransmissionUnit, TransmissionDetail};
use crate::error::IngestError;
use tpng_common::db::{TalkGroup, Unit};

/// Default audio extension when the upload carries no file name
pub const DEFAULT_AUDIO_EXTENSION: &str = "m4a";

/// Body of `POST /api/transmissions/ingest`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Recorder upload key
    pub recorder: String,
    pub json: Value,
    pub audio_file: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Submission {
    /// Parse the recorder key; a malformed key can never match a recorder
    pub fn recorder_key(&self) -> Result<Uuid, IngestError> {
        Uuid::parse_str(self.recorder.trim()).map_err(|_| IngestError::UnknownRecorder)
    }

    /// Call metadata, accepting an embedded object or a JSON string
    pub fn metadata(&self) -> Result<CallMetadata, IngestError> {
        let parsed = match &self.json {
            Value::String(text) => serde_json::from_str(text),
            Value::Object(_) => serde_json::from_value(self.json.clone()),
            _ => {
                return Err(IngestError::ValidationError(
                    "json must be an object or a JSON string".to_string(),
                ))
            }
        };
        parsed.map_err(|e| IngestError::ValidationError(format!("call metadata: {}", e)))
    }

    pub fn audio_bytes(&self) -> Result<Vec<u8>, IngestError> {
        let bytes = STANDARD
            .decode(self.audio_file.trim())
            .map_err(|e| IngestError::ValidationError(format!("audioFile is not base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(IngestError::ValidationError("audioFile is empty".to_string()));
        }
        Ok(bytes)
    }

    /// Extension of the uploaded file name, lowercased
    pub fn audio_extension(&self) -> String {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string())
    }
}

/// trunk-recorder call metadata; unknown fields are ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub talkgroup: i64,
    pub start_time: f64,
    #[serde(default)]
    pub stop_time: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    pub emergency: bool,
    #[serde(default, deserialize_with = "flag")]
    pub encrypted: bool,
    #[serde(default)]
    pub freq: f64,
    #[serde(default)]
    pub call_length: f64,
    #[serde(default, rename = "srcList")]
    pub src_list: Vec<SourceEntry>,
    #[serde(default, rename = "freqList")]
    pub freq_list: Vec<FreqEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub src: i64,
    pub time: f64,
    #[serde(default)]
    pub pos: f64,
    #[serde(default, deserialize_with = "flag")]
    pub emergency: bool,
    #[serde(default)]
    pub signal_system: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreqEntry {
    pub freq: f64,
    pub time: f64,
    #[serde(default)]
    pub pos: f64,
    #[serde(default)]
    pub len: f64,
    #[serde(default)]
    pub error_count: f64,
    #[serde(default)]
    pub spike_count: f64,
}

/// Accept `true`/`false`, `0`/`1`, or their string forms
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Value::String(s) => Ok(matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("expected boolean, got {}", other))),
    }
}

fn timestamp(seconds: f64, field: &str) -> Result<chrono::DateTime<chrono::Utc>, IngestError> {
    from_unix_seconds(seconds).map_err(|e| IngestError::ValidationError(format!("{}: {}", field, e)))
}

impl CallMetadata {
    pub fn start(&self) -> Result<chrono::DateTime<chrono::Utc>, IngestError> {
        timestamp(self.start_time, "start_time")
    }

    pub fn end(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>, IngestError> {
        self.stop_time.map(|t| timestamp(t, "stop_time")).transpose()
    }

    /// Unit telemetry rows
    ///
    /// Each entry lasts until the next entry's position; the last one runs
    /// to the end of the call.
    pub fn unit_rows(&self) -> Result<Vec<NewTransmissionUnit>, IngestError> {
        let mut rows = Vec::with_capacity(self.src_list.len());
        for (index, entry) in self.src_list.iter().enumerate() {
            let until = self
                .src_list
                .get(index + 1)
                .map(|next| next.pos)
                .unwrap_or(self.call_length);
            rows.push(NewTransmissionUnit {
                time: timestamp(entry.time, "srcList.time")?,
                unit_decimal_id: entry.src,
                pos: entry.pos as i64,
                emergency: entry.emergency,
                signal_system: entry.signal_system.clone(),
                tag: entry.tag.clone(),
                length: (until - entry.pos).max(0.0),
            });
        }
        Ok(rows)
    }

    pub fn freq_rows(&self) -> Result<Vec<NewTransmissionFreq>, IngestError> {
        self.freq_list
            .iter()
            .map(|entry| {
                Ok(NewTransmissionFreq {
                    time: timestamp(entry.time, "freqList.time")?,
                    freq: entry.freq as i64,
                    pos: entry.pos as i64,
                    len: entry.len as i64,
                    error_count: entry.error_count as i64,
                    spike_count: entry.spike_count as i64,
                })
            })
            .collect()
    }

    /// Rebuild call metadata from a stored transmission, for re-submission
    /// to a peer instance
    pub fn from_stored(detail: &TransmissionDetail, talkgroup: &TalkGroup, units: &[Unit]) -> Self {
        let decimal_ids: HashMap<Uuid, i64> = units.iter().map(|u| (u.id, u.decimal_id)).collect();
        let seconds = |time: chrono::DateTime<chrono::Utc>| to_millis(time) as f64 / 1000.0;
        let transmission = &detail.transmission;

        Self {
            talkgroup: talkgroup.decimal_id,
            start_time: seconds(transmission.start_time),
            stop_time: transmission.end_time.map(seconds),
            emergency: transmission.emergency,
            encrypted: transmission.encrypted,
            freq: transmission.frequency,
            call_length: transmission.length,
            src_list: detail
                .units
                .iter()
                .filter_map(|entry| {
                    decimal_ids.get(&entry.unit_id).map(|src| SourceEntry {
                        src: *src,
                        time: seconds(entry.time),
                        pos: entry.pos as f64,
                        emergency: entry.emergency,
                        signal_system: entry.signal_system.clone(),
                        tag: entry.tag.clone(),
                    })
                })
                .collect(),
            freq_list: detail
                .freqs
                .iter()
                .map(|entry| FreqEntry {
                    freq: entry.freq as f64,
                    time: seconds(entry.time),
                    pos: entry.pos as f64,
                    len: entry.len as f64,
                    error_count: entry.error_count as f64,
                    spike_count: entry.spike_count as f64,
                })
                .collect(),
        }
    }
}
