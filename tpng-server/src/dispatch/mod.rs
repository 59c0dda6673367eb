//! Notification dispatcher
//!
//! Pure functions from a persisted transmission or incident to the jobs
//! that announce it: one live broadcast, one gateway notification per
//! matching alert subscription, and one forward per peer. No I/O happens
//! here; the task runner executes the jobs.

pub mod template;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tpng_common::db::{Incident, SystemForwarder, TalkGroup, Unit, UserAlert};
use tpng_common::events::{Room, NEW_TRANSMISSION_EVENT};
use uuid::Uuid;

use crate::db::transmissions::TransmissionDetail;
use crate::ingest::CallMetadata;

/// What an alert subscription matched on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    Talkgroup,
    Unit,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Talkgroup => "Talkgroup",
            AlertKind::Unit => "Unit",
        }
    }
}

/// A persisted transmission with the records the dispatcher reads
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionView {
    pub detail: TransmissionDetail,
    pub talkgroup: TalkGroup,
    /// Distinct participating units
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastJob {
    pub room: Room,
    pub event: String,
    pub payload: Value,
}

/// One alert match, rendered at send time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayNotifyJob {
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub transmission_id: Uuid,
    pub kind: AlertKind,
    pub value: String,
    pub emergency: bool,
    pub web_notification: bool,
    pub app_rise_notification: bool,
    pub urls: Vec<String>,
    pub title_template: String,
    pub body_template: String,
}

impl GatewayNotifyJob {
    pub fn title(&self) -> String {
        let template = template::or_default(&self.title_template, template::DEFAULT_TITLE);
        template::render(template, self.kind, &self.value, self.emergency, self.transmission_id)
    }

    pub fn body(&self) -> String {
        let template = template::or_default(&self.body_template, template::DEFAULT_BODY);
        template::render(template, self.kind, &self.value, self.emergency, self.transmission_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardPayload {
    /// Re-submitted as a recorder upload; audio is read at send time
    Transmission {
        transmission_id: Uuid,
        audio_file: String,
        call: CallMetadata,
    },
    Incident { incident: Incident, is_new: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardJob {
    pub forwarder_id: Uuid,
    pub forwarder_name: String,
    pub remote_url: String,
    pub recorder_key: Uuid,
    pub payload: ForwardPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DispatchJob {
    Broadcast(BroadcastJob),
    GatewayNotify(GatewayNotifyJob),
    Forward(ForwardJob),
}

impl DispatchJob {
    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            DispatchJob::Broadcast(job) => format!("broadcast {} to {}", job.event, job.room),
            DispatchJob::GatewayNotify(job) => {
                format!("{} alert {} for user {}", job.kind.as_str(), job.alert_id, job.user_id)
            }
            DispatchJob::Forward(job) => format!("forward to {}", job.forwarder_name),
        }
    }
}

/// Jobs announcing a newly persisted transmission
///
/// Always exactly one broadcast to the transmission's talkgroup room, then
/// alert matches in alert order, then forwards in forwarder order.
pub fn on_transmission_persisted(
    view: &TransmissionView,
    alerts: &[UserAlert],
    forwarders: &[SystemForwarder],
) -> Vec<DispatchJob> {
    let transmission = &view.detail.transmission;
    let mut jobs = vec![DispatchJob::Broadcast(BroadcastJob {
        room: Room::for_talkgroup(transmission.system_id, transmission.talkgroup_id),
        event: NEW_TRANSMISSION_EVENT.to_string(),
        payload: broadcast_payload(view),
    })];

    for alert in alerts {
        if alert.emergency_only && !transmission.emergency {
            continue;
        }

        if alert.talkgroups.contains(&transmission.talkgroup_id) {
            jobs.push(DispatchJob::GatewayNotify(notify_job(
                alert,
                view,
                AlertKind::Talkgroup,
                view.talkgroup.alpha_tag.clone(),
            )));
        }

        let matched: Vec<String> = view
            .units
            .iter()
            .filter(|unit| alert.units.contains(&unit.id))
            .map(Unit::label)
            .collect();
        if !matched.is_empty() {
            jobs.push(DispatchJob::GatewayNotify(notify_job(
                alert,
                view,
                AlertKind::Unit,
                matched.join("; "),
            )));
        }
    }

    let call = CallMetadata::from_stored(&view.detail, &view.talkgroup, &view.units);
    for forwarder in forwarders {
        if !forwarder.forwards_system(transmission.system_id) {
            continue;
        }
        jobs.push(DispatchJob::Forward(ForwardJob {
            forwarder_id: forwarder.id,
            forwarder_name: forwarder.name.clone(),
            remote_url: forwarder.remote_url.clone(),
            recorder_key: forwarder.recorder_key,
            payload: ForwardPayload::Transmission {
                transmission_id: transmission.id,
                audio_file: transmission.audio_file.clone(),
                call: call.clone(),
            },
        }));
    }

    jobs
}

/// Jobs replicating a created or updated incident to peers
pub fn on_incident_persisted(
    incident: &Incident,
    forwarders: &[SystemForwarder],
    is_new: bool,
) -> Vec<DispatchJob> {
    forwarders
        .iter()
        .filter(|f| f.forward_incidents && f.forwards_system(incident.system_id))
        .map(|forwarder| {
            DispatchJob::Forward(ForwardJob {
                forwarder_id: forwarder.id,
                forwarder_name: forwarder.name.clone(),
                remote_url: forwarder.remote_url.clone(),
                recorder_key: forwarder.recorder_key,
                payload: ForwardPayload::Incident {
                    incident: incident.clone(),
                    is_new,
                },
            })
        })
        .collect()
}

fn notify_job(alert: &UserAlert, view: &TransmissionView, kind: AlertKind, value: String) -> GatewayNotifyJob {
    GatewayNotifyJob {
        alert_id: alert.id,
        user_id: alert.user_id,
        transmission_id: view.detail.transmission.id,
        kind,
        value,
        emergency: view.detail.transmission.emergency,
        web_notification: alert.web_notification,
        app_rise_notification: alert.app_rise_notification,
        urls: alert.app_rise_url_list(),
        title_template: alert.title.clone(),
        body_template: alert.body.clone(),
    }
}

fn broadcast_payload(view: &TransmissionView) -> Value {
    json!({
        "transmission": view.detail,
        "talkgroup": {
            "id": view.talkgroup.id,
            "decimal_id": view.talkgroup.decimal_id,
            "alpha_tag": view.talkgroup.alpha_tag,
        },
        "units": view.units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tpng_common::db::Transmission;

    fn view(emergency: bool) -> TransmissionView {
        let system_id = Uuid::new_v4();
        let talkgroup = TalkGroup {
            id: Uuid::new_v4(),
            system_id,
            decimal_id: 100,
            alpha_tag: "FIRE1".to_string(),
            description: None,
            encrypted: false,
        };
        let units = vec![
            Unit {
                id: Uuid::new_v4(),
                system_id,
                decimal_id: 4001,
                description: Some("Engine 5".to_string()),
            },
            Unit {
                id: Uuid::new_v4(),
                system_id,
                decimal_id: 4002,
                description: None,
            },
        ];
        TransmissionView {
            detail: TransmissionDetail {
                transmission: Transmission {
                    id: Uuid::new_v4(),
                    system_id,
                    recorder_id: Uuid::new_v4(),
                    talkgroup_id: talkgroup.id,
                    start_time: Utc::now(),
                    end_time: None,
                    audio_file: "a.m4a".to_string(),
                    encrypted: false,
                    emergency,
                    locked: false,
                    frequency: 851012500.0,
                    length: 4.0,
                },
                units: vec![],
                freqs: vec![],
            },
            talkgroup,
            units,
        }
    }

    fn alert(talkgroups: Vec<Uuid>, units: Vec<Uuid>, emergency_only: bool) -> UserAlert {
        UserAlert {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "alert".to_string(),
            description: None,
            web_notification: true,
            app_rise_notification: true,
            app_rise_urls: "json://hook".to_string(),
            emergency_only,
            title: String::new(),
            body: String::new(),
            talkgroups,
            units,
        }
    }

    fn forwarder(systems: Vec<Uuid>, enabled: bool, forward_incidents: bool) -> SystemForwarder {
        SystemForwarder {
            id: Uuid::new_v4(),
            name: "peer".to_string(),
            enabled,
            recorder_key: Uuid::new_v4(),
            remote_url: "http://peer".to_string(),
            forward_incidents,
            forwarded_systems: systems,
        }
    }

    fn notifications(jobs: &[DispatchJob]) -> Vec<&GatewayNotifyJob> {
        jobs.iter()
            .filter_map(|job| match job {
                DispatchJob::GatewayNotify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_exactly_one_broadcast_to_talkgroup_room() {
        let view = view(false);
        let jobs = on_transmission_persisted(&view, &[], &[]);
        assert_eq!(jobs.len(), 1);
        let DispatchJob::Broadcast(job) = &jobs[0] else {
            panic!("expected broadcast");
        };
        let tx = &view.detail.transmission;
        assert_eq!(job.room, Room::for_talkgroup(tx.system_id, tx.talkgroup_id));
        assert_eq!(job.event, NEW_TRANSMISSION_EVENT);
        assert_eq!(job.payload["talkgroup"]["alpha_tag"], "FIRE1");
    }

    #[test]
    fn test_talkgroup_alert_renders_alpha_tag() {
        let view = view(false);
        let alerts = [alert(vec![view.talkgroup.id], vec![], false)];
        let jobs = on_transmission_persisted(&view, &alerts, &[]);
        let notes = notifications(&jobs);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, AlertKind::Talkgroup);
        assert_eq!(notes[0].title(), "Talkgroup alert: FIRE1");
        assert_eq!(
            notes[0].body(),
            format!("Transmission {}", view.detail.transmission.id)
        );
        assert_eq!(notes[0].urls, vec!["json://hook"]);
    }

    #[test]
    fn test_unit_alert_joins_labels() {
        let view = view(false);
        let unit_ids = view.units.iter().map(|u| u.id).collect();
        let alerts = [alert(vec![view.talkgroup.id], unit_ids, false)];
        let jobs = on_transmission_persisted(&view, &alerts, &[]);
        let notes = notifications(&jobs);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].kind, AlertKind::Unit);
        assert_eq!(notes[1].value, "Engine 5; 4002");
    }

    #[test]
    fn test_emergency_only_gating() {
        let routine = view(false);
        let alerts = [alert(vec![routine.talkgroup.id], vec![], true)];
        assert!(notifications(&on_transmission_persisted(&routine, &alerts, &[])).is_empty());

        let emergency = view(true);
        let alerts = [alert(vec![emergency.talkgroup.id], vec![], true)];
        let jobs = on_transmission_persisted(&emergency, &alerts, &[]);
        assert_eq!(notifications(&jobs).len(), 1);
        assert!(notifications(&jobs)[0].emergency);
    }

    #[test]
    fn test_unrelated_alert_produces_nothing() {
        let view = view(false);
        let alerts = [alert(vec![Uuid::new_v4()], vec![Uuid::new_v4()], false)];
        assert_eq!(on_transmission_persisted(&view, &alerts, &[]).len(), 1);
    }

    #[test]
    fn test_forward_only_for_enabled_matching_forwarders() {
        let view = view(false);
        let system_id = view.detail.transmission.system_id;
        let forwarders = [
            forwarder(vec![system_id], true, false),
            forwarder(vec![system_id], false, false),
            forwarder(vec![Uuid::new_v4()], true, false),
        ];
        let jobs = on_transmission_persisted(&view, &[], &forwarders);
        let forwards: Vec<_> = jobs
            .iter()
            .filter_map(|j| match j {
                DispatchJob::Forward(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].forwarder_id, forwarders[0].id);
        let ForwardPayload::Transmission { call, .. } = &forwards[0].payload else {
            panic!("expected transmission payload");
        };
        assert_eq!(call.talkgroup, 100);
    }

    #[test]
    fn test_incident_forwarding_requires_forward_incidents() {
        let system_id = Uuid::new_v4();
        let incident = Incident {
            id: Uuid::new_v4(),
            system_id,
            active: true,
            time: Utc::now(),
            name: "Structure fire".to_string(),
            description: None,
            transmissions: vec![],
            agencies: vec![],
        };
        let forwarders = [
            forwarder(vec![system_id], true, true),
            forwarder(vec![system_id], true, false),
            forwarder(vec![system_id], false, true),
        ];

        let jobs = on_incident_persisted(&incident, &forwarders, true);
        assert_eq!(jobs.len(), 1);
        let DispatchJob::Forward(job) = &jobs[0] else {
            panic!("expected forward");
        };
        assert_eq!(
            job.payload,
            ForwardPayload::Incident {
                incident: incident.clone(),
                is_new: true
            }
        );
    }
}
