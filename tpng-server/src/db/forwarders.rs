//! Peer forwarder configuration

use sqlx::{Row, SqlitePool};
use tpng_common::db::SystemForwarder;
use tpng_common::Result;
use uuid::Uuid;

use super::{guid_column, insert_links, linked_ids};

/// Fields of a new forwarder
#[derive(Debug, Clone)]
pub struct NewForwarder {
    pub name: String,
    pub enabled: bool,
    pub recorder_key: Uuid,
    pub remote_url: String,
    pub forward_incidents: bool,
    pub forwarded_systems: Vec<Uuid>,
}

pub async fn create_forwarder(pool: &SqlitePool, forwarder: NewForwarder) -> Result<SystemForwarder> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO system_forwarders (guid, name, enabled, recorder_key, remote_url, forward_incidents)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&forwarder.name)
    .bind(forwarder.enabled)
    .bind(forwarder.recorder_key.to_string())
    .bind(&forwarder.remote_url)
    .bind(forwarder.forward_incidents)
    .execute(&mut *tx)
    .await?;
    insert_links(
        &mut *tx,
        "INSERT INTO system_forwarder_systems (forwarder_id, system_id) VALUES (?, ?)",
        id,
        &forwarder.forwarded_systems,
    )
    .await?;

    tx.commit().await?;

    Ok(SystemForwarder {
        id,
        name: forwarder.name,
        enabled: forwarder.enabled,
        recorder_key: forwarder.recorder_key,
        remote_url: forwarder.remote_url,
        forward_incidents: forwarder.forward_incidents,
        forwarded_systems: forwarder.forwarded_systems,
    })
}

/// Enabled forwarders with their forwarded systems, ordered by name
pub async fn list_enabled(pool: &SqlitePool) -> Result<Vec<SystemForwarder>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, name, enabled, recorder_key, remote_url, forward_incidents
        FROM system_forwarders WHERE enabled = 1 ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut forwarders = Vec::with_capacity(rows.len());
    for row in rows {
        let id = guid_column(&row, "guid")?;
        let forwarded_systems = linked_ids(
            pool,
            "SELECT system_id FROM system_forwarder_systems WHERE forwarder_id = ?",
            id,
        )
        .await?;

        forwarders.push(SystemForwarder {
            id,
            name: row.get("name"),
            enabled: row.get("enabled"),
            recorder_key: guid_column(&row, "recorder_key")?,
            remote_url: row.get("remote_url"),
            forward_incidents: row.get("forward_incidents"),
            forwarded_systems,
        });
    }

    Ok(forwarders)
}
