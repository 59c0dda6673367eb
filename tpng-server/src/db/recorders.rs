//! Recorder persistence and key lookup

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tpng_common::db::SystemRecorder;
use tpng_common::Result;
use uuid::Uuid;

use super::{guid_column, insert_links, linked_ids, opt_guid_column};

/// Fields of a new recorder
#[derive(Debug, Clone)]
pub struct NewRecorder {
    pub system_id: Uuid,
    pub name: String,
    pub site_id: Option<String>,
    pub enabled: bool,
    pub user_id: Option<Uuid>,
    pub talkgroups_allowed: Vec<Uuid>,
    pub talkgroups_denied: Vec<Uuid>,
}

impl NewRecorder {
    pub fn new(system_id: Uuid, name: &str) -> Self {
        Self {
            system_id,
            name: name.to_string(),
            site_id: None,
            enabled: true,
            user_id: None,
            talkgroups_allowed: Vec::new(),
            talkgroups_denied: Vec::new(),
        }
    }
}

/// Create a recorder with a freshly generated upload key
pub async fn create_recorder(pool: &SqlitePool, recorder: NewRecorder) -> Result<SystemRecorder> {
    let id = Uuid::new_v4();
    let key = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO system_recorders (
            guid, system_id, name, site_id, enabled, user_id, forwarder_webhook_uuid
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(recorder.system_id.to_string())
    .bind(&recorder.name)
    .bind(&recorder.site_id)
    .bind(recorder.enabled)
    .bind(recorder.user_id.map(|u| u.to_string()))
    .bind(key.to_string())
    .execute(&mut *tx)
    .await?;
    insert_links(
        &mut *tx,
        "INSERT INTO recorder_talkgroups_allowed (recorder_id, talkgroup_id) VALUES (?, ?)",
        id,
        &recorder.talkgroups_allowed,
    )
    .await?;
    insert_links(
        &mut *tx,
        "INSERT INTO recorder_talkgroups_denied (recorder_id, talkgroup_id) VALUES (?, ?)",
        id,
        &recorder.talkgroups_denied,
    )
    .await?;

    tx.commit().await?;

    Ok(SystemRecorder {
        id,
        system_id: recorder.system_id,
        name: recorder.name,
        site_id: recorder.site_id,
        enabled: recorder.enabled,
        user_id: recorder.user_id,
        forwarder_webhook_uuid: key,
        talkgroups_allowed: recorder.talkgroups_allowed,
        talkgroups_denied: recorder.talkgroups_denied,
    })
}

async fn recorder_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<SystemRecorder> {
    let id = guid_column(row, "guid")?;
    let talkgroups_allowed = linked_ids(
        pool,
        "SELECT talkgroup_id FROM recorder_talkgroups_allowed WHERE recorder_id = ?",
        id,
    )
    .await?;
    let talkgroups_denied = linked_ids(
        pool,
        "SELECT talkgroup_id FROM recorder_talkgroups_denied WHERE recorder_id = ?",
        id,
    )
    .await?;

    Ok(SystemRecorder {
        id,
        system_id: guid_column(row, "system_id")?,
        name: row.get("name"),
        site_id: row.get("site_id"),
        enabled: row.get("enabled"),
        user_id: opt_guid_column(row, "user_id")?,
        forwarder_webhook_uuid: guid_column(row, "forwarder_webhook_uuid")?,
        talkgroups_allowed,
        talkgroups_denied,
    })
}

/// Resolve the recorder presenting an upload key
pub async fn find_by_key(pool: &SqlitePool, key: Uuid) -> Result<Option<SystemRecorder>> {
    let row = sqlx::query(
        r#"
        SELECT guid, system_id, name, site_id, enabled, user_id, forwarder_webhook_uuid
        FROM system_recorders WHERE forwarder_webhook_uuid = ?
        "#,
    )
    .bind(key.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(recorder_from_row(pool, &row).await?)),
        None => Ok(None),
    }
}

pub async fn set_enabled(pool: &SqlitePool, recorder_id: Uuid, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE system_recorders SET enabled = ? WHERE guid = ?")
        .bind(enabled)
        .bind(recorder_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
