//! Radio system persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tpng_common::db::System;
use tpng_common::Result;
use uuid::Uuid;

use super::guid_column;

const SYSTEM_COLUMNS: &str = "guid, name, system_acl_id, enable_talkgroup_acls, \
     prune_transmissions, prune_transmissions_after_days";

/// Fields of a new system
#[derive(Debug, Clone)]
pub struct NewSystem {
    pub name: String,
    pub system_acl_id: Uuid,
    pub enable_talkgroup_acls: bool,
    pub prune_transmissions: bool,
    pub prune_transmissions_after_days: i64,
}

impl NewSystem {
    pub fn new(name: &str, system_acl_id: Uuid) -> Self {
        Self {
            name: name.to_string(),
            system_acl_id,
            enable_talkgroup_acls: false,
            prune_transmissions: false,
            prune_transmissions_after_days: 365,
        }
    }
}

fn system_from_row(row: &SqliteRow) -> Result<System> {
    Ok(System {
        id: guid_column(row, "guid")?,
        name: row.get("name"),
        system_acl_id: guid_column(row, "system_acl_id")?,
        enable_talkgroup_acls: row.get("enable_talkgroup_acls"),
        prune_transmissions: row.get("prune_transmissions"),
        prune_transmissions_after_days: row.get("prune_transmissions_after_days"),
    })
}

pub async fn create_system(pool: &SqlitePool, system: NewSystem) -> Result<System> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO systems (
            guid, name, system_acl_id, enable_talkgroup_acls,
            prune_transmissions, prune_transmissions_after_days
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&system.name)
    .bind(system.system_acl_id.to_string())
    .bind(system.enable_talkgroup_acls)
    .bind(system.prune_transmissions)
    .bind(system.prune_transmissions_after_days)
    .execute(pool)
    .await?;

    Ok(System {
        id,
        name: system.name,
        system_acl_id: system.system_acl_id,
        enable_talkgroup_acls: system.enable_talkgroup_acls,
        prune_transmissions: system.prune_transmissions,
        prune_transmissions_after_days: system.prune_transmissions_after_days,
    })
}

pub async fn get_system(pool: &SqlitePool, system_id: Uuid) -> Result<Option<System>> {
    let sql = format!("SELECT {} FROM systems WHERE guid = ?", SYSTEM_COLUMNS);
    sqlx::query(&sql)
        .bind(system_id.to_string())
        .fetch_optional(pool)
        .await?
        .as_ref()
        .map(system_from_row)
        .transpose()
}

/// Every system, ordered by name
pub async fn list_systems(pool: &SqlitePool) -> Result<Vec<System>> {
    let sql = format!("SELECT {} FROM systems ORDER BY name", SYSTEM_COLUMNS);
    sqlx::query(&sql)
        .fetch_all(pool)
        .await?
        .iter()
        .map(system_from_row)
        .collect()
}

/// Systems whose ACL is public or lists the user, ordered by name
pub async fn list_systems_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<System>> {
    let sql = format!(
        r#"
        SELECT {} FROM systems s
        WHERE s.system_acl_id IN (
            SELECT a.guid FROM system_acls a
            WHERE a.public = 1
               OR EXISTS (
                   SELECT 1 FROM system_acl_users u
                   WHERE u.acl_id = a.guid AND u.user_id = ?
               )
        )
        ORDER BY s.name
        "#,
        SYSTEM_COLUMNS
    );
    sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(system_from_row)
        .collect()
}

/// Systems opted in to retention pruning
pub async fn list_pruned_systems(pool: &SqlitePool) -> Result<Vec<System>> {
    let sql = format!(
        "SELECT {} FROM systems WHERE prune_transmissions = 1 ORDER BY name",
        SYSTEM_COLUMNS
    );
    sqlx::query(&sql)
        .fetch_all(pool)
        .await?
        .iter()
        .map(system_from_row)
        .collect()
}
