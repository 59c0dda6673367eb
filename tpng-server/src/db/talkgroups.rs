//! Talkgroup persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tpng_common::db::TalkGroup;
use tpng_common::Result;
use tracing::debug;
use uuid::Uuid;

use super::guid_column;

const TALKGROUP_COLUMNS: &str = "t.guid, t.system_id, t.decimal_id, t.alpha_tag, t.description, t.encrypted";

/// Fields of a new talkgroup
#[derive(Debug, Clone)]
pub struct NewTalkGroup {
    pub system_id: Uuid,
    pub decimal_id: i64,
    pub alpha_tag: String,
    pub description: Option<String>,
    pub encrypted: bool,
}

impl NewTalkGroup {
    pub fn new(system_id: Uuid, decimal_id: i64, alpha_tag: &str) -> Self {
        Self {
            system_id,
            decimal_id,
            alpha_tag: alpha_tag.to_string(),
            description: None,
            encrypted: false,
        }
    }
}

fn talkgroup_from_row(row: &SqliteRow) -> Result<TalkGroup> {
    Ok(TalkGroup {
        id: guid_column(row, "guid")?,
        system_id: guid_column(row, "system_id")?,
        decimal_id: row.get("decimal_id"),
        alpha_tag: row.get("alpha_tag"),
        description: row.get("description"),
        encrypted: row.get("encrypted"),
    })
}

/// Create a talkgroup
///
/// The talkgroup joins every talkgroup ACL flagged `default_new_talkgroups`
/// in the same transaction.
pub async fn create_talkgroup(pool: &SqlitePool, talkgroup: NewTalkGroup) -> Result<TalkGroup> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO talkgroups (guid, system_id, decimal_id, alpha_tag, description, encrypted)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(talkgroup.system_id.to_string())
    .bind(talkgroup.decimal_id)
    .bind(&talkgroup.alpha_tag)
    .bind(&talkgroup.description)
    .bind(talkgroup.encrypted)
    .execute(&mut *tx)
    .await?;

    let enrolled = sqlx::query(
        r#"
        INSERT INTO talkgroup_acl_talkgroups (acl_id, talkgroup_id)
        SELECT guid, ? FROM talkgroup_acls WHERE default_new_talkgroups = 1
        "#,
    )
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    debug!(talkgroup_id = %id, decimal_id = talkgroup.decimal_id, default_acls = enrolled, "Created talkgroup");

    Ok(TalkGroup {
        id,
        system_id: talkgroup.system_id,
        decimal_id: talkgroup.decimal_id,
        alpha_tag: talkgroup.alpha_tag,
        description: talkgroup.description,
        encrypted: talkgroup.encrypted,
    })
}

pub async fn get_talkgroup(pool: &SqlitePool, talkgroup_id: Uuid) -> Result<Option<TalkGroup>> {
    let sql = format!("SELECT {} FROM talkgroups t WHERE t.guid = ?", TALKGROUP_COLUMNS);
    sqlx::query(&sql)
        .bind(talkgroup_id.to_string())
        .fetch_optional(pool)
        .await?
        .as_ref()
        .map(talkgroup_from_row)
        .transpose()
}

/// Resolve a radio decimal ID inside one system
pub async fn find_by_decimal_id(
    pool: &SqlitePool,
    system_id: Uuid,
    decimal_id: i64,
) -> Result<Option<TalkGroup>> {
    let sql = format!(
        "SELECT {} FROM talkgroups t WHERE t.system_id = ? AND t.decimal_id = ?",
        TALKGROUP_COLUMNS
    );
    sqlx::query(&sql)
        .bind(system_id.to_string())
        .bind(decimal_id)
        .fetch_optional(pool)
        .await?
        .as_ref()
        .map(talkgroup_from_row)
        .transpose()
}

/// Every talkgroup of a system, ordered by decimal ID
pub async fn list_for_system(pool: &SqlitePool, system_id: Uuid) -> Result<Vec<TalkGroup>> {
    let sql = format!(
        "SELECT {} FROM talkgroups t WHERE t.system_id = ? ORDER BY t.decimal_id",
        TALKGROUP_COLUMNS
    );
    sqlx::query(&sql)
        .bind(system_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(talkgroup_from_row)
        .collect()
}

/// Talkgroups of a system granted to a user by any talkgroup ACL listing
/// them, deduplicated and ordered by decimal ID
pub async fn list_for_user_acls(
    pool: &SqlitePool,
    system_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<TalkGroup>> {
    let sql = format!(
        r#"
        SELECT {} FROM talkgroups t
        WHERE t.system_id = ?
          AND t.guid IN (
              SELECT at.talkgroup_id FROM talkgroup_acl_talkgroups at
              JOIN talkgroup_acl_users au ON au.acl_id = at.acl_id
              WHERE au.user_id = ?
          )
        ORDER BY t.decimal_id
        "#,
        TALKGROUP_COLUMNS
    );
    sqlx::query(&sql)
        .bind(system_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?
        .iter()
        .map(talkgroup_from_row)
        .collect()
}
