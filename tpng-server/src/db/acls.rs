//! System and talkgroup ACL persistence

use sqlx::{Row, SqlitePool};
use tpng_common::db::{SystemAcl, TalkGroupAcl};
use tpng_common::Result;
use uuid::Uuid;

use super::{guid_column, insert_links, linked_ids};

const INSERT_SYSTEM_ACL_USER: &str =
    "INSERT OR IGNORE INTO system_acl_users (acl_id, user_id) VALUES (?, ?)";
const INSERT_TALKGROUP_ACL_USER: &str =
    "INSERT OR IGNORE INTO talkgroup_acl_users (acl_id, user_id) VALUES (?, ?)";
const INSERT_TALKGROUP_ACL_TALKGROUP: &str =
    "INSERT OR IGNORE INTO talkgroup_acl_talkgroups (acl_id, talkgroup_id) VALUES (?, ?)";

pub async fn create_system_acl(
    pool: &SqlitePool,
    name: &str,
    public: bool,
    users: &[Uuid],
) -> Result<SystemAcl> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO system_acls (guid, name, public) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(public)
        .execute(&mut *tx)
        .await?;
    insert_links(&mut *tx, INSERT_SYSTEM_ACL_USER, id, users).await?;

    tx.commit().await?;

    Ok(SystemAcl {
        id,
        name: name.to_string(),
        public,
        users: users.to_vec(),
    })
}

pub async fn add_system_acl_user(pool: &SqlitePool, acl_id: Uuid, user_id: Uuid) -> Result<()> {
    sqlx::query(INSERT_SYSTEM_ACL_USER)
        .bind(acl_id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_system_acl(pool: &SqlitePool, acl_id: Uuid) -> Result<Option<SystemAcl>> {
    let Some(row) = sqlx::query("SELECT guid, name, public FROM system_acls WHERE guid = ?")
        .bind(acl_id.to_string())
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let id = guid_column(&row, "guid")?;
    let users = linked_ids(
        pool,
        "SELECT user_id FROM system_acl_users WHERE acl_id = ? ORDER BY user_id",
        id,
    )
    .await?;

    Ok(Some(SystemAcl {
        id,
        name: row.get("name"),
        public: row.get("public"),
        users,
    }))
}

/// Fields of a new talkgroup ACL
#[derive(Debug, Clone, Default)]
pub struct NewTalkGroupAcl {
    pub name: String,
    pub users: Vec<Uuid>,
    pub talkgroups: Vec<Uuid>,
    pub default_new_users: bool,
    pub default_new_talkgroups: bool,
}

pub async fn create_talkgroup_acl(pool: &SqlitePool, acl: NewTalkGroupAcl) -> Result<TalkGroupAcl> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO talkgroup_acls (guid, name, default_new_users, default_new_talkgroups)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&acl.name)
    .bind(acl.default_new_users)
    .bind(acl.default_new_talkgroups)
    .execute(&mut *tx)
    .await?;
    insert_links(&mut *tx, INSERT_TALKGROUP_ACL_USER, id, &acl.users).await?;
    insert_links(&mut *tx, INSERT_TALKGROUP_ACL_TALKGROUP, id, &acl.talkgroups).await?;

    tx.commit().await?;

    Ok(TalkGroupAcl {
        id,
        name: acl.name,
        users: acl.users,
        talkgroups: acl.talkgroups,
        default_new_users: acl.default_new_users,
        default_new_talkgroups: acl.default_new_talkgroups,
    })
}

pub async fn add_talkgroup_acl_user(pool: &SqlitePool, acl_id: Uuid, user_id: Uuid) -> Result<()> {
    sqlx::query(INSERT_TALKGROUP_ACL_USER)
        .bind(acl_id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn add_talkgroup_acl_talkgroup(
    pool: &SqlitePool,
    acl_id: Uuid,
    talkgroup_id: Uuid,
) -> Result<()> {
    sqlx::query(INSERT_TALKGROUP_ACL_TALKGROUP)
        .bind(acl_id.to_string())
        .bind(talkgroup_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn talkgroup_acl_members(pool: &SqlitePool, acl_id: Uuid) -> Result<(Vec<Uuid>, Vec<Uuid>)> {
    let users = linked_ids(
        pool,
        "SELECT user_id FROM talkgroup_acl_users WHERE acl_id = ? ORDER BY user_id",
        acl_id,
    )
    .await?;
    let talkgroups = linked_ids(
        pool,
        "SELECT talkgroup_id FROM talkgroup_acl_talkgroups WHERE acl_id = ? ORDER BY talkgroup_id",
        acl_id,
    )
    .await?;
    Ok((users, talkgroups))
}
