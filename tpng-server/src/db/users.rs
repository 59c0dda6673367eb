//! User profile persistence

use sqlx::{Row, SqlitePool};
use tpng_common::db::UserProfile;
use tpng_common::{Error, Result};
use tracing::info;
use uuid::Uuid;

use super::guid_column;

/// Outcome of a site-admin promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Promoted,
    AlreadyAdmin,
}

/// Create a profile for an external identity
///
/// The new user joins every talkgroup ACL flagged `default_new_users` in the
/// same transaction.
pub async fn create_user(pool: &SqlitePool, user_id: Uuid, site_admin: bool) -> Result<UserProfile> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO user_profiles (guid, site_admin) VALUES (?, ?)")
        .bind(user_id.to_string())
        .bind(site_admin)
        .execute(&mut *tx)
        .await?;

    let enrolled = sqlx::query(
        r#"
        INSERT INTO talkgroup_acl_users (acl_id, user_id)
        SELECT guid, ? FROM talkgroup_acls WHERE default_new_users = 1
        "#,
    )
    .bind(user_id.to_string())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    info!(user_id = %user_id, default_acls = enrolled, "Created user profile");

    Ok(UserProfile {
        id: user_id,
        site_admin,
        description: None,
        site_theme: None,
    })
}

pub async fn get_user(pool: &SqlitePool, user_id: Uuid) -> Result<Option<UserProfile>> {
    let row = sqlx::query(
        "SELECT guid, site_admin, description, site_theme FROM user_profiles WHERE guid = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(UserProfile {
            id: guid_column(&row, "guid")?,
            site_admin: row.get("site_admin"),
            description: row.get("description"),
            site_theme: row.get("site_theme"),
        })
    })
    .transpose()
}

/// Grant the global ACL override to an existing user
pub async fn make_site_admin(pool: &SqlitePool, user_id: Uuid) -> Result<Promotion> {
    let user = get_user(pool, user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", user_id)))?;

    if user.site_admin {
        return Ok(Promotion::AlreadyAdmin);
    }

    sqlx::query("UPDATE user_profiles SET site_admin = 1 WHERE guid = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    Ok(Promotion::Promoted)
}
