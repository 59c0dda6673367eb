//! Agency reference data
//!
//! Agencies are managed outside this service; the core only links them.

use sqlx::SqlitePool;
use tpng_common::Result;
use uuid::Uuid;

pub async fn create_agency(pool: &SqlitePool, name: &str, description: Option<&str>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO agencies (guid, name, description) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Keep only the agency IDs present in this instance, preserving order
pub async fn retain_known(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Uuid>> {
    let mut known = Vec::with_capacity(ids.len());
    for id in ids {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agencies WHERE guid = ?")
            .bind(id.to_string())
            .fetch_one(pool)
            .await?;
        if exists > 0 {
            known.push(*id);
        }
    }
    Ok(known)
}
