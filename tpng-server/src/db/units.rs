//! Radio unit persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tpng_common::db::Unit;
use tpng_common::Result;
use uuid::Uuid;

use super::guid_column;

fn unit_from_row(row: &SqliteRow) -> Result<Unit> {
    Ok(Unit {
        id: guid_column(row, "guid")?,
        system_id: guid_column(row, "system_id")?,
        decimal_id: row.get("decimal_id"),
        description: row.get("description"),
    })
}

/// Look up a unit by decimal ID inside a system, creating it when unseen
///
/// Runs on the caller's connection so it joins an open transaction.
pub async fn get_or_create_unit(
    conn: &mut SqliteConnection,
    system_id: Uuid,
    decimal_id: i64,
) -> Result<Unit> {
    sqlx::query(
        r#"
        INSERT INTO units (guid, system_id, decimal_id) VALUES (?, ?, ?)
        ON CONFLICT(system_id, decimal_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(system_id.to_string())
    .bind(decimal_id)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query(
        "SELECT guid, system_id, decimal_id, description FROM units WHERE system_id = ? AND decimal_id = ?",
    )
    .bind(system_id.to_string())
    .bind(decimal_id)
    .fetch_one(&mut *conn)
    .await?;

    unit_from_row(&row)
}

pub async fn get_unit(pool: &SqlitePool, unit_id: Uuid) -> Result<Option<Unit>> {
    sqlx::query("SELECT guid, system_id, decimal_id, description FROM units WHERE guid = ?")
        .bind(unit_id.to_string())
        .fetch_optional(pool)
        .await?
        .as_ref()
        .map(unit_from_row)
        .transpose()
}

pub async fn set_description(pool: &SqlitePool, unit_id: Uuid, description: &str) -> Result<()> {
    sqlx::query("UPDATE units SET description = ? WHERE guid = ?")
        .bind(description)
        .bind(unit_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
