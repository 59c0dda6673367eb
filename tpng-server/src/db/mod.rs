//! Query layer over the shared schema
//!
//! Every function takes the pool (or a connection inside an open
//! transaction) explicitly. Multi-row writes run in one transaction.

pub mod acls;
pub mod agencies;
pub mod alerts;
pub mod forwarders;
pub mod incidents;
pub mod recorders;
pub mod systems;
pub mod talkgroups;
pub mod transmissions;
pub mod units;
pub mod users;

use sqlx::{Row, Sqlite, SqliteConnection};
use tpng_common::uuid_utils::parse_guid;
use tpng_common::Result;
use uuid::Uuid;

/// Read a TEXT UUID column
pub(crate) fn guid_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.get(column);
    parse_guid(column, &value)
}

/// Read a nullable TEXT UUID column
pub(crate) fn opt_guid_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let value: Option<String> = row.get(column);
    value.map(|v| parse_guid(column, &v)).transpose()
}

/// Fetch the right-hand IDs of a link table for one owner
///
/// `sql` selects a single TEXT column filtered by one bound owner ID.
pub(crate) async fn linked_ids<'c, E>(executor: E, sql: &str, owner: Uuid) -> Result<Vec<Uuid>>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let values: Vec<String> = sqlx::query_scalar(sql)
        .bind(owner.to_string())
        .fetch_all(executor)
        .await?;

    values.iter().map(|v| parse_guid("link", v)).collect()
}

/// Insert `(owner, id)` pairs into a link table
///
/// `sql` is an INSERT with two placeholders, owner first.
pub(crate) async fn insert_links(
    conn: &mut SqliteConnection,
    sql: &str,
    owner: Uuid,
    ids: &[Uuid],
) -> Result<()> {
    for id in ids {
        sqlx::query(sql)
            .bind(owner.to_string())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
