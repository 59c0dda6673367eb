//! Incident persistence
//!
//! Incidents reference transmissions and agencies through link tables;
//! deleting either side only removes the link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tpng_common::db::Incident;
use tpng_common::time::{from_millis, to_millis};
use tpng_common::Result;
use uuid::Uuid;

use super::{guid_column, insert_links, linked_ids};

const INSERT_INCIDENT_TRANSMISSION: &str =
    "INSERT OR IGNORE INTO incident_transmissions (incident_id, transmission_id) VALUES (?, ?)";
const INSERT_INCIDENT_AGENCY: &str =
    "INSERT OR IGNORE INTO incident_agencies (incident_id, agency_id) VALUES (?, ?)";

/// Mutable incident fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentFields {
    pub system_id: Uuid,
    #[serde(default = "default_active")]
    pub active: bool,
    pub time: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transmissions: Vec<Uuid>,
    #[serde(default)]
    pub agencies: Vec<Uuid>,
}

fn default_active() -> bool {
    true
}

impl IncidentFields {
    /// Sort and deduplicate the link lists so they match what is stored
    fn normalize_links(&mut self) {
        for ids in [&mut self.transmissions, &mut self.agencies] {
            ids.sort();
            ids.dedup();
        }
    }

    fn into_incident(self, id: Uuid) -> Incident {
        Incident {
            id,
            system_id: self.system_id,
            active: self.active,
            time: self.time,
            name: self.name,
            description: self.description,
            transmissions: self.transmissions,
            agencies: self.agencies,
        }
    }
}

/// Result of storing an incident received from a peer
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    Created(Incident),
    Updated(Incident),
    /// The ID already belongs to an incident on another system; nothing was written
    ForeignSystem { system_id: Uuid },
}

async fn replace_links(conn: &mut SqliteConnection, id: Uuid, fields: &IncidentFields) -> Result<()> {
    for sql in [
        "DELETE FROM incident_transmissions WHERE incident_id = ?",
        "DELETE FROM incident_agencies WHERE incident_id = ?",
    ] {
        sqlx::query(sql)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }
    insert_links(&mut *conn, INSERT_INCIDENT_TRANSMISSION, id, &fields.transmissions).await?;
    insert_links(&mut *conn, INSERT_INCIDENT_AGENCY, id, &fields.agencies).await?;
    Ok(())
}

async fn stored_system(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Uuid>> {
    let system_id: Option<String> = sqlx::query_scalar("SELECT system_id FROM incidents WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    system_id
        .map(|s| tpng_common::uuid_utils::parse_guid("system_id", &s))
        .transpose()
}

async fn insert_incident(conn: &mut SqliteConnection, id: Uuid, fields: &IncidentFields) -> Result<()> {
    sqlx::query(
        "INSERT INTO incidents (guid, system_id, active, time, name, description) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(fields.system_id.to_string())
    .bind(fields.active)
    .bind(to_millis(fields.time))
    .bind(&fields.name)
    .bind(&fields.description)
    .execute(&mut *conn)
    .await?;
    replace_links(conn, id, fields).await
}

async fn overwrite_incident(conn: &mut SqliteConnection, id: Uuid, fields: &IncidentFields) -> Result<()> {
    sqlx::query("UPDATE incidents SET active = ?, time = ?, name = ?, description = ? WHERE guid = ?")
        .bind(fields.active)
        .bind(to_millis(fields.time))
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    replace_links(conn, id, fields).await
}

/// Create an incident with the given ID
pub async fn create_incident(pool: &SqlitePool, id: Uuid, mut fields: IncidentFields) -> Result<Incident> {
    fields.normalize_links();
    let mut tx = pool.begin().await?;
    insert_incident(&mut *tx, id, &fields).await?;
    tx.commit().await?;
    Ok(fields.into_incident(id))
}

/// Overwrite an existing incident; `None` when it does not exist
///
/// The incident stays on its original system.
pub async fn update_incident(
    pool: &SqlitePool,
    id: Uuid,
    mut fields: IncidentFields,
) -> Result<Option<Incident>> {
    fields.normalize_links();
    let mut tx = pool.begin().await?;

    let Some(system_id) = stored_system(&mut *tx, id).await? else {
        return Ok(None);
    };
    fields.system_id = system_id;
    overwrite_incident(&mut *tx, id, &fields).await?;

    tx.commit().await?;
    Ok(Some(fields.into_incident(id)))
}

/// Update the incident when it exists on `fields.system_id`, otherwise
/// create it. An ID already used on another system is left untouched.
pub async fn upsert_incident(pool: &SqlitePool, id: Uuid, mut fields: IncidentFields) -> Result<Upsert> {
    fields.normalize_links();
    let mut tx = pool.begin().await?;

    let outcome = match stored_system(&mut *tx, id).await? {
        Some(system_id) if system_id != fields.system_id => {
            return Ok(Upsert::ForeignSystem { system_id });
        }
        Some(_) => {
            overwrite_incident(&mut *tx, id, &fields).await?;
            Upsert::Updated(fields.into_incident(id))
        }
        None => {
            insert_incident(&mut *tx, id, &fields).await?;
            Upsert::Created(fields.into_incident(id))
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

pub async fn get_incident(pool: &SqlitePool, id: Uuid) -> Result<Option<Incident>> {
    let Some(row) = sqlx::query(
        "SELECT guid, system_id, active, time, name, description FROM incidents WHERE guid = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let transmissions = linked_ids(
        pool,
        "SELECT transmission_id FROM incident_transmissions WHERE incident_id = ? ORDER BY transmission_id",
        id,
    )
    .await?;
    let agencies = linked_ids(
        pool,
        "SELECT agency_id FROM incident_agencies WHERE incident_id = ? ORDER BY agency_id",
        id,
    )
    .await?;

    Ok(Some(Incident {
        id: guid_column(&row, "guid")?,
        system_id: guid_column(&row, "system_id")?,
        active: row.get("active"),
        time: from_millis(row.get("time"))?,
        name: row.get("name"),
        description: row.get("description"),
        transmissions,
        agencies,
    }))
}

/// Keep only the transmission IDs stored on `system_id`, preserving order
pub async fn retain_system_transmissions(
    pool: &SqlitePool,
    system_id: Uuid,
    ids: &[Uuid],
) -> Result<Vec<Uuid>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT guid FROM transmissions WHERE system_id = ");
    query.push_bind(system_id.to_string());
    query.push(" AND guid IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let found: Vec<String> = query.build_query_scalar().fetch_all(pool).await?;
    Ok(ids
        .iter()
        .filter(|id| found.contains(&id.to_string()))
        .copied()
        .collect())
}
