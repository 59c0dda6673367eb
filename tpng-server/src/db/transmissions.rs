//! Transmission persistence
//!
//! A transmission owns its unit and frequency telemetry rows. Inserts and
//! deletes always touch the parent and its children in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpng_common::db::{Transmission, TransmissionFreq, TransmissionUnit, Unit};
use tpng_common::time::{from_millis, to_millis};
use tpng_common::Result;
use uuid::Uuid;

use super::guid_column;
use super::units::get_or_create_unit;

const TRANSMISSION_COLUMNS: &str = "guid, system_id, recorder_id, talkgroup_id, start_time, \
     end_time, audio_file, encrypted, emergency, locked, frequency, length";

/// Unit telemetry entry before the unit is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransmissionUnit {
    pub time: DateTime<Utc>,
    pub unit_decimal_id: i64,
    pub pos: i64,
    pub emergency: bool,
    pub signal_system: String,
    pub tag: String,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransmissionFreq {
    pub time: DateTime<Utc>,
    pub freq: i64,
    pub pos: i64,
    pub len: i64,
    pub error_count: i64,
    pub spike_count: i64,
}

/// A transmission ready to persist
#[derive(Debug, Clone)]
pub struct NewTransmission {
    pub system_id: Uuid,
    pub recorder_id: Uuid,
    pub talkgroup_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub audio_file: String,
    pub encrypted: bool,
    pub emergency: bool,
    pub frequency: f64,
    pub length: f64,
    pub units: Vec<NewTransmissionUnit>,
    pub freqs: Vec<NewTransmissionFreq>,
}

/// A transmission with its owned telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionDetail {
    #[serde(flatten)]
    pub transmission: Transmission,
    pub units: Vec<TransmissionUnit>,
    pub freqs: Vec<TransmissionFreq>,
}

/// Selected for pruning
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredTransmission {
    pub id: Uuid,
    pub audio_file: String,
}

fn transmission_from_row(row: &SqliteRow) -> Result<Transmission> {
    let end_time: Option<i64> = row.get("end_time");
    Ok(Transmission {
        id: guid_column(row, "guid")?,
        system_id: guid_column(row, "system_id")?,
        recorder_id: guid_column(row, "recorder_id")?,
        talkgroup_id: guid_column(row, "talkgroup_id")?,
        start_time: from_millis(row.get("start_time"))?,
        end_time: end_time.map(from_millis).transpose()?,
        audio_file: row.get("audio_file"),
        encrypted: row.get("encrypted"),
        emergency: row.get("emergency"),
        locked: row.get("locked"),
        frequency: row.get("frequency"),
        length: row.get("length"),
    })
}

/// Persist a transmission and its telemetry atomically
///
/// Units are resolved (or created) by decimal ID within the transmission's
/// system. Returns the stored detail and the distinct participating units
/// in first-seen order.
pub async fn insert_transmission(
    pool: &SqlitePool,
    new: NewTransmission,
) -> Result<(TransmissionDetail, Vec<Unit>)> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO transmissions (
            guid, system_id, recorder_id, talkgroup_id, start_time, end_time,
            audio_file, encrypted, emergency, locked, frequency, length
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.system_id.to_string())
    .bind(new.recorder_id.to_string())
    .bind(new.talkgroup_id.to_string())
    .bind(to_millis(new.start_time))
    .bind(new.end_time.map(to_millis))
    .bind(&new.audio_file)
    .bind(new.encrypted)
    .bind(new.emergency)
    .bind(new.frequency)
    .bind(new.length)
    .execute(&mut *tx)
    .await?;

    let mut units = Vec::with_capacity(new.units.len());
    let mut participants: Vec<Unit> = Vec::new();
    for entry in &new.units {
        let unit = get_or_create_unit(&mut *tx, new.system_id, entry.unit_decimal_id).await?;
        let row = TransmissionUnit {
            id: Uuid::new_v4(),
            transmission_id: id,
            time: entry.time,
            unit_id: unit.id,
            pos: entry.pos,
            emergency: entry.emergency,
            signal_system: entry.signal_system.clone(),
            tag: entry.tag.clone(),
            length: entry.length,
        };

        sqlx::query(
            r#"
            INSERT INTO transmission_units (
                guid, transmission_id, time, unit_id, pos, emergency, signal_system, tag, length
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(id.to_string())
        .bind(to_millis(row.time))
        .bind(row.unit_id.to_string())
        .bind(row.pos)
        .bind(row.emergency)
        .bind(&row.signal_system)
        .bind(&row.tag)
        .bind(row.length)
        .execute(&mut *tx)
        .await?;

        if !participants.iter().any(|u| u.id == unit.id) {
            participants.push(unit);
        }
        units.push(row);
    }

    let mut freqs = Vec::with_capacity(new.freqs.len());
    for entry in &new.freqs {
        let row = TransmissionFreq {
            id: Uuid::new_v4(),
            transmission_id: id,
            time: entry.time,
            freq: entry.freq,
            pos: entry.pos,
            len: entry.len,
            error_count: entry.error_count,
            spike_count: entry.spike_count,
        };

        sqlx::query(
            r#"
            INSERT INTO transmission_freqs (
                guid, transmission_id, time, freq, pos, len, error_count, spike_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(id.to_string())
        .bind(to_millis(row.time))
        .bind(row.freq)
        .bind(row.pos)
        .bind(row.len)
        .bind(row.error_count)
        .bind(row.spike_count)
        .execute(&mut *tx)
        .await?;

        freqs.push(row);
    }

    tx.commit().await?;

    let transmission = Transmission {
        id,
        system_id: new.system_id,
        recorder_id: new.recorder_id,
        talkgroup_id: new.talkgroup_id,
        start_time: new.start_time,
        end_time: new.end_time,
        audio_file: new.audio_file,
        encrypted: new.encrypted,
        emergency: new.emergency,
        locked: false,
        frequency: new.frequency,
        length: new.length,
    };

    Ok((
        TransmissionDetail {
            transmission,
            units,
            freqs,
        },
        participants,
    ))
}

pub async fn get_transmission(pool: &SqlitePool, transmission_id: Uuid) -> Result<Option<Transmission>> {
    let sql = format!("SELECT {} FROM transmissions WHERE guid = ?", TRANSMISSION_COLUMNS);
    sqlx::query(&sql)
        .bind(transmission_id.to_string())
        .fetch_optional(pool)
        .await?
        .as_ref()
        .map(transmission_from_row)
        .transpose()
}

/// Load a transmission with its telemetry ordered by position
pub async fn get_transmission_detail(
    pool: &SqlitePool,
    transmission_id: Uuid,
) -> Result<Option<TransmissionDetail>> {
    let Some(transmission) = get_transmission(pool, transmission_id).await? else {
        return Ok(None);
    };

    let units = sqlx::query(
        r#"
        SELECT guid, transmission_id, time, unit_id, pos, emergency, signal_system, tag, length
        FROM transmission_units WHERE transmission_id = ? ORDER BY pos, time
        "#,
    )
    .bind(transmission_id.to_string())
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(TransmissionUnit {
            id: guid_column(row, "guid")?,
            transmission_id: guid_column(row, "transmission_id")?,
            time: from_millis(row.get("time"))?,
            unit_id: guid_column(row, "unit_id")?,
            pos: row.get("pos"),
            emergency: row.get("emergency"),
            signal_system: row.get("signal_system"),
            tag: row.get("tag"),
            length: row.get("length"),
        })
    })
    .collect::<Result<Vec<_>>>()?;

    let freqs = sqlx::query(
        r#"
        SELECT guid, transmission_id, time, freq, pos, len, error_count, spike_count
        FROM transmission_freqs WHERE transmission_id = ? ORDER BY pos, time
        "#,
    )
    .bind(transmission_id.to_string())
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(TransmissionFreq {
            id: guid_column(row, "guid")?,
            transmission_id: guid_column(row, "transmission_id")?,
            time: from_millis(row.get("time"))?,
            freq: row.get("freq"),
            pos: row.get("pos"),
            len: row.get("len"),
            error_count: row.get("error_count"),
            spike_count: row.get("spike_count"),
        })
    })
    .collect::<Result<Vec<_>>>()?;

    Ok(Some(TransmissionDetail {
        transmission,
        units,
        freqs,
    }))
}

/// Most recent transmissions on any of the given talkgroups
pub async fn list_for_talkgroups(
    pool: &SqlitePool,
    talkgroup_ids: &[Uuid],
    limit: i64,
) -> Result<Vec<Transmission>> {
    if talkgroup_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM transmissions WHERE talkgroup_id IN (",
        TRANSMISSION_COLUMNS
    ));
    let mut separated = query.separated(", ");
    for id in talkgroup_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(") ORDER BY start_time DESC, guid LIMIT ");
    query.push_bind(limit);

    query
        .build()
        .fetch_all(pool)
        .await?
        .iter()
        .map(transmission_from_row)
        .collect()
}

/// Delete a transmission and exactly its telemetry rows
///
/// Returns the audio reference of the deleted transmission, or `None` when
/// it did not exist.
pub async fn delete_transmission(pool: &SqlitePool, transmission_id: Uuid) -> Result<Option<String>> {
    let mut tx = pool.begin().await?;

    let audio_file: Option<String> =
        sqlx::query_scalar("SELECT audio_file FROM transmissions WHERE guid = ?")
            .bind(transmission_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
    if audio_file.is_none() {
        return Ok(None);
    }

    for sql in [
        "DELETE FROM transmission_units WHERE transmission_id = ?",
        "DELETE FROM transmission_freqs WHERE transmission_id = ?",
        "DELETE FROM transmissions WHERE guid = ?",
    ] {
        sqlx::query(sql)
            .bind(transmission_id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(audio_file)
}

/// IDs of a system's transmissions started at or before `cutoff`
pub async fn select_expired(
    pool: &SqlitePool,
    system_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ExpiredTransmission>> {
    sqlx::query(
        "SELECT guid, audio_file FROM transmissions WHERE system_id = ? AND start_time <= ? ORDER BY start_time",
    )
    .bind(system_id.to_string())
    .bind(to_millis(cutoff))
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| {
        Ok(ExpiredTransmission {
            id: guid_column(row, "guid")?,
            audio_file: row.get("audio_file"),
        })
    })
    .collect()
}

/// Delete the telemetry rows owned by one transmission
pub async fn delete_children(pool: &SqlitePool, transmission_id: Uuid) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut removed = 0;
    for sql in [
        "DELETE FROM transmission_units WHERE transmission_id = ?",
        "DELETE FROM transmission_freqs WHERE transmission_id = ?",
    ] {
        removed += sqlx::query(sql)
            .bind(transmission_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(removed)
}

/// Delete exactly the given transmissions in one statement
pub async fn delete_batch(pool: &SqlitePool, transmission_ids: &[Uuid]) -> Result<u64> {
    if transmission_ids.is_empty() {
        return Ok(0);
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM transmissions WHERE guid IN (");
    let mut separated = query.separated(", ");
    for id in transmission_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    Ok(query.build().execute(pool).await?.rows_affected())
}

/// Count telemetry rows owned by a transmission (units, freqs)
pub async fn count_children(pool: &SqlitePool, transmission_id: Uuid) -> Result<(i64, i64)> {
    let units: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM transmission_units WHERE transmission_id = ?")
            .bind(transmission_id.to_string())
            .fetch_one(pool)
            .await?;
    let freqs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM transmission_freqs WHERE transmission_id = ?")
            .bind(transmission_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok((units, freqs))
}
