//! Database initialization
//!
//! Creates the database on first run and brings the schema up idempotently
//! (`CREATE TABLE IF NOT EXISTS`). Every connection is opened with foreign
//! keys enabled, so cascades declared here are enforced on all pooled
//! connections, not just the first one.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets readers proceed while an ingestion transaction writes
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// The pool is pinned to a single connection that never expires, since every
/// SQLite in-memory connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_user_profiles_table(pool).await?;
    create_system_acls_table(pool).await?;
    create_systems_table(pool).await?;
    create_agencies_table(pool).await?;
    create_talkgroups_table(pool).await?;
    create_units_table(pool).await?;
    create_system_recorders_table(pool).await?;
    create_transmissions_table(pool).await?;
    create_transmission_units_table(pool).await?;
    create_transmission_freqs_table(pool).await?;
    create_incidents_table(pool).await?;
    create_talkgroup_acls_table(pool).await?;
    create_user_alerts_table(pool).await?;
    create_system_forwarders_table(pool).await?;

    Ok(())
}

async fn execute_all(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

async fn create_user_profiles_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            guid TEXT PRIMARY KEY,
            site_admin INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            site_theme TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#],
    )
    .await
}

async fn create_system_acls_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS system_acls (
                guid TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                public INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS system_acl_users (
                acl_id TEXT NOT NULL REFERENCES system_acls(guid) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES user_profiles(guid) ON DELETE CASCADE,
                PRIMARY KEY (acl_id, user_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_systems_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS systems (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            system_acl_id TEXT NOT NULL REFERENCES system_acls(guid) ON DELETE CASCADE,
            enable_talkgroup_acls INTEGER NOT NULL DEFAULT 0,
            prune_transmissions INTEGER NOT NULL DEFAULT 0,
            prune_transmissions_after_days INTEGER NOT NULL DEFAULT 365
        )
        "#],
    )
    .await
}

async fn create_agencies_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS agencies (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT
        )
        "#],
    )
    .await
}

async fn create_talkgroups_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS talkgroups (
                guid TEXT PRIMARY KEY,
                system_id TEXT NOT NULL REFERENCES systems(guid) ON DELETE CASCADE,
                decimal_id INTEGER NOT NULL,
                alpha_tag TEXT NOT NULL DEFAULT '',
                description TEXT,
                encrypted INTEGER NOT NULL DEFAULT 0,
                UNIQUE (system_id, decimal_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS talkgroup_agencies (
                talkgroup_id TEXT NOT NULL REFERENCES talkgroups(guid) ON DELETE CASCADE,
                agency_id TEXT NOT NULL REFERENCES agencies(guid) ON DELETE CASCADE,
                PRIMARY KEY (talkgroup_id, agency_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_units_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS units (
            guid TEXT PRIMARY KEY,
            system_id TEXT NOT NULL REFERENCES systems(guid) ON DELETE CASCADE,
            decimal_id INTEGER NOT NULL,
            description TEXT,
            UNIQUE (system_id, decimal_id)
        )
        "#],
    )
    .await
}

async fn create_system_recorders_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS system_recorders (
                guid TEXT PRIMARY KEY,
                system_id TEXT NOT NULL REFERENCES systems(guid) ON DELETE CASCADE,
                name TEXT NOT NULL,
                site_id TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                user_id TEXT REFERENCES user_profiles(guid) ON DELETE CASCADE,
                forwarder_webhook_uuid TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS recorder_talkgroups_allowed (
                recorder_id TEXT NOT NULL REFERENCES system_recorders(guid) ON DELETE CASCADE,
                talkgroup_id TEXT NOT NULL REFERENCES talkgroups(guid) ON DELETE CASCADE,
                PRIMARY KEY (recorder_id, talkgroup_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS recorder_talkgroups_denied (
                recorder_id TEXT NOT NULL REFERENCES system_recorders(guid) ON DELETE CASCADE,
                talkgroup_id TEXT NOT NULL REFERENCES talkgroups(guid) ON DELETE CASCADE,
                PRIMARY KEY (recorder_id, talkgroup_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_transmissions_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS transmissions (
                guid TEXT PRIMARY KEY,
                system_id TEXT NOT NULL REFERENCES systems(guid) ON DELETE CASCADE,
                recorder_id TEXT NOT NULL REFERENCES system_recorders(guid) ON DELETE CASCADE,
                talkgroup_id TEXT NOT NULL REFERENCES talkgroups(guid) ON DELETE CASCADE,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                audio_file TEXT NOT NULL,
                encrypted INTEGER NOT NULL DEFAULT 0,
                emergency INTEGER NOT NULL DEFAULT 0,
                locked INTEGER NOT NULL DEFAULT 0,
                frequency REAL NOT NULL DEFAULT 0,
                length REAL NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transmissions_system_start ON transmissions(system_id, start_time)",
            "CREATE INDEX IF NOT EXISTS idx_transmissions_talkgroup ON transmissions(talkgroup_id)",
        ],
    )
    .await
}

async fn create_transmission_units_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS transmission_units (
                guid TEXT PRIMARY KEY,
                transmission_id TEXT NOT NULL REFERENCES transmissions(guid) ON DELETE CASCADE,
                time INTEGER NOT NULL,
                unit_id TEXT NOT NULL REFERENCES units(guid) ON DELETE CASCADE,
                pos INTEGER NOT NULL DEFAULT 0,
                emergency INTEGER NOT NULL DEFAULT 0,
                signal_system TEXT NOT NULL DEFAULT '',
                tag TEXT NOT NULL DEFAULT '',
                length REAL NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transmission_units_tx ON transmission_units(transmission_id)",
        ],
    )
    .await
}

async fn create_transmission_freqs_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS transmission_freqs (
                guid TEXT PRIMARY KEY,
                transmission_id TEXT NOT NULL REFERENCES transmissions(guid) ON DELETE CASCADE,
                time INTEGER NOT NULL,
                freq INTEGER NOT NULL DEFAULT 0,
                pos INTEGER NOT NULL DEFAULT 0,
                len INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                spike_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_transmission_freqs_tx ON transmission_freqs(transmission_id)",
        ],
    )
    .await
}

async fn create_incidents_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                guid TEXT PRIMARY KEY,
                system_id TEXT NOT NULL REFERENCES systems(guid) ON DELETE CASCADE,
                active INTEGER NOT NULL DEFAULT 1,
                time INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT
            )
            "#,
            // Link rows only: removing either side never removes the other
            r#"
            CREATE TABLE IF NOT EXISTS incident_transmissions (
                incident_id TEXT NOT NULL REFERENCES incidents(guid) ON DELETE CASCADE,
                transmission_id TEXT NOT NULL REFERENCES transmissions(guid) ON DELETE CASCADE,
                PRIMARY KEY (incident_id, transmission_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS incident_agencies (
                incident_id TEXT NOT NULL REFERENCES incidents(guid) ON DELETE CASCADE,
                agency_id TEXT NOT NULL REFERENCES agencies(guid) ON DELETE CASCADE,
                PRIMARY KEY (incident_id, agency_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_talkgroup_acls_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS talkgroup_acls (
                guid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                default_new_users INTEGER NOT NULL DEFAULT 1,
                default_new_talkgroups INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS talkgroup_acl_users (
                acl_id TEXT NOT NULL REFERENCES talkgroup_acls(guid) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES user_profiles(guid) ON DELETE CASCADE,
                PRIMARY KEY (acl_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS talkgroup_acl_talkgroups (
                acl_id TEXT NOT NULL REFERENCES talkgroup_acls(guid) ON DELETE CASCADE,
                talkgroup_id TEXT NOT NULL REFERENCES talkgroups(guid) ON DELETE CASCADE,
                PRIMARY KEY (acl_id, talkgroup_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_user_alerts_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS user_alerts (
                guid TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES user_profiles(guid) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                web_notification INTEGER NOT NULL DEFAULT 0,
                app_rise_notification INTEGER NOT NULL DEFAULT 0,
                app_rise_urls TEXT NOT NULL DEFAULT '',
                emergency_only INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_alert_talkgroups (
                alert_id TEXT NOT NULL REFERENCES user_alerts(guid) ON DELETE CASCADE,
                talkgroup_id TEXT NOT NULL REFERENCES talkgroups(guid) ON DELETE CASCADE,
                PRIMARY KEY (alert_id, talkgroup_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_alert_units (
                alert_id TEXT NOT NULL REFERENCES user_alerts(guid) ON DELETE CASCADE,
                unit_id TEXT NOT NULL REFERENCES units(guid) ON DELETE CASCADE,
                PRIMARY KEY (alert_id, unit_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_system_forwarders_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS system_forwarders (
                guid TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 0,
                recorder_key TEXT NOT NULL,
                remote_url TEXT NOT NULL,
                forward_incidents INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS system_forwarder_systems (
                forwarder_id TEXT NOT NULL REFERENCES system_forwarders(guid) ON DELETE CASCADE,
                system_id TEXT NOT NULL REFERENCES systems(guid) ON DELETE CASCADE,
                PRIMARY KEY (forwarder_id, system_id)
            )
            "#,
        ],
    )
    .await
}
