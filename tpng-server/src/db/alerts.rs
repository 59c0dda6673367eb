//! User alert subscriptions

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tpng_common::db::UserAlert;
use tpng_common::Result;
use uuid::Uuid;

use super::{guid_column, insert_links, linked_ids};

/// Fields of a new alert
#[derive(Debug, Clone, Default)]
pub struct NewUserAlert {
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub web_notification: bool,
    pub app_rise_notification: bool,
    pub app_rise_urls: String,
    pub emergency_only: bool,
    pub title: String,
    pub body: String,
    pub talkgroups: Vec<Uuid>,
    pub units: Vec<Uuid>,
}

pub async fn create_alert(pool: &SqlitePool, alert: NewUserAlert) -> Result<UserAlert> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO user_alerts (
            guid, user_id, name, description, web_notification, app_rise_notification,
            app_rise_urls, emergency_only, title, body
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(alert.user_id.to_string())
    .bind(&alert.name)
    .bind(&alert.description)
    .bind(alert.web_notification)
    .bind(alert.app_rise_notification)
    .bind(&alert.app_rise_urls)
    .bind(alert.emergency_only)
    .bind(&alert.title)
    .bind(&alert.body)
    .execute(&mut *tx)
    .await?;
    insert_links(
        &mut *tx,
        "INSERT INTO user_alert_talkgroups (alert_id, talkgroup_id) VALUES (?, ?)",
        id,
        &alert.talkgroups,
    )
    .await?;
    insert_links(
        &mut *tx,
        "INSERT INTO user_alert_units (alert_id, unit_id) VALUES (?, ?)",
        id,
        &alert.units,
    )
    .await?;

    tx.commit().await?;

    Ok(UserAlert {
        id,
        user_id: alert.user_id,
        name: alert.name,
        description: alert.description,
        web_notification: alert.web_notification,
        app_rise_notification: alert.app_rise_notification,
        app_rise_urls: alert.app_rise_urls,
        emergency_only: alert.emergency_only,
        title: alert.title,
        body: alert.body,
        talkgroups: alert.talkgroups,
        units: alert.units,
    })
}

/// Alerts subscribed to the talkgroup or to any of the units, with their
/// full subscription lists, ordered by alert ID
pub async fn alerts_for(pool: &SqlitePool, talkgroup_id: Uuid, unit_ids: &[Uuid]) -> Result<Vec<UserAlert>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT guid, user_id, name, description, web_notification, app_rise_notification,
               app_rise_urls, emergency_only, title, body
        FROM user_alerts
        WHERE guid IN (SELECT alert_id FROM user_alert_talkgroups WHERE talkgroup_id = "#,
    );
    query.push_bind(talkgroup_id.to_string());
    query.push(")");
    if !unit_ids.is_empty() {
        query.push(" OR guid IN (SELECT alert_id FROM user_alert_units WHERE unit_id IN (");
        let mut separated = query.separated(", ");
        for id in unit_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated("))");
    }
    query.push(" ORDER BY guid");

    let rows = query.build().fetch_all(pool).await?;

    let mut alerts = Vec::with_capacity(rows.len());
    for row in rows {
        let id = guid_column(&row, "guid")?;
        let talkgroups = linked_ids(
            pool,
            "SELECT talkgroup_id FROM user_alert_talkgroups WHERE alert_id = ?",
            id,
        )
        .await?;
        let units = linked_ids(pool, "SELECT unit_id FROM user_alert_units WHERE alert_id = ?", id).await?;

        alerts.push(UserAlert {
            id,
            user_id: guid_column(&row, "user_id")?,
            name: row.get("name"),
            description: row.get("description"),
            web_notification: row.get("web_notification"),
            app_rise_notification: row.get("app_rise_notification"),
            app_rise_urls: row.get("app_rise_urls"),
            emergency_only: row.get("emergency_only"),
            title: row.get("title"),
            body: row.get("body"),
            talkgroups,
            units,
        });
    }

    Ok(alerts)
}
