//! Database operations for the size-bounded `alert_log`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use starwatch_core::{Alert, AlertCategory, Priority};

use crate::{sql_limit, DbError};

/// A row from the `alert_log` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub entity_identity: String,
    pub category: String,
    pub priority: String,
    pub summary: String,
    pub url: Option<String>,
    pub popularity: i64,
    pub growth_rate: f64,
    pub generated_at: DateTime<Utc>,
}

impl AlertRow {
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] if the stored category or priority is unknown.
    pub fn into_alert(self) -> Result<Alert, DbError> {
        let corrupt = |reason: String| DbError::CorruptRow {
            identity: self.entity_identity.clone(),
            reason,
        };
        let category = self
            .category
            .parse::<AlertCategory>()
            .map_err(|e| corrupt(e.to_string()))?;
        let priority = self
            .priority
            .parse::<Priority>()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Alert {
            entity_identity: self.entity_identity,
            category,
            priority,
            summary: self.summary,
            url: self.url,
            popularity: self.popularity,
            growth_rate: self.growth_rate,
            generated_at: self.generated_at,
        })
    }
}

/// Prepends `alerts` to the log and trims it to the newest `cap` rows.
///
/// Rows are inserted last-to-first so the first alert of the batch gets the
/// highest id and reads back as the newest.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is written in
/// that case.
pub async fn append_alerts(pool: &PgPool, alerts: &[Alert], cap: usize) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for alert in alerts.iter().rev() {
        sqlx::query(
            "INSERT INTO alert_log \
                 (entity_identity, category, priority, summary, url, popularity, \
                  growth_rate, generated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&alert.entity_identity)
        .bind(alert.category.as_str())
        .bind(alert.priority.as_str())
        .bind(&alert.summary)
        .bind(&alert.url)
        .bind(alert.popularity)
        .bind(alert.growth_rate)
        .bind(alert.generated_at)
        .execute(&mut *tx)
        .await?;
    }

    let trimmed = sqlx::query(
        "DELETE FROM alert_log \
         WHERE id NOT IN (SELECT id FROM alert_log ORDER BY id DESC LIMIT $1)",
    )
    .bind(sql_limit(cap))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if trimmed.rows_affected() > 0 {
        tracing::debug!(dropped = trimmed.rows_affected(), cap, "trimmed alert log");
    }

    Ok(())
}

/// Returns up to `limit` alerts, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::CorruptRow`] if a
/// stored row has an unknown category or priority.
pub async fn list_recent_alerts(pool: &PgPool, limit: usize) -> Result<Vec<Alert>, DbError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        "SELECT id, entity_identity, category, priority, summary, url, popularity, \
                growth_rate, generated_at \
         FROM alert_log \
         ORDER BY id DESC \
         LIMIT $1",
    )
    .bind(sql_limit(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AlertRow::into_alert).collect()
}
