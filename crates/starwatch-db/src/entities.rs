//! Database operations for `tracked_entities` and `entity_observations`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use starwatch_core::{Category, CategoryCount, Observation, ObservationRecord, TrackedEntity};
use starwatch_engine::UpsertOutcome;

use crate::{sql_limit, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `tracked_entities` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntityRow {
    pub identity: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub source_label: Option<String>,
    pub topics: Vec<String>,
    pub metadata: Json<BTreeMap<String, String>>,
    pub popularity: i64,
    pub secondary_count: i64,
    pub created_at: DateTime<Utc>,
    pub growth_rate: f64,
    /// `NULL` until the first classification.
    pub category: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EntityRow {
    /// Convert into the domain type, validating the stored category.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CorruptRow`] if `category` holds an unknown value.
    pub fn into_entity(self) -> Result<TrackedEntity, DbError> {
        let category = self
            .category
            .as_deref()
            .map(str::parse::<Category>)
            .transpose()
            .map_err(|e| DbError::CorruptRow {
                identity: self.identity.clone(),
                reason: e.to_string(),
            })?;

        Ok(TrackedEntity {
            identity: self.identity,
            url: self.url,
            description: self.description,
            language: self.language,
            source_label: self.source_label,
            topics: self.topics,
            metadata: self.metadata.0,
            popularity: self.popularity,
            secondary_count: self.secondary_count,
            created_at: self.created_at,
            growth_rate: self.growth_rate,
            category,
            first_seen: self.first_seen,
            last_updated: self.last_updated,
        })
    }
}

/// A row from the `entity_observations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ObservationRow {
    pub id: i64,
    pub identity: String,
    pub popularity: i64,
    pub secondary_count: i64,
    pub observed_at: DateTime<Utc>,
}

impl From<ObservationRow> for ObservationRecord {
    fn from(row: ObservationRow) -> Self {
        Self {
            identity: row.identity,
            popularity: row.popularity,
            secondary_count: row.secondary_count,
            observed_at: row.observed_at,
        }
    }
}

/// One group from the category summary query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryCountRow {
    pub category: Option<String>,
    pub count: i64,
    pub avg_popularity: f64,
}

const ENTITY_COLUMNS: &str = "identity, url, description, language, source_label, topics, \
     metadata, popularity, secondary_count, created_at, growth_rate, category, \
     first_seen, last_updated";

/// The live counts of a locked entity row.
#[derive(Debug, sqlx::FromRow)]
struct LockedCounts {
    popularity: i64,
    secondary_count: i64,
    last_updated: DateTime<Utc>,
}

async fn lock_entity(
    tx: &mut Transaction<'_, Postgres>,
    identity: &str,
) -> Result<Option<LockedCounts>, DbError> {
    let row = sqlx::query_as::<_, LockedCounts>(
        "SELECT popularity, secondary_count, last_updated \
         FROM tracked_entities \
         WHERE identity = $1 \
         FOR UPDATE",
    )
    .bind(identity)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// Creates or updates one entity inside a single transaction.
///
/// The entity row is locked with `SELECT ... FOR UPDATE`, so concurrent
/// upserts for the same identity are applied one after the other. An
/// existing entity gets one `entity_observations` row holding its counts
/// from before the update. Popularity never moves backwards.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the transaction is
/// rolled back.
pub async fn upsert_entity(
    pool: &PgPool,
    observation: &Observation,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome, DbError> {
    let mut tx = pool.begin().await?;

    let locked = match lock_entity(&mut tx, &observation.identity).await? {
        Some(locked) => locked,
        None => {
            let inserted = sqlx::query(
                "INSERT INTO tracked_entities \
                     (identity, url, description, language, source_label, topics, metadata, \
                      popularity, secondary_count, created_at, first_seen, last_updated) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
                 ON CONFLICT (identity) DO NOTHING",
            )
            .bind(&observation.identity)
            .bind(&observation.url)
            .bind(&observation.description)
            .bind(&observation.language)
            .bind(&observation.source_label)
            .bind(&observation.topics)
            .bind(Json(&observation.metadata))
            .bind(observation.popularity)
            .bind(observation.secondary_count)
            .bind(observation.created_at.unwrap_or(now))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 1 {
                tx.commit().await?;
                return Ok(UpsertOutcome {
                    created: true,
                    previous_popularity: None,
                });
            }

            // Another writer created it first; take the update path on its row.
            lock_entity(&mut tx, &observation.identity)
                .await?
                .ok_or(DbError::NotFound)?
        }
    };

    sqlx::query(
        "INSERT INTO entity_observations (identity, popularity, secondary_count, observed_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&observation.identity)
    .bind(locked.popularity)
    .bind(locked.secondary_count)
    .bind(locked.last_updated)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE tracked_entities SET \
             popularity = GREATEST(popularity, $2), \
             secondary_count = $3, \
             url = COALESCE($4, url), \
             description = COALESCE($5, description), \
             language = COALESCE($6, language), \
             source_label = COALESCE($7, source_label), \
             topics = CASE WHEN cardinality($8::text[]) > 0 THEN $8 ELSE topics END, \
             metadata = metadata || $9, \
             last_updated = $10 \
         WHERE identity = $1",
    )
    .bind(&observation.identity)
    .bind(observation.popularity)
    .bind(observation.secondary_count)
    .bind(&observation.url)
    .bind(&observation.description)
    .bind(&observation.language)
    .bind(&observation.source_label)
    .bind(&observation.topics)
    .bind(Json(&observation.metadata))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(UpsertOutcome {
        created: false,
        previous_popularity: Some(locked.popularity),
    })
}

/// Persists the derived growth rate and category.
///
/// # Errors
///
/// Returns [`DbError::CorruptRow`] if the entity does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_classification(
    pool: &PgPool,
    identity: &str,
    growth_rate: f64,
    category: Category,
) -> Result<(), DbError> {
    if !growth_rate.is_finite() || growth_rate < 0.0 {
        return Err(DbError::CorruptRow {
            identity: identity.to_string(),
            reason: format!("growth rate {growth_rate} out of range"),
        });
    }

    let result = sqlx::query(
        "UPDATE tracked_entities SET growth_rate = $2, category = $3 WHERE identity = $1",
    )
    .bind(identity)
    .bind(growth_rate)
    .bind(category.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::CorruptRow {
            identity: identity.to_string(),
            reason: "entity not found".to_string(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

/// Fetches one entity by identity.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::CorruptRow`] if
/// the stored category is unknown.
pub async fn get_entity(pool: &PgPool, identity: &str) -> Result<Option<TrackedEntity>, DbError> {
    let row = sqlx::query_as::<_, EntityRow>(&format!(
        "SELECT {ENTITY_COLUMNS} FROM tracked_entities WHERE identity = $1"
    ))
    .bind(identity)
    .fetch_optional(pool)
    .await?;

    row.map(EntityRow::into_entity).transpose()
}

/// Returns up to `limit` observation records for `identity`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_history(
    pool: &PgPool,
    identity: &str,
    limit: usize,
) -> Result<Vec<ObservationRecord>, DbError> {
    let rows = sqlx::query_as::<_, ObservationRow>(
        "SELECT id, identity, popularity, secondary_count, observed_at \
         FROM entity_observations \
         WHERE identity = $1 \
         ORDER BY observed_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(identity)
    .bind(sql_limit(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ObservationRecord::from).collect())
}

/// Returns the `limit` most popular entities.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::CorruptRow`] if
/// a stored category is unknown.
pub async fn list_top_by_popularity(
    pool: &PgPool,
    limit: usize,
) -> Result<Vec<TrackedEntity>, DbError> {
    let rows = sqlx::query_as::<_, EntityRow>(&format!(
        "SELECT {ENTITY_COLUMNS} FROM tracked_entities \
         ORDER BY popularity DESC, identity ASC \
         LIMIT $1"
    ))
    .bind(sql_limit(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EntityRow::into_entity).collect()
}

/// Returns the `limit` fastest-growing entities, optionally within one category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::CorruptRow`] if
/// a stored category is unknown.
pub async fn list_top_by_growth(
    pool: &PgPool,
    category: Option<Category>,
    limit: usize,
) -> Result<Vec<TrackedEntity>, DbError> {
    let rows = sqlx::query_as::<_, EntityRow>(&format!(
        "SELECT {ENTITY_COLUMNS} FROM tracked_entities \
         WHERE ($1::text IS NULL OR category = $1) \
         ORDER BY growth_rate DESC, identity ASC \
         LIMIT $2"
    ))
    .bind(category.map(Category::as_str))
    .bind(sql_limit(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EntityRow::into_entity).collect()
}

/// Entity counts and average popularity grouped by category. Unclassified
/// entities form their own group.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::CorruptRow`] if
/// a stored category is unknown.
pub async fn list_category_counts(pool: &PgPool) -> Result<Vec<CategoryCount>, DbError> {
    let rows = sqlx::query_as::<_, CategoryCountRow>(
        "SELECT category, COUNT(*) AS count, AVG(popularity)::float8 AS avg_popularity \
         FROM tracked_entities \
         GROUP BY category \
         ORDER BY category ASC NULLS LAST",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let category = row
                .category
                .as_deref()
                .map(str::parse::<Category>)
                .transpose()
                .map_err(|e| DbError::CorruptRow {
                    identity: "<category summary>".to_string(),
                    reason: e.to_string(),
                })?;
            Ok(CategoryCount {
                category,
                count: row.count,
                avg_popularity: row.avg_popularity,
            })
        })
        .collect()
}
