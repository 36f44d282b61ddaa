//! Postgres-backed [`EntityStore`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use starwatch_core::{
    Alert, Category, CategoryCount, Observation, ObservationRecord, TrackedEntity,
};
use starwatch_engine::{EntityStore, StoreError, UpsertOutcome};

use crate::{alert_log, connect_pool, entities, DbError, PoolConfig};

/// Store handle over a connection pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    /// Connect a new pool and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the connection cannot be established.
    pub async fn open(database_url: &str, config: PoolConfig) -> Result<Self, DbError> {
        let pool = connect_pool(database_url, config).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

impl EntityStore for PgEntityStore {
    async fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(entities::upsert_entity(&self.pool, observation, now).await?)
    }

    async fn get(&self, identity: &str) -> Result<Option<TrackedEntity>, StoreError> {
        Ok(entities::get_entity(&self.pool, identity).await?)
    }

    async fn history(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ObservationRecord>, StoreError> {
        Ok(entities::list_history(&self.pool, identity, limit).await?)
    }

    async fn record_classification(
        &self,
        identity: &str,
        growth_rate: f64,
        category: Category,
    ) -> Result<(), StoreError> {
        Ok(entities::record_classification(&self.pool, identity, growth_rate, category).await?)
    }

    async fn append_alerts(&self, alerts: &[Alert], cap: usize) -> Result<(), StoreError> {
        Ok(alert_log::append_alerts(&self.pool, alerts, cap).await?)
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        Ok(alert_log::list_recent_alerts(&self.pool, limit).await?)
    }

    async fn top_by_popularity(&self, limit: usize) -> Result<Vec<TrackedEntity>, StoreError> {
        Ok(entities::list_top_by_popularity(&self.pool, limit).await?)
    }

    async fn top_by_growth(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<TrackedEntity>, StoreError> {
        Ok(entities::list_top_by_growth(&self.pool, category, limit).await?)
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        Ok(entities::list_category_counts(&self.pool).await?)
    }
}
