use r2d2::Pool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::db::introspect;
use crate::db::pool::PostgresConnectionManager;
use crate::db::schema::SchemaDescription;
use crate::error::PipelineError;

/// Caches the introspected schema and rebuilds it on demand.
///
/// The cache is read-only between refreshes; nothing in this system issues
/// DDL, so when the database changes underneath us callers hit `refresh`
/// explicitly and the rebuilt description replaces the cache wholesale.
pub struct SchemaManager {
    pool: Pool<PostgresConnectionManager>,
    cache: RwLock<Option<Arc<SchemaDescription>>>,
    last_refresh: RwLock<chrono::DateTime<chrono::Utc>>,
}

impl SchemaManager {
    pub fn new(pool: Pool<PostgresConnectionManager>) -> Self {
        Self {
            pool,
            cache: RwLock::new(None),
            last_refresh: RwLock::new(chrono::Utc::now()),
        }
    }

    /// Rebuilds the schema description from the live catalog.
    pub async fn refresh(&self) -> Result<Arc<SchemaDescription>, PipelineError> {
        info!("Refreshing schema cache");
        let pool = self.pool.clone();

        let schema = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PipelineError::SchemaUnavailable(e.to_string()))?;
            introspect::introspect(&mut conn)
        })
        .await
        .map_err(|e| PipelineError::SchemaUnavailable(e.to_string()))??;

        debug!("Schema cache holds {} tables", schema.tables.len());
        let schema = Arc::new(schema);

        let mut cache = self.cache.write().await;
        *cache = Some(Arc::clone(&schema));

        let mut timestamp = self.last_refresh.write().await;
        *timestamp = chrono::Utc::now();

        Ok(schema)
    }

    /// Returns the cached description, introspecting on first use.
    pub async fn current(&self) -> Result<Arc<SchemaDescription>, PipelineError> {
        if let Some(schema) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(schema));
        }
        self.refresh().await
    }

    /// When the cached description was last rebuilt from the catalog.
    pub async fn last_refreshed(&self) -> chrono::DateTime<chrono::Utc> {
        *self.last_refresh.read().await
    }
}
