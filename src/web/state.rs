use r2d2::Pool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::pool::PostgresConnectionManager;
use crate::pipeline::QueryPipeline;

/// Shared application state for the web server.
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Pool<PostgresConnectionManager>,
    pub pipeline: Arc<QueryPipeline>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db_pool: Pool<PostgresConnectionManager>,
        pipeline: Arc<QueryPipeline>,
    ) -> Self {
        Self {
            config,
            db_pool,
            pipeline,
            startup_time: chrono::Utc::now(),
        }
    }

    /// Live connectivity probe for the health endpoint.
    pub async fn database_connected(&self) -> bool {
        let pool = self.db_pool.clone();
        tokio::task::spawn_blocking(move || match pool.get() {
            Ok(mut conn) => conn.simple_query("SELECT 1").is_ok(),
            Err(_) => false,
        })
        .await
        .unwrap_or(false)
    }
}
