use postgres::SimpleQueryMessage;
use postgres::error::SqlState;
use r2d2::Pool;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::db::pool::PostgresConnectionManager;
use crate::error::PipelineError;

/// Result of one executed statement. Row ordering follows the database;
/// no extra sort is imposed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub elapsed_ms: f64,
}

/// Runs validated read-only statements against PostgreSQL under a
/// server-enforced statement timeout.
pub struct QueryExecutor {
    pool: Pool<PostgresConnectionManager>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(pool: Pool<PostgresConnectionManager>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Executes `sql` and collects rows as column-name to value maps.
    ///
    /// Only called with statements the validator accepted; the statement is
    /// read-only, so cancellation at the timeout never leaves the database
    /// in a changed state.
    pub async fn run(&self, sql: &str) -> Result<ExecutionResult, PipelineError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let timeout_ms = self.timeout.as_millis() as u64;

        let result = tokio::task::spawn_blocking(move || -> Result<ExecutionResult, PipelineError> {
            let mut conn = pool
                .get()
                .map_err(|e| PipelineError::ExecutionError(e.to_string()))?;

            // Connections are pooled, so the timeout is (re)applied on
            // every checkout rather than assumed from session state.
            conn.batch_execute(&format!("SET statement_timeout = {}", timeout_ms))
                .map_err(classify_error)?;

            let start = Instant::now();
            let messages = conn.simple_query(&sql).map_err(classify_error)?;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            let mut rows = Vec::new();
            for message in messages {
                if let SimpleQueryMessage::Row(row) = message {
                    let mut object = Map::new();
                    for (idx, column) in row.columns().iter().enumerate() {
                        let value = match row.get(idx) {
                            Some(text) => coerce_scalar(text),
                            None => Value::Null,
                        };
                        object.insert(column.name().to_string(), value);
                    }
                    rows.push(object);
                }
            }

            debug!("Executed query in {:.1}ms", elapsed_ms);
            Ok(ExecutionResult {
                row_count: rows.len(),
                rows,
                elapsed_ms,
            })
        })
        .await
        .map_err(|e| PipelineError::ExecutionError(e.to_string()))??;

        info!(
            "Query returned {} rows in {:.1}ms",
            result.row_count, result.elapsed_ms
        );
        Ok(result)
    }
}

fn classify_error(e: postgres::Error) -> PipelineError {
    if e.code() == Some(&SqlState::QUERY_CANCELED) {
        return PipelineError::ExecutionTimeout;
    }
    match e.as_db_error() {
        Some(db) => PipelineError::ExecutionError(db.message().to_string()),
        None => PipelineError::ExecutionError(e.to_string()),
    }
}

/// Text-protocol cells arrive as strings; fold the common scalar forms
/// back into JSON numbers and booleans. Only canonical numeric text is
/// coerced (the round-trip check): leading zeros, an explicit `+` sign or
/// exponent notation in a text column must survive as written.
fn coerce_scalar(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        if i.to_string() == text {
            return Value::from(i);
        }
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() && f.to_string() == text {
            return Value::from(f);
        }
    }
    match text {
        "t" => Value::Bool(true),
        "f" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_coerce_to_json_types() {
        assert_eq!(coerce_scalar("42"), Value::from(42));
        assert_eq!(coerce_scalar("-7"), Value::from(-7));
        assert_eq!(coerce_scalar("3.5"), Value::from(3.5));
        assert_eq!(coerce_scalar("t"), Value::Bool(true));
        assert_eq!(coerce_scalar("f"), Value::Bool(false));
        assert_eq!(
            coerce_scalar("Nguyễn Văn A"),
            Value::String("Nguyễn Văn A".to_string())
        );
    }

    #[test]
    fn non_canonical_numeric_text_stays_textual() {
        // Postal codes, phone numbers and the like must not be rewritten.
        assert_eq!(coerce_scalar("04532"), Value::String("04532".to_string()));
        assert_eq!(coerce_scalar("+7"), Value::String("+7".to_string()));
        assert_eq!(coerce_scalar("1e3"), Value::String("1e3".to_string()));
    }

    #[test]
    fn non_finite_floats_stay_textual() {
        assert_eq!(coerce_scalar("NaN"), Value::String("NaN".to_string()));
        assert_eq!(
            coerce_scalar("Infinity"),
            Value::String("Infinity".to_string())
        );
    }
}
