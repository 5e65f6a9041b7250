use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::pipeline::{ExecutionStatus, QueryOutcome};
use crate::validate::Verdict;
use crate::web::state::AppState;

// Request types

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
}

// Response types

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub generated_sql: String,
    pub execution_status: String,
    pub results: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub execution_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub results: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub execution_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_connected: bool,
    pub model_available: bool,
    pub uptime_seconds: i64,
}

/// Structured failure envelope: a stable kind tag and a human-readable
/// message, never a raw driver or provider error dump.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
}

type ApiFailure = (StatusCode, Json<ErrorResponse>);

fn failure(kind: &str, message: String, generated_sql: Option<String>) -> ApiFailure {
    let status = match kind {
        "invalid_syntax" | "disallowed_statement_type" | "unknown_schema_reference" => {
            StatusCode::BAD_REQUEST
        }
        "model_unavailable" => StatusCode::BAD_GATEWAY,
        "model_timeout" | "execution_timeout" => StatusCode::GATEWAY_TIMEOUT,
        "schema_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: kind.to_string(),
            message,
            generated_sql,
        }),
    )
}

fn pipeline_failure(e: &PipelineError, generated_sql: Option<String>) -> ApiFailure {
    failure(e.kind(), e.to_string(), generated_sql)
}

fn verdict_kind(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::InvalidSyntax => "invalid_syntax",
        Verdict::DisallowedStatementType => "disallowed_statement_type",
        Verdict::UnknownSchemaReference => "unknown_schema_reference",
        Verdict::Valid => "valid",
    }
}

fn rejection(outcome: QueryOutcome) -> ApiFailure {
    failure(
        verdict_kind(&outcome.validation.verdict),
        outcome
            .validation
            .detail
            .unwrap_or_else(|| "statement rejected".to_string()),
        Some(outcome.generated_sql),
    )
}

/// Natural-language question in, executed rows out.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiFailure> {
    debug!("NL question: {}", payload.question);

    let outcome = state
        .pipeline
        .answer(&payload.question)
        .await
        .map_err(|e| {
            error!("Pipeline failed before validation: {}", e);
            pipeline_failure(&e, None)
        })?;

    match outcome.execution {
        ExecutionStatus::Succeeded(ref result) => {
            info!(
                "Answered question with {} rows in {:.1}ms",
                result.row_count, result.elapsed_ms
            );
            Ok(Json(GenerateResponse {
                success: true,
                generated_sql: outcome.generated_sql,
                execution_status: "success".to_string(),
                row_count: result.row_count,
                execution_time_ms: result.elapsed_ms,
                results: result.rows.clone(),
            }))
        }
        ExecutionStatus::Failed(ref e) => {
            error!("Execution failed: {}", e);
            Err(pipeline_failure(e, Some(outcome.generated_sql)))
        }
        ExecutionStatus::NotExecuted => Err(rejection(outcome)),
    }
}

/// Caller-supplied SQL. Still passes through the validator; this is not a
/// raw SQL escape hatch.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiFailure> {
    debug!("Direct SQL: {}", payload.sql);

    let outcome = state
        .pipeline
        .execute_sql(&payload.sql)
        .await
        .map_err(|e| pipeline_failure(&e, None))?;

    match outcome.execution {
        ExecutionStatus::Succeeded(ref result) => Ok(Json(ExecuteResponse {
            success: true,
            row_count: result.row_count,
            execution_time_ms: result.elapsed_ms,
            results: result.rows.clone(),
        })),
        ExecutionStatus::Failed(ref e) => Err(pipeline_failure(e, None)),
        ExecutionStatus::NotExecuted => Err(rejection(outcome)),
    }
}

/// Current schema as `{tables:[{name, columns:[{name,type,nullable}]}]}`.
pub async fn get_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiFailure> {
    let schema = state
        .pipeline
        .schema_manager()
        .refresh()
        .await
        .map_err(|e| {
            error!("Schema introspection failed: {}", e);
            pipeline_failure(&e, None)
        })?;

    let refreshed_at = state.pipeline.schema_manager().last_refreshed().await;

    let tables: Vec<Value> = schema
        .tables
        .iter()
        .map(|table| {
            serde_json::json!({
                "name": table.name,
                "columns": table.columns.iter().map(|column| {
                    serde_json::json!({
                        "name": column.name,
                        "type": column.declared_type,
                        "nullable": column.nullable,
                    })
                }).collect::<Vec<Value>>(),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "tables": tables,
        "refreshed_at": refreshed_at.to_rfc3339(),
    })))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database_connected = state.database_connected().await;
    let model_available = state.pipeline.llm().is_configured();

    let status = if database_connected && model_available {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database_connected,
        model_available,
        uptime_seconds: (chrono::Utc::now() - state.startup_time).num_seconds(),
    })
}
