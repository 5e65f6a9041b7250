use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::executor::{ExecutionResult, QueryExecutor};
use crate::db::schema_manager::SchemaManager;
use crate::error::PipelineError;
use crate::llm::models::{GenerationRequest, GenerationResult};
use crate::llm::{LlmManager, prompt};
use crate::validate::{self, ValidationOutcome};

/// How execution of one candidate ended.
#[derive(Debug)]
pub enum ExecutionStatus {
    /// Validation failed, so the executor was never invoked.
    NotExecuted,
    Succeeded(ExecutionResult),
    Failed(PipelineError),
}

/// Everything one question produced, for the serving layer and the
/// evaluator to report on.
#[derive(Debug)]
pub struct QueryOutcome {
    pub generated_sql: String,
    pub validation: ValidationOutcome,
    pub execution: ExecutionStatus,
}

/// The sequential question-to-results chain: introspect, prompt,
/// generate, validate, execute. Reentrant; the only shared state is the
/// read-only schema cache and the connection pool.
pub struct QueryPipeline {
    schema_manager: Arc<SchemaManager>,
    llm: Arc<LlmManager>,
    executor: QueryExecutor,
}

impl QueryPipeline {
    pub fn new(
        schema_manager: Arc<SchemaManager>,
        llm: Arc<LlmManager>,
        executor: QueryExecutor,
    ) -> Self {
        Self {
            schema_manager,
            llm,
            executor,
        }
    }

    /// Runs the full chain for one question. Errors out only before a
    /// candidate exists (schema or model failure); validation and
    /// execution failures are carried inside the outcome so callers can
    /// still report the generated SQL.
    pub async fn answer(&self, question: &str) -> Result<QueryOutcome, PipelineError> {
        let schema = self.schema_manager.current().await?;
        let request = GenerationRequest {
            question: question.to_string(),
            schema: Arc::clone(&schema),
        };

        let prompt_text = prompt::build_prompt(&request.question, &request.schema);
        let generation = self.llm.generate(&prompt_text).await?;
        debug!("Model raw output: {}", generation.raw_model_output);

        Ok(self.finish(&generation, &request).await)
    }

    async fn finish(
        &self,
        generation: &GenerationResult,
        request: &GenerationRequest,
    ) -> QueryOutcome {
        let validation = validate::validate(generation, &request.schema);
        let generated_sql = generation.extracted_sql().to_string();

        let normalized = match (&validation.verdict, &validation.normalized_sql) {
            (crate::validate::Verdict::Valid, Some(sql)) => sql.clone(),
            _ => {
                warn!(
                    "Rejected candidate ({:?}): {}",
                    validation.verdict,
                    validation.detail.as_deref().unwrap_or("")
                );
                return QueryOutcome {
                    generated_sql,
                    validation,
                    execution: ExecutionStatus::NotExecuted,
                };
            }
        };

        info!("Validated SQL: {}", normalized);
        let execution = match self.executor.run(&normalized).await {
            Ok(result) => ExecutionStatus::Succeeded(result),
            Err(e) => ExecutionStatus::Failed(e),
        };

        QueryOutcome {
            generated_sql,
            validation,
            execution,
        }
    }

    /// Validates and executes caller-supplied SQL without the generation
    /// stage. The same gate applies: nothing reaches the executor without
    /// a Valid verdict.
    pub async fn execute_sql(&self, sql: &str) -> Result<QueryOutcome, PipelineError> {
        let schema = self.schema_manager.current().await?;
        let validation = validate::validate_sql(sql, &schema);

        let normalized = match &validation.normalized_sql {
            Some(normalized) if validation.is_valid() => normalized.clone(),
            _ => {
                return Ok(QueryOutcome {
                    generated_sql: sql.to_string(),
                    validation,
                    execution: ExecutionStatus::NotExecuted,
                });
            }
        };

        let execution = match self.executor.run(&normalized).await {
            Ok(result) => ExecutionStatus::Succeeded(result),
            Err(e) => ExecutionStatus::Failed(e),
        };

        Ok(QueryOutcome {
            generated_sql: sql.to_string(),
            validation,
            execution,
        })
    }

    /// Runs trusted reference SQL directly. Used by the evaluator to
    /// obtain ground-truth rows from the gold query at evaluation time.
    pub async fn execute_trusted(&self, sql: &str) -> Result<ExecutionResult, PipelineError> {
        self.executor.run(sql.trim().trim_end_matches(';')).await
    }

    pub fn schema_manager(&self) -> &SchemaManager {
        &self.schema_manager
    }

    pub fn llm(&self) -> &LlmManager {
        &self.llm
    }
}
