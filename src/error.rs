use std::error::Error;
use std::fmt;

/// Every failure the question-to-results pipeline can produce.
///
/// Validation failures short-circuit before execution and are reported as
/// structured responses; external-dependency failures are recoverable per
/// request but never retried here.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// The database catalog could not be read.
    SchemaUnavailable(String),
    /// The generative model could not be reached (network, auth, quota).
    ModelUnavailable(String),
    /// The generative model produced no response within the bounded wait.
    ModelTimeout,
    /// The candidate SQL did not parse.
    InvalidSyntax(String),
    /// The candidate SQL is not a single read-only SELECT.
    DisallowedStatementType(String),
    /// The candidate SQL references a table or column not in the schema.
    UnknownSchemaReference(String),
    /// The database cancelled the statement at the configured timeout.
    ExecutionTimeout,
    /// The database reported a runtime error while executing.
    ExecutionError(String),
}

impl PipelineError {
    /// Stable machine-readable tag for API responses and eval records.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SchemaUnavailable(_) => "schema_unavailable",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::ModelTimeout => "model_timeout",
            PipelineError::InvalidSyntax(_) => "invalid_syntax",
            PipelineError::DisallowedStatementType(_) => "disallowed_statement_type",
            PipelineError::UnknownSchemaReference(_) => "unknown_schema_reference",
            PipelineError::ExecutionTimeout => "execution_timeout",
            PipelineError::ExecutionError(_) => "execution_error",
        }
    }

    /// True for failures of an external collaborator rather than of the
    /// candidate SQL itself.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            PipelineError::SchemaUnavailable(_)
                | PipelineError::ModelUnavailable(_)
                | PipelineError::ModelTimeout
                | PipelineError::ExecutionTimeout
                | PipelineError::ExecutionError(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SchemaUnavailable(msg) => {
                write!(f, "database schema unavailable: {}", msg)
            }
            PipelineError::ModelUnavailable(msg) => {
                write!(f, "generative model unavailable: {}", msg)
            }
            PipelineError::ModelTimeout => write!(f, "generative model timed out"),
            PipelineError::InvalidSyntax(msg) => write!(f, "SQL does not parse: {}", msg),
            PipelineError::DisallowedStatementType(msg) => {
                write!(f, "statement type not allowed: {}", msg)
            }
            PipelineError::UnknownSchemaReference(msg) => {
                write!(f, "unknown schema reference: {}", msg)
            }
            PipelineError::ExecutionTimeout => write!(f, "query execution timed out"),
            PipelineError::ExecutionError(msg) => write!(f, "query execution failed: {}", msg),
        }
    }
}

impl Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_tags() {
        let cases = [
            (
                PipelineError::SchemaUnavailable("x".into()),
                "schema_unavailable",
            ),
            (
                PipelineError::ModelUnavailable("x".into()),
                "model_unavailable",
            ),
            (PipelineError::ModelTimeout, "model_timeout"),
            (PipelineError::InvalidSyntax("x".into()), "invalid_syntax"),
            (
                PipelineError::DisallowedStatementType("x".into()),
                "disallowed_statement_type",
            ),
            (
                PipelineError::UnknownSchemaReference("x".into()),
                "unknown_schema_reference",
            ),
            (PipelineError::ExecutionTimeout, "execution_timeout"),
            (PipelineError::ExecutionError("x".into()), "execution_error"),
        ];
        for (err, tag) in cases {
            assert_eq!(err.kind(), tag);
        }
    }

    #[test]
    fn validation_failures_are_not_external() {
        assert!(!PipelineError::InvalidSyntax("x".into()).is_external());
        assert!(!PipelineError::DisallowedStatementType("x".into()).is_external());
        assert!(!PipelineError::UnknownSchemaReference("x".into()).is_external());
        assert!(PipelineError::ModelTimeout.is_external());
        assert!(PipelineError::ExecutionError("x".into()).is_external());
    }
}
