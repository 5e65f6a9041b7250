//! Offline batch evaluation of the generation pipeline against a labeled
//! dataset. Each sample runs the same chain the server uses, then the
//! generated SQL and its rows are scored against the gold SQL executed
//! live on the same database.

pub mod dataset;
pub mod report;

use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::db::executor::ExecutionResult;
use crate::eval::dataset::Sample;
use crate::eval::report::{EvalRecord, EvalSummary};
use crate::pipeline::{ExecutionStatus, QueryPipeline};

pub struct EvalOptions {
    pub concurrency: usize,
}

/// Evaluates every sample, writes one JSONL record each plus an aggregate
/// summary, and returns the summary. A sample whose model call fails is
/// recorded as a failure and the run continues; aggregation happens only
/// after every sample reaches a terminal state.
pub async fn run(
    pipeline: Arc<QueryPipeline>,
    samples: Vec<Sample>,
    options: &EvalOptions,
    out_path: &Path,
) -> std::io::Result<EvalSummary> {
    let total = samples.len();
    info!("Evaluating {} samples", total);

    // Shared admission limiter across concurrent samples; a stalled
    // provider cannot be hammered by the whole dataset at once.
    let limiter = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks: JoinSet<(usize, EvalRecord)> = JoinSet::new();

    for (index, sample) in samples.into_iter().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        let limiter = Arc::clone(&limiter);
        tasks.spawn(async move {
            let _permit = limiter.acquire_owned().await;
            let record = score_sample(&pipeline, &sample, index).await;
            (index, record)
        });
    }

    let mut slots: Vec<Option<EvalRecord>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, record)) => {
                info!(
                    "[{}/{}] id={} exact_match={} execution_success={} result_accurate={}",
                    index + 1,
                    total,
                    record.id,
                    record.exact_match,
                    record.execution_success,
                    record.result_accurate
                );
                slots[index] = Some(record);
            }
            Err(e) => error!("Evaluation task panicked: {}", e),
        }
    }

    let records: Vec<EvalRecord> = slots.into_iter().flatten().collect();
    let summary = EvalSummary::from_records(&records);

    report::write_records(out_path, &records)?;
    report::write_summary(&report::summary_path(out_path), &summary)?;

    Ok(summary)
}

/// Scores one sample: Pending -> Generated -> Validated -> Executed ->
/// Scored, terminating early with failure flags at whichever stage fails.
async fn score_sample(pipeline: &QueryPipeline, sample: &Sample, index: usize) -> EvalRecord {
    let start = Instant::now();
    let mut record = EvalRecord {
        id: sample.id_or(index),
        question: sample.question.clone(),
        expected_sql: sample.expected_sql.clone(),
        generated_sql: String::new(),
        select_only: false,
        sql_valid: false,
        exact_match: false,
        execution_success: false,
        result_accurate: false,
        elapsed_ms: 0.0,
        error: None,
    };

    let outcome = match pipeline.answer(&sample.question).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Quota exhaustion or an unreachable collaborator fails this
            // sample, not the run.
            record.error = Some(format!("{}: {}", e.kind(), e));
            record.elapsed_ms = elapsed_ms(start);
            return record;
        }
    };

    record.generated_sql = outcome.generated_sql.clone();
    record.select_only = is_select_shaped(&outcome.generated_sql);
    record.sql_valid = outcome.validation.is_valid();

    let comparable = outcome
        .validation
        .normalized_sql
        .clone()
        .unwrap_or_else(|| outcome.generated_sql.clone());
    record.exact_match =
        normalize_for_match(&comparable) == normalize_for_match(&sample.expected_sql);

    match outcome.execution {
        ExecutionStatus::Succeeded(result) => {
            record.execution_success = true;
            // Ground truth comes from the live database at evaluation
            // time, not a pre-recorded fixture.
            match pipeline.execute_trusted(&sample.expected_sql).await {
                Ok(expected) => {
                    record.result_accurate = rows_equivalent(&result, &expected);
                }
                Err(e) => {
                    record.error = Some(format!("gold query failed: {}", e));
                }
            }
        }
        ExecutionStatus::Failed(e) => {
            record.error = Some(format!("{}: {}", e.kind(), e));
        }
        ExecutionStatus::NotExecuted => {
            if let Some(detail) = &outcome.validation.detail {
                record.error = Some(detail.clone());
            }
        }
    }

    record.elapsed_ms = elapsed_ms(start);
    record
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Whether the model even produced a query-shaped statement, tracked
/// separately from full validation: a SELECT over a misspelled column is
/// select-only but not valid.
fn is_select_shaped(sql: &str) -> bool {
    let head = sql.trim_start().to_uppercase();
    head.starts_with("SELECT") || head.starts_with("WITH")
}

static WHITESPACE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").unwrap());

/// Case-, whitespace- and terminator-insensitive form for exact-match
/// comparison.
pub fn normalize_for_match(sql: &str) -> String {
    WHITESPACE
        .replace_all(sql.trim(), " ")
        .trim_end_matches(';')
        .trim()
        .to_lowercase()
}

/// Order-insensitive, type-coerced row comparison: each row becomes the
/// sorted multiset of its canonical values (generated and gold queries
/// routinely alias and order columns differently), and the rows
/// themselves are compared as a sorted multiset.
pub fn rows_equivalent(a: &ExecutionResult, b: &ExecutionResult) -> bool {
    if a.row_count != b.row_count {
        return false;
    }
    canonical_rows(&a.rows) == canonical_rows(&b.rows)
}

fn canonical_rows(rows: &[Map<String, Value>]) -> Vec<Vec<String>> {
    let mut canonical: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut values: Vec<String> = row.values().map(canonical_value).collect();
            values.sort();
            values
        })
        .collect();
    canonical.sort();
    canonical
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::Null => "\u{0}null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => canonical_number(n.as_f64()),
        Value::String(s) => match s.parse::<f64>() {
            Ok(f) if f.is_finite() => canonical_number(Some(f)),
            _ => s.clone(),
        },
        other => other.to_string(),
    }
}

fn canonical_number(n: Option<f64>) -> String {
    match n {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rows: Vec<Vec<(&str, Value)>>) -> ExecutionResult {
        let rows: Vec<Map<String, Value>> = rows
            .into_iter()
            .map(|cols| {
                cols.into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect()
            })
            .collect();
        ExecutionResult {
            row_count: rows.len(),
            rows,
            elapsed_ms: 0.0,
        }
    }

    #[test]
    fn select_shape_check_is_independent_of_validity() {
        assert!(is_select_shaped("SELECT nope FROM nowhere"));
        assert!(is_select_shaped("  with x as (select 1) select * from x"));
        assert!(!is_select_shaped("DROP TABLE customers"));
        assert!(!is_select_shaped(""));
    }

    #[test]
    fn normalization_ignores_case_whitespace_and_terminator() {
        assert_eq!(
            normalize_for_match("SELECT  *\nFROM customers ;"),
            normalize_for_match("select * from customers")
        );
        assert_ne!(
            normalize_for_match("SELECT name FROM customers"),
            normalize_for_match("SELECT email FROM customers")
        );
    }

    #[test]
    fn row_order_does_not_matter() {
        let a = result(vec![
            vec![("n", Value::from(1))],
            vec![("n", Value::from(2))],
        ]);
        let b = result(vec![
            vec![("n", Value::from(2))],
            vec![("n", Value::from(1))],
        ]);
        assert!(rows_equivalent(&a, &b));
    }

    #[test]
    fn numeric_text_and_numbers_coerce_together() {
        let a = result(vec![vec![("count", Value::from(5))]]);
        let b = result(vec![vec![("total", Value::String("5.0".to_string()))]]);
        assert!(rows_equivalent(&a, &b));
    }

    #[test]
    fn column_names_are_ignored_but_values_are_not() {
        let a = result(vec![vec![("x", Value::from(1)), ("y", Value::from(2))]]);
        let b = result(vec![vec![("p", Value::from(2)), ("q", Value::from(1))]]);
        assert!(rows_equivalent(&a, &b));

        let c = result(vec![vec![("p", Value::from(2)), ("q", Value::from(3))]]);
        assert!(!rows_equivalent(&a, &c));
    }

    #[test]
    fn differing_row_counts_never_match() {
        let a = result(vec![vec![("n", Value::from(1))]]);
        let b = result(vec![]);
        assert!(!rows_equivalent(&a, &b));
    }

    #[test]
    fn null_is_distinct_from_the_string_null() {
        let a = result(vec![vec![("n", Value::Null)]]);
        let b = result(vec![vec![("n", Value::String("null".to_string()))]]);
        assert!(!rows_equivalent(&a, &b));
    }
}
