use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One evaluated dataset sample. Appended to the output log and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct EvalRecord {
    pub id: String,
    pub question: String,
    pub expected_sql: String,
    pub generated_sql: String,
    /// The candidate is a read-only query by shape, before full validation.
    pub select_only: bool,
    pub sql_valid: bool,
    pub exact_match: bool,
    pub execution_success: bool,
    pub result_accurate: bool,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wholesale reduction over a finished run. Rates are None for an empty
/// dataset (serde_json cannot carry NaN, so undefined serializes as null).
#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub total: usize,
    pub select_only: usize,
    pub sql_valid: usize,
    pub exact_matches: usize,
    pub execution_successes: usize,
    pub result_accurate: usize,
    pub errors: usize,
    pub select_only_rate: Option<f64>,
    pub validity_rate: Option<f64>,
    pub exact_match_rate: Option<f64>,
    pub execution_success_rate: Option<f64>,
    pub result_accuracy_rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
}

impl EvalSummary {
    pub fn from_records(records: &[EvalRecord]) -> Self {
        let total = records.len();
        let select_only = records.iter().filter(|r| r.select_only).count();
        let sql_valid = records.iter().filter(|r| r.sql_valid).count();
        let exact_matches = records.iter().filter(|r| r.exact_match).count();
        let execution_successes = records.iter().filter(|r| r.execution_success).count();
        let result_accurate = records.iter().filter(|r| r.result_accurate).count();
        let errors = records.iter().filter(|r| r.error.is_some()).count();

        let rate = |count: usize| (total > 0).then(|| count as f64 / total as f64);
        let avg_latency_ms = (total > 0)
            .then(|| records.iter().map(|r| r.elapsed_ms).sum::<f64>() / total as f64);

        Self {
            total,
            select_only,
            sql_valid,
            exact_matches,
            execution_successes,
            result_accurate,
            errors,
            select_only_rate: rate(select_only),
            validity_rate: rate(sql_valid),
            exact_match_rate: rate(exact_matches),
            execution_success_rate: rate(execution_successes),
            result_accuracy_rate: rate(result_accurate),
            avg_latency_ms,
        }
    }
}

/// One JSON record per line, freshly created per run.
pub fn write_records(path: &Path, records: &[EvalRecord]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

pub fn write_summary(path: &Path, summary: &EvalSummary) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

pub fn summary_path(records_path: &Path) -> PathBuf {
    let mut name = records_path.as_os_str().to_os_string();
    name.push(".summary.json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(exact: bool, executed: bool) -> EvalRecord {
        EvalRecord {
            id: "1".to_string(),
            question: "q".to_string(),
            expected_sql: "SELECT 1".to_string(),
            generated_sql: "SELECT 1".to_string(),
            select_only: true,
            sql_valid: true,
            exact_match: exact,
            execution_success: executed,
            result_accurate: executed,
            elapsed_ms: 10.0,
            error: None,
        }
    }

    #[test]
    fn rates_are_exact_fractions() {
        let records: Vec<EvalRecord> = (0..10).map(|i| record(i < 3, i < 7)).collect();
        let summary = EvalSummary::from_records(&records);
        assert_eq!(summary.total, 10);
        assert_eq!(summary.exact_matches, 3);
        assert!((summary.exact_match_rate.unwrap() - 0.3).abs() < 1e-12);
        assert!((summary.execution_success_rate.unwrap() - 0.7).abs() < 1e-12);
        assert!((summary.avg_latency_ms.unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn failed_samples_still_count_toward_the_total() {
        let mut records: Vec<EvalRecord> = (0..5).map(|_| record(true, true)).collect();
        records[2].error = Some("model_unavailable: quota".to_string());
        records[2].sql_valid = false;
        records[2].select_only = false;
        records[2].exact_match = false;
        records[2].execution_success = false;
        records[2].result_accurate = false;

        let summary = EvalSummary::from_records(&records);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.execution_successes, 4);
        assert!((summary.execution_success_rate.unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn empty_run_reports_undefined_rates() {
        let summary = EvalSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.exact_match_rate, None);
        assert_eq!(summary.avg_latency_ms, None);

        // Undefined, not zero and not a crash, in the serialized form too.
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["exact_match_rate"].is_null());
    }

    #[test]
    fn records_serialize_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let records = vec![record(true, true), record(false, false)];
        write_records(&path, &records).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["exact_match"], serde_json::Value::Bool(true));
    }

    #[test]
    fn summary_path_appends_suffix() {
        assert_eq!(
            summary_path(Path::new("results/run.jsonl")),
            PathBuf::from("results/run.jsonl.summary.json")
        );
    }
}
