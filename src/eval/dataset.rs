use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One labeled dataset sample: a Vietnamese question and its gold SQL.
#[derive(Debug, Clone, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub id: Option<String>,
    pub question: String,
    #[serde(alias = "query", alias = "gold_sql")]
    pub expected_sql: String,
}

impl Sample {
    /// Stable identifier: the dataset's own id, or the line position.
    pub fn id_or(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| index.to_string())
    }
}

/// Loads a newline-delimited JSON dataset, optionally capped at `limit`
/// samples. Blank lines are skipped; a malformed line is an error rather
/// than silently dropped data.
pub fn load_jsonl(path: &Path, limit: Option<usize>) -> std::io::Result<Vec<Sample>> {
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = serde_json::from_str(&line).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line {}: {}", line_no + 1, e),
            )
        })?;
        samples.push(sample);
        if let Some(limit) = limit {
            if samples.len() >= limit {
                break;
            }
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn loads_samples_with_field_aliases() {
        let file = write_dataset(&[
            r#"{"id":"s1","question":"Có bao nhiêu khách hàng?","expected_sql":"SELECT COUNT(*) FROM customers"}"#,
            r#"{"question":"Ai mua nhiều nhất?","query":"SELECT name FROM customers LIMIT 1"}"#,
        ]);
        let samples = load_jsonl(file.path(), None).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].id_or(0), "s1");
        assert_eq!(samples[1].id_or(1), "1");
        assert_eq!(
            samples[1].expected_sql,
            "SELECT name FROM customers LIMIT 1"
        );
    }

    #[test]
    fn limit_caps_the_sample_count() {
        let file = write_dataset(&[
            r#"{"question":"a","expected_sql":"SELECT 1"}"#,
            r#"{"question":"b","expected_sql":"SELECT 2"}"#,
            r#"{"question":"c","expected_sql":"SELECT 3"}"#,
        ]);
        let samples = load_jsonl(file.path(), Some(2)).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn malformed_lines_are_an_error() {
        let file = write_dataset(&[r#"{"question": "broken"#]);
        assert!(load_jsonl(file.path(), None).is_err());
    }
}
