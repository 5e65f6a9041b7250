use std::sync::Arc;

use crate::db::schema::SchemaDescription;

/// One generation request: the verbatim question plus the schema the
/// prompt was built from. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    pub schema: Arc<SchemaDescription>,
}

/// The single candidate statement extracted from a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlCandidate {
    /// Something statement-shaped was found.
    WellFormed(String),
    /// Nothing SQL-like could be extracted; carries the raw text.
    Malformed(String),
}

/// Output of the SQL generator, consumed only by the validator.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub raw_model_output: String,
    pub candidate: SqlCandidate,
}

impl GenerationResult {
    pub fn from_raw(raw: String) -> Self {
        let candidate = match extract_sql(&raw) {
            Some(sql) => SqlCandidate::WellFormed(sql),
            None => SqlCandidate::Malformed(raw.clone()),
        };
        Self {
            raw_model_output: raw,
            candidate,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(self.candidate, SqlCandidate::WellFormed(_))
    }

    /// The extracted statement, or "" when the response was malformed.
    pub fn extracted_sql(&self) -> &str {
        match &self.candidate {
            SqlCandidate::WellFormed(sql) => sql,
            SqlCandidate::Malformed(_) => "",
        }
    }
}

const SQL_HEADS: [&str; 9] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE",
];

/// Pulls a single SQL statement out of a model response: code fences and a
/// leading `sql` tag are stripped, surrounding prose is dropped by scanning
/// for a statement head, and only the first statement is kept when several
/// arrive separated by terminators. Destructive statement heads are
/// extracted too; the validator is the gate that rejects them.
fn extract_sql(content: &str) -> Option<String> {
    let mut text = content.trim();

    // ```sql ... ``` or bare ``` ... ``` fences.
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("sql").unwrap_or(after);
        text = match after.find("```") {
            Some(end) => after[..end].trim(),
            None => after.trim(),
        };
    }

    // A bare `sql` tag on its own, as some models emit without fences.
    if let Some(rest) = text.strip_prefix("sql\n") {
        text = rest.trim();
    }

    if starts_with_sql_head(text) {
        return Some(first_statement(text));
    }

    // Prose around the statement: scan for the first line that looks like
    // SQL and collect until the terminator.
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if starts_with_sql_head(line.trim()) {
            let mut sql = line.trim().to_string();
            if !sql.contains(';') {
                for next_line in &lines[i + 1..] {
                    let next = next_line.trim();
                    if next.is_empty() || next.starts_with("```") {
                        break;
                    }
                    sql.push(' ');
                    sql.push_str(next);
                    if next.ends_with(';') {
                        break;
                    }
                }
            }
            return Some(first_statement(&sql));
        }
    }

    None
}

fn starts_with_sql_head(text: &str) -> bool {
    let upper = text.trim_start().to_uppercase();
    SQL_HEADS
        .iter()
        .any(|head| upper.starts_with(head) && !upper[head.len()..].starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

/// Keeps everything up to the first statement terminator, dropping the
/// terminator itself and anything after it.
fn first_statement(sql: &str) -> String {
    match sql.find(';') {
        Some(idx) => sql[..idx].trim().to_string(),
        None => sql.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_sql_is_extracted() {
        let raw = "Here is the query:\n```sql\nSELECT COUNT(*) FROM customers;\n```\nHope that helps!";
        let result = GenerationResult::from_raw(raw.to_string());
        assert!(result.is_well_formed());
        assert_eq!(result.extracted_sql(), "SELECT COUNT(*) FROM customers");
    }

    #[test]
    fn bare_fences_without_language_tag() {
        let raw = "```\nSELECT name FROM customers\n```";
        let result = GenerationResult::from_raw(raw.to_string());
        assert_eq!(result.extracted_sql(), "SELECT name FROM customers");
    }

    #[test]
    fn raw_sql_passes_through() {
        let result = GenerationResult::from_raw("SELECT id FROM orders".to_string());
        assert_eq!(result.extracted_sql(), "SELECT id FROM orders");
    }

    #[test]
    fn only_first_statement_is_retained() {
        let raw = "SELECT id FROM orders; DROP TABLE orders;";
        let result = GenerationResult::from_raw(raw.to_string());
        assert_eq!(result.extracted_sql(), "SELECT id FROM orders");
    }

    #[test]
    fn prose_only_response_is_malformed() {
        let raw = "Tôi không thể trả lời câu hỏi này.";
        let result = GenerationResult::from_raw(raw.to_string());
        assert!(!result.is_well_formed());
        assert_eq!(result.extracted_sql(), "");
        assert_eq!(
            result.candidate,
            SqlCandidate::Malformed(raw.to_string())
        );
    }

    #[test]
    fn destructive_statements_are_still_extracted() {
        // The validator rejects these; extraction must not hide them.
        let result = GenerationResult::from_raw("DROP TABLE customers;".to_string());
        assert_eq!(result.extracted_sql(), "DROP TABLE customers");
    }

    #[test]
    fn multiline_sql_after_prose_is_collected() {
        let raw = "Sure! The answer is:\nSELECT name\nFROM customers\nWHERE id = 1;";
        let result = GenerationResult::from_raw(raw.to_string());
        assert_eq!(
            result.extracted_sql(),
            "SELECT name FROM customers WHERE id = 1"
        );
    }

    #[test]
    fn selecting_is_not_mistaken_for_a_statement_head() {
        let raw = "SELECTING data is not something I can do.";
        let result = GenerationResult::from_raw(raw.to_string());
        assert!(!result.is_well_formed());
    }
}
