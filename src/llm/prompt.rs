use crate::db::schema::SchemaDescription;

/// Builds the model prompt for one question.
///
/// Pure and deterministic: identical `(question, schema)` pairs yield
/// byte-identical prompts, which reproducible evaluation depends on. The
/// question is embedded verbatim (questions are typically Vietnamese).
pub fn build_prompt(question: &str, schema: &SchemaDescription) -> String {
    format!(
        r#"You are a PostgreSQL expert.
Based on the schema below, write ONE SQL SELECT query that answers the question.

Rules:
- Only return raw SQL
- Exactly one statement
- No explanation
- No markdown
- Never write INSERT, UPDATE, DELETE, DROP, ALTER, TRUNCATE or any other data-modifying statement

SCHEMA:
{}

QUESTION:
{}

SQL:
"#,
        render_schema(schema),
        question
    )
}

/// Compact textual schema rendering: table name followed by its columns
/// with types, nullability and key information.
pub fn render_schema(schema: &SchemaDescription) -> String {
    let mut lines = Vec::new();
    for table in &schema.tables {
        lines.push(format!("Table {}:", table.name));
        for column in &table.columns {
            let mut notes = vec![column.declared_type.clone()];
            if !column.nullable {
                notes.push("not null".to_string());
            }
            if column.is_primary_key {
                notes.push("primary key".to_string());
            }
            if let Some((ref_table, ref_column)) = &column.references {
                notes.push(format!("references {}.{}", ref_table, ref_column));
            }
            lines.push(format!("  - {} ({})", column.name, notes.join(", ")));
        }
    }
    lines.join("\n")
}
