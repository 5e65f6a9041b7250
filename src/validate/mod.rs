//! Parser-based SQL validation.
//!
//! The candidate statement is accepted only if it parses, is exactly one
//! read-only query, and references nothing outside the introspected
//! schema. Identifier checks walk the parse tree rather than matching
//! text, so SQL hidden in comments or multi-statement payloads cannot
//! slip through. This is an allow-list filter, not a query planner:
//! an ambiguous column resolves if it exists in at least one table.

use sqlparser::ast::{
    Expr, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor, visit_expressions,
    visit_relations,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;
use std::ops::ControlFlow;

use crate::db::schema::SchemaDescription;
use crate::llm::models::{GenerationResult, SqlCandidate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    InvalidSyntax,
    DisallowedStatementType,
    UnknownSchemaReference,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub verdict: Verdict,
    /// Canonical rendering of the accepted statement, for execution and
    /// downstream exact-match comparison. Present only when Valid.
    pub normalized_sql: Option<String>,
    pub detail: Option<String>,
}

impl ValidationOutcome {
    fn valid(normalized_sql: String) -> Self {
        Self {
            verdict: Verdict::Valid,
            normalized_sql: Some(normalized_sql),
            detail: None,
        }
    }

    fn rejected(verdict: Verdict, detail: impl Into<String>) -> Self {
        Self {
            verdict,
            normalized_sql: None,
            detail: Some(detail.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verdict == Verdict::Valid
    }
}

/// Names introduced by the statement itself rather than the schema:
/// CTE and derived-table names, plus select-list and table-column
/// aliases. These are exempt from schema-reference checks.
#[derive(Default)]
struct LocalNames {
    relations: BTreeSet<String>,
    columns: BTreeSet<String>,
    has_into: bool,
    has_locks: bool,
    /// A data-modifying body reached through `Statement::Query`: PostgreSQL
    /// allows `WITH ... INSERT`/`UPDATE`/`DELETE`, which sqlparser models as
    /// a query whose body is not a plain SELECT.
    has_dml: bool,
}

pub fn validate(result: &GenerationResult, schema: &SchemaDescription) -> ValidationOutcome {
    let sql = match &result.candidate {
        SqlCandidate::WellFormed(sql) => sql,
        SqlCandidate::Malformed(_) => {
            return ValidationOutcome::rejected(
                Verdict::InvalidSyntax,
                "no SQL statement could be extracted from the model response",
            );
        }
    };
    validate_sql(sql, schema)
}

pub fn validate_sql(sql: &str, schema: &SchemaDescription) -> ValidationOutcome {
    let statements = match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => return ValidationOutcome::rejected(Verdict::InvalidSyntax, e.to_string()),
    };

    let statement = match statements.as_slice() {
        [] => {
            return ValidationOutcome::rejected(Verdict::InvalidSyntax, "empty statement");
        }
        [statement] => statement,
        _ => {
            // A second statement behind a terminator is exactly the
            // payload this gate exists to stop.
            return ValidationOutcome::rejected(
                Verdict::DisallowedStatementType,
                "multiple statements are not allowed",
            );
        }
    };

    let query = match statement {
        Statement::Query(query) => query,
        other => {
            return ValidationOutcome::rejected(
                Verdict::DisallowedStatementType,
                format!("only SELECT is allowed, got: {}", statement_head(other)),
            );
        }
    };

    let mut local = LocalNames::default();
    harvest_query(query, &mut local);

    // Subqueries inside expressions (EXISTS, IN, scalar) introduce their
    // own local names too.
    let _ = visit_expressions(statement, |expr: &Expr| {
        match expr {
            Expr::Subquery(q) => harvest_query(q, &mut local),
            Expr::InSubquery { subquery, .. } => harvest_query(subquery, &mut local),
            Expr::Exists { subquery, .. } => harvest_query(subquery, &mut local),
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });

    if local.has_dml {
        return ValidationOutcome::rejected(
            Verdict::DisallowedStatementType,
            "data-modifying statement inside a query body",
        );
    }
    if local.has_into {
        return ValidationOutcome::rejected(
            Verdict::DisallowedStatementType,
            "SELECT INTO creates a table",
        );
    }
    if local.has_locks {
        return ValidationOutcome::rejected(
            Verdict::DisallowedStatementType,
            "locking clauses are not allowed",
        );
    }

    // Every referenced relation must be a schema table or a name the
    // statement introduced itself.
    let mut unknown_table: Option<String> = None;
    let _ = visit_relations(statement, |relation: &ObjectName| {
        let name = relation_name(relation);
        if !local.relations.contains(&name) && !schema.has_table(&name) {
            if unknown_table.is_none() {
                unknown_table = Some(name);
            }
        }
        ControlFlow::<()>::Continue(())
    });
    if let Some(table) = unknown_table {
        return ValidationOutcome::rejected(
            Verdict::UnknownSchemaReference,
            format!("unknown table: {}", table),
        );
    }

    let mut unknown_column: Option<String> = None;
    let _ = visit_expressions(statement, |expr: &Expr| {
        let column = match expr {
            Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
            // The qualifier may be a table alias; only the final segment
            // names a column.
            Expr::CompoundIdentifier(parts) => {
                parts.last().map(|ident| ident.value.to_lowercase())
            }
            _ => None,
        };
        if let Some(column) = column {
            if !local.columns.contains(&column)
                && !local.relations.contains(&column)
                && !schema.has_column(&column)
                && unknown_column.is_none()
            {
                unknown_column = Some(column);
            }
        }
        ControlFlow::<()>::Continue(())
    });
    if let Some(column) = unknown_column {
        return ValidationOutcome::rejected(
            Verdict::UnknownSchemaReference,
            format!("unknown column: {}", column),
        );
    }

    ValidationOutcome::valid(statement.to_string())
}

fn statement_head(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase()
}

fn relation_name(relation: &ObjectName) -> String {
    relation
        .0
        .last()
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default()
}

fn harvest_query(query: &Query, local: &mut LocalNames) {
    if !query.locks.is_empty() {
        local.has_locks = true;
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            local.relations.insert(cte.alias.name.value.to_lowercase());
            for column in &cte.alias.columns {
                local.columns.insert(column.value.to_lowercase());
            }
            harvest_query(&cte.query, local);
        }
    }
    harvest_set_expr(&query.body, local);
}

fn harvest_set_expr(body: &SetExpr, local: &mut LocalNames) {
    match body {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                local.has_into = true;
            }
            for item in &select.projection {
                if let SelectItem::ExprWithAlias { alias, .. } = item {
                    local.columns.insert(alias.value.to_lowercase());
                }
            }
            for table_with_joins in &select.from {
                harvest_table_factor(&table_with_joins.relation, local);
                for join in &table_with_joins.joins {
                    harvest_table_factor(&join.relation, local);
                }
            }
        }
        SetExpr::Query(query) => harvest_query(query, local),
        SetExpr::SetOperation { left, right, .. } => {
            harvest_set_expr(left, local);
            harvest_set_expr(right, local);
        }
        SetExpr::Values(_) | SetExpr::Table(_) => {}
        // Insert, Update and anything else statement-shaped mutates.
        _ => local.has_dml = true,
    }
}

fn harvest_table_factor(factor: &TableFactor, local: &mut LocalNames) {
    match factor {
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            if let Some(alias) = alias {
                local.relations.insert(alias.name.value.to_lowercase());
                for column in &alias.columns {
                    local.columns.insert(column.value.to_lowercase());
                }
            }
            harvest_query(subquery, local);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            harvest_table_factor(&table_with_joins.relation, local);
            for join in &table_with_joins.joins {
                harvest_table_factor(&join.relation, local);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::fixture;

    fn schema() -> SchemaDescription {
        fixture(&[
            ("customers", &["id", "name", "email"]),
            ("orders", &["id", "customer_id", "total"]),
        ])
    }

    fn check(sql: &str) -> ValidationOutcome {
        validate_sql(sql, &schema())
    }

    #[test]
    fn simple_select_is_valid() {
        let outcome = check("SELECT COUNT(*) FROM customers;");
        assert!(outcome.is_valid());
        assert_eq!(
            outcome.normalized_sql.as_deref(),
            Some("SELECT COUNT(*) FROM customers")
        );
    }

    #[test]
    fn data_modifying_statements_are_never_valid() {
        let payloads = [
            "INSERT INTO customers (name) VALUES ('x')",
            "UPDATE customers SET name = 'x'",
            "DELETE FROM customers",
            "DROP TABLE customers",
            "ALTER TABLE customers ADD COLUMN x text",
            "TRUNCATE TABLE customers",
            "CREATE TABLE evil (id int)",
        ];
        for payload in payloads {
            let outcome = check(payload);
            assert_eq!(
                outcome.verdict,
                Verdict::DisallowedStatementType,
                "payload accepted: {}",
                payload
            );
        }
    }

    #[test]
    fn dml_behind_a_cte_prologue_is_rejected() {
        // These parse as Statement::Query; the body, not the statement
        // head, carries the mutation.
        let outcome =
            check("WITH a AS (SELECT id FROM customers) INSERT INTO customers (name) VALUES ('x')");
        assert_eq!(outcome.verdict, Verdict::DisallowedStatementType);

        let outcome =
            check("WITH a AS (SELECT id FROM customers) UPDATE customers SET name = 'x'");
        assert_eq!(outcome.verdict, Verdict::DisallowedStatementType);
    }

    #[test]
    fn hidden_second_statement_is_rejected() {
        let outcome = check("SELECT id FROM customers; DROP TABLE customers");
        assert_eq!(outcome.verdict, Verdict::DisallowedStatementType);
    }

    #[test]
    fn trailing_terminator_alone_is_fine() {
        assert!(check("SELECT id FROM customers;").is_valid());
    }

    #[test]
    fn semicolon_inside_a_string_literal_is_not_a_separator() {
        assert!(check("SELECT id FROM customers WHERE name = 'a;b'").is_valid());
    }

    #[test]
    fn select_into_is_rejected() {
        let outcome = check("SELECT id INTO stolen FROM customers");
        assert_eq!(outcome.verdict, Verdict::DisallowedStatementType);
    }

    #[test]
    fn locking_clauses_are_rejected() {
        let outcome = check("SELECT id FROM customers FOR UPDATE");
        assert_eq!(outcome.verdict, Verdict::DisallowedStatementType);
    }

    #[test]
    fn unknown_table_is_rejected() {
        let outcome = check("SELECT * FROM nonexistent_table");
        assert_eq!(outcome.verdict, Verdict::UnknownSchemaReference);
        assert!(outcome.detail.as_deref().unwrap().contains("nonexistent_table"));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let outcome = check("SELECT salary FROM customers");
        assert_eq!(outcome.verdict, Verdict::UnknownSchemaReference);
    }

    #[test]
    fn unknown_table_in_join_is_rejected() {
        let outcome =
            check("SELECT c.name FROM customers c JOIN payments p ON p.customer_id = c.id");
        assert_eq!(outcome.verdict, Verdict::UnknownSchemaReference);
    }

    #[test]
    fn unknown_table_in_subquery_is_rejected() {
        let outcome = check(
            "SELECT name FROM customers WHERE id IN (SELECT customer_id FROM audit_log)",
        );
        assert_eq!(outcome.verdict, Verdict::UnknownSchemaReference);
    }

    #[test]
    fn gibberish_is_invalid_syntax() {
        let outcome = check("SELEKT blah blah");
        assert_eq!(outcome.verdict, Verdict::InvalidSyntax);
    }

    #[test]
    fn malformed_candidate_is_invalid_syntax() {
        let result = GenerationResult::from_raw("I cannot answer that.".to_string());
        let outcome = validate(&result, &schema());
        assert_eq!(outcome.verdict, Verdict::InvalidSyntax);
    }

    #[test]
    fn joins_with_aliases_are_valid() {
        assert!(
            check(
                "SELECT c.name, o.total FROM customers c \
                 JOIN orders o ON o.customer_id = c.id WHERE o.total > 100"
            )
            .is_valid()
        );
    }

    #[test]
    fn select_list_alias_used_in_order_by_is_valid() {
        assert!(check("SELECT COUNT(*) AS n FROM orders GROUP BY customer_id ORDER BY n").is_valid());
    }

    #[test]
    fn cte_names_are_not_schema_references() {
        assert!(
            check(
                "WITH big AS (SELECT customer_id, total FROM orders WHERE total > 100) \
                 SELECT customer_id FROM big"
            )
            .is_valid()
        );
    }

    #[test]
    fn ambiguous_column_resolving_in_one_table_is_accepted() {
        // `id` exists in both tables; the gate accepts without binding.
        assert!(check("SELECT id FROM customers").is_valid());
    }

    #[test]
    fn validation_is_idempotent() {
        let result = GenerationResult::from_raw("SELECT name FROM customers".to_string());
        let first = validate(&result, &schema());
        let second = validate(&result, &schema());
        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.normalized_sql, second.normalized_sql);
    }

    #[test]
    fn normalization_canonicalizes_whitespace() {
        let outcome = check("select   name\n  from    customers");
        assert!(outcome.is_valid());
        assert_eq!(
            outcome.normalized_sql.as_deref(),
            Some("SELECT name FROM customers")
        );
    }

    #[test]
    fn keyword_in_comment_does_not_bypass_the_gate() {
        // The parse tree, not the text, decides the statement type.
        assert!(check("SELECT name /* DROP TABLE customers */ FROM customers").is_valid());
        let outcome = check("/* harmless */ DROP TABLE customers");
        assert_eq!(outcome.verdict, Verdict::DisallowedStatementType);
    }
}
