use serde::Serialize;

/// Normalized description of the live database catalog.
///
/// Rebuilt wholesale from the catalog on refresh, never mutated in place.
/// Table names are unique; column names are unique within a table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    /// Foreign-key target as (table, column), when one exists.
    pub references: Option<(String, String)>,
}

impl SchemaDescription {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Case-insensitive table lookup.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// True when any table carries a column of this name. The validator's
    /// tie-break: an unqualified column is accepted if it resolves in at
    /// least one table.
    pub fn has_column(&self, name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)))
    }
}

#[cfg(test)]
pub(crate) fn fixture(tables: &[(&str, &[&str])]) -> SchemaDescription {
    SchemaDescription {
        tables: tables
            .iter()
            .map(|(name, cols)| TableInfo {
                name: (*name).to_string(),
                columns: cols
                    .iter()
                    .map(|c| ColumnInfo {
                        name: (*c).to_string(),
                        declared_type: "text".to_string(),
                        nullable: true,
                        is_primary_key: false,
                        references: None,
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_case_insensitive() {
        let schema = fixture(&[("Customers", &["Id", "Name"])]);
        assert!(schema.has_table("customers"));
        assert!(schema.has_table("CUSTOMERS"));
        assert!(!schema.has_table("orders"));
        assert!(schema.has_column("id"));
        assert!(schema.has_column("NAME"));
        assert!(!schema.has_column("email"));
    }

    #[test]
    fn empty_catalog_is_detected() {
        assert!(SchemaDescription::default().is_empty());
        assert!(!fixture(&[("t", &["c"])]).is_empty());
    }
}
