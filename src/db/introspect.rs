use postgres::Client;
use std::collections::{HashMap, HashSet};

use crate::db::schema::{ColumnInfo, SchemaDescription, TableInfo};
use crate::error::PipelineError;

const COLUMNS_QUERY: &str = "
    SELECT c.table_name, c.column_name, c.data_type, c.is_nullable
    FROM information_schema.columns c
    JOIN information_schema.tables t
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
";

const PRIMARY_KEYS_QUERY: &str = "
    SELECT tc.table_name, kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_name = tc.constraint_name
     AND kcu.table_schema = tc.table_schema
    WHERE tc.table_schema = 'public' AND tc.constraint_type = 'PRIMARY KEY'
";

const FOREIGN_KEYS_QUERY: &str = "
    SELECT tc.table_name, kcu.column_name, ccu.table_name, ccu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_name = tc.constraint_name
     AND kcu.table_schema = tc.table_schema
    JOIN information_schema.constraint_column_usage ccu
      ON ccu.constraint_name = tc.constraint_name
     AND ccu.table_schema = tc.table_schema
    WHERE tc.table_schema = 'public' AND tc.constraint_type = 'FOREIGN KEY'
";

/// Reads the live catalog and builds a fresh SchemaDescription: every user
/// table in `public`, every column with declared type and nullability,
/// primary keys, and foreign-key edges.
pub fn introspect(client: &mut Client) -> Result<SchemaDescription, PipelineError> {
    let unavailable = |e: postgres::Error| PipelineError::SchemaUnavailable(e.to_string());

    let pk_rows = client.query(PRIMARY_KEYS_QUERY, &[]).map_err(unavailable)?;
    let mut primary_keys: HashSet<(String, String)> = HashSet::new();
    for row in &pk_rows {
        primary_keys.insert((row.get(0), row.get(1)));
    }

    let fk_rows = client.query(FOREIGN_KEYS_QUERY, &[]).map_err(unavailable)?;
    let mut foreign_keys: HashMap<(String, String), (String, String)> = HashMap::new();
    for row in &fk_rows {
        foreign_keys.insert((row.get(0), row.get(1)), (row.get(2), row.get(3)));
    }

    let col_rows = client.query(COLUMNS_QUERY, &[]).map_err(unavailable)?;

    let mut tables: Vec<TableInfo> = Vec::new();
    for row in &col_rows {
        let table_name: String = row.get(0);
        let column_name: String = row.get(1);
        let data_type: String = row.get(2);
        let is_nullable: String = row.get(3);

        if tables.last().map(|t| t.name.as_str()) != Some(table_name.as_str()) {
            tables.push(TableInfo {
                name: table_name.clone(),
                columns: Vec::new(),
            });
        }

        let key = (table_name.clone(), column_name.clone());
        let column = ColumnInfo {
            nullable: is_nullable == "YES",
            is_primary_key: primary_keys.contains(&key),
            references: foreign_keys.get(&key).cloned(),
            name: column_name,
            declared_type: data_type,
        };
        if let Some(table) = tables.last_mut() {
            table.columns.push(column);
        }
    }

    Ok(SchemaDescription { tables })
}
