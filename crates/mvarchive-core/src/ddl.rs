//! `CREATE TABLE` synthesis from source column metadata.
//!
//! Column metadata in, one DDL statement out. Kept free of I/O so the
//! rendering rules can be tested directly.

use crate::error::{Error, Result};
use crate::models::ColumnDefinition;

/// Double-quote a PostgreSQL identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Render the SQL type for one column.
pub fn render_column_type(column: &ColumnDefinition) -> String {
    let data_type = column.data_type.as_str();
    match data_type {
        "character varying" | "character" | "bit" | "bit varying" => {
            match column.character_maximum_length {
                Some(len) => format!("{data_type}({len})"),
                None => data_type.to_string(),
            }
        }
        "numeric" | "decimal" => match (column.numeric_precision, column.numeric_scale) {
            (Some(p), Some(s)) => format!("numeric({p},{s})"),
            (Some(p), None) => format!("numeric({p})"),
            _ => "numeric".to_string(),
        },
        "ARRAY" => {
            let element = column.udt_name.strip_prefix('_').unwrap_or(&column.udt_name);
            format!("{}[]", element)
        }
        "USER-DEFINED" => column.udt_name.clone(),
        other => other.to_string(),
    }
}

/// Sequence-backed defaults reference objects that do not exist on the
/// destination; copied rows always carry explicit values.
fn keeps_default(default: &str) -> bool {
    !default.trim_start().to_ascii_lowercase().starts_with("nextval(")
}

fn render_column(column: &ColumnDefinition) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), render_column_type(column));
    sql.push_str(if column.is_nullable { " NULL" } else { " NOT NULL" });
    if let Some(default) = column.column_default.as_deref().filter(|d| keeps_default(d)) {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

/// Build a `CREATE TABLE` statement covering every column, in the order
/// given. Fails when `columns` is empty (the source table does not exist).
pub fn create_table_statement(
    schema: &str,
    table: &str,
    columns: &[ColumnDefinition],
) -> Result<String> {
    if columns.is_empty() {
        return Err(Error::schema(
            table,
            "source table not found or has no columns",
        ));
    }

    let mut parts: Vec<String> = columns.iter().map(render_column).collect();

    let key: Vec<String> = columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {}.{} ({})",
        quote_ident(schema),
        quote_ident(table),
        parts.join(", ")
    ))
}
