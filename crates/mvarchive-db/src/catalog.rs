//! Catalog introspection shared by the source and destination stores.

use sqlx::PgPool;

use mvarchive_core::{quote_ident, ColumnDefinition, Result};

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Column metadata for a table, ordered by ordinal position.
///
/// Returns an empty list when the table does not exist.
pub async fn table_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnDefinition>> {
    let columns = sqlx::query_as::<_, ColumnDefinition>(
        r#"
        SELECT
            c.column_name::text AS name,
            c.data_type::text AS data_type,
            c.udt_name::text AS udt_name,
            (c.is_nullable = 'YES') AS is_nullable,
            c.character_maximum_length::int4 AS character_maximum_length,
            c.numeric_precision::int4 AS numeric_precision,
            c.numeric_scale::int4 AS numeric_scale,
            c.column_default::text AS column_default,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage k
                    ON k.constraint_schema = tc.constraint_schema
                    AND k.constraint_name = tc.constraint_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = c.table_schema
                    AND tc.table_name = c.table_name
                    AND k.column_name = c.column_name
            ) AS is_primary_key
        FROM information_schema.columns c
        WHERE c.table_schema = $1
            AND c.table_name = $2
        ORDER BY c.ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(columns)
}

/// Column names only, ordered by ordinal position.
pub async fn column_names(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = $1
            AND table_name = $2
        ORDER BY ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(names)
}

/// Whether a base table exists.
pub async fn table_exists(pool: &PgPool, schema: &str, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM information_schema.tables
            WHERE table_schema = $1
                AND table_name = $2
        )
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_quotes_both_parts() {
        assert_eq!(qualified("public", "BundleItems"), "\"public\".\"BundleItems\"");
    }
}
