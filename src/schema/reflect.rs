//! Reflect tables, views, columns and keys of one PostgreSQL schema from `pg_catalog`.

use crate::error::ConfigError;
use crate::schema::types::{ColumnDescriptor, ForeignKeyDescriptor, LogicalType, TableDescriptor, TableKind};
use sqlx::PgPool;
use std::collections::HashMap;

const RELATIONS_SQL: &str = r#"
SELECT c.relname::text AS name, c.relkind::text AS kind
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relkind IN ('r', 'p', 'f', 'v', 'm')
ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT c.relname::text AS table_name,
       a.attname::text AS column_name,
       pg_catalog.format_type(a.atttypid, a.atttypmod) AS native_type,
       pg_catalog.format_type(COALESCE(bt.oid, t.oid), -1) AS cast_type,
       COALESCE(bt.typname, t.typname)::text AS udt_name,
       COALESCE(bt.typtype, t.typtype)::text AS type_kind,
       NOT a.attnotnull AS nullable,
       (a.atthasdef OR a.attidentity <> '' OR a.attgenerated <> '') AS has_default,
       (a.attidentity <> '' OR a.attgenerated <> ''
          OR COALESCE(pg_catalog.pg_get_expr(d.adbin, d.adrelid) LIKE 'nextval(%', false)) AS server_generated,
       CASE WHEN COALESCE(bt.typname, t.typname) IN ('varchar', 'bpchar')
                 AND COALESCE(NULLIF(t.typtypmod, -1), a.atttypmod) > 4
            THEN COALESCE(NULLIF(t.typtypmod, -1), a.atttypmod) - 4 END AS max_length,
       ARRAY(SELECT e.enumlabel::text FROM pg_catalog.pg_enum e
             WHERE e.enumtypid = COALESCE(bt.oid, t.oid)
             ORDER BY e.enumsortorder) AS enum_values
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
LEFT JOIN pg_catalog.pg_type bt ON t.typtype = 'd' AND bt.oid = t.typbasetype
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = $1 AND c.relkind IN ('r', 'p', 'f', 'v', 'm')
  AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY c.relname, a.attnum
"#;

const KEYS_SQL: &str = r#"
SELECT c.relname::text AS table_name,
       con.conname::text AS constraint_name,
       con.contype::text AS constraint_type,
       a.attname::text AS column_name
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
WHERE n.nspname = $1 AND con.contype IN ('p', 'u')
ORDER BY c.relname, con.conname, k.ord
"#;

const FOREIGN_KEYS_SQL: &str = r#"
SELECT c.relname::text AS table_name,
       la.attname::text AS column_name,
       rc.relname::text AS referenced_table,
       ra.attname::text AS referenced_column
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
JOIN pg_catalog.pg_attribute la ON la.attrelid = con.conrelid AND la.attnum = con.conkey[1]
JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = con.confkey[1]
WHERE n.nspname = $1 AND rn.nspname = $1 AND con.contype = 'f'
  AND cardinality(con.conkey) = 1
ORDER BY c.relname, con.conname
"#;

#[derive(Debug, sqlx::FromRow)]
pub struct RelationRow {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub native_type: String,
    pub cast_type: String,
    pub udt_name: String,
    pub type_kind: String,
    pub nullable: bool,
    pub has_default: bool,
    pub server_generated: bool,
    pub max_length: Option<i32>,
    pub enum_values: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct KeyRow {
    pub table_name: String,
    pub constraint_name: String,
    pub constraint_type: String,
    pub column_name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ForeignKeyRow {
    pub table_name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Read the catalog of `schema` and build one descriptor per usable table or view.
/// Fails only on query errors or when nothing usable remains.
pub async fn reflect(pool: &PgPool, schema: &str) -> Result<Vec<TableDescriptor>, ConfigError> {
    tracing::debug!(schema, "reflecting schema");
    let relations = sqlx::query_as::<_, RelationRow>(RELATIONS_SQL)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(ConfigError::Reflection)?;
    let columns = sqlx::query_as::<_, ColumnRow>(COLUMNS_SQL)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(ConfigError::Reflection)?;
    let keys = sqlx::query_as::<_, KeyRow>(KEYS_SQL)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(ConfigError::Reflection)?;
    let foreign_keys = sqlx::query_as::<_, ForeignKeyRow>(FOREIGN_KEYS_SQL)
        .bind(schema)
        .fetch_all(pool)
        .await
        .map_err(ConfigError::Reflection)?;

    let tables = assemble(schema, relations, columns, keys, foreign_keys);
    if tables.is_empty() {
        return Err(ConfigError::EmptySchema(schema.to_string()));
    }
    tracing::info!(schema, tables = tables.len(), "schema reflected");
    Ok(tables)
}

/// Group catalog rows into descriptors. Relations that cannot be exposed are skipped with a warning.
pub fn assemble(
    schema: &str,
    relations: Vec<RelationRow>,
    columns: Vec<ColumnRow>,
    keys: Vec<KeyRow>,
    foreign_keys: Vec<ForeignKeyRow>,
) -> Vec<TableDescriptor> {
    let mut columns_by_table: HashMap<String, Vec<ColumnDescriptor>> = HashMap::new();
    for row in columns {
        let logical_type = LogicalType::from_pg(&row.udt_name, &row.type_kind);
        columns_by_table.entry(row.table_name).or_default().push(ColumnDescriptor {
            name: row.column_name,
            logical_type,
            native_type: row.native_type,
            cast_type: row.cast_type,
            nullable: row.nullable,
            has_default: row.has_default,
            server_generated: row.server_generated,
            max_length: row.max_length.and_then(|n| u32::try_from(n).ok()),
            allowed_values: row.enum_values,
        });
    }

    let mut pk_by_table: HashMap<String, Vec<String>> = HashMap::new();
    let mut unique_by_table: HashMap<String, Vec<(String, Vec<String>)>> = HashMap::new();
    for row in keys {
        if row.constraint_type == "p" {
            pk_by_table.entry(row.table_name).or_default().push(row.column_name);
            continue;
        }
        let groups = unique_by_table.entry(row.table_name).or_default();
        match groups.last_mut() {
            Some((name, cols)) if *name == row.constraint_name => cols.push(row.column_name),
            _ => groups.push((row.constraint_name, vec![row.column_name])),
        }
    }

    let mut fks_by_table: HashMap<String, Vec<ForeignKeyDescriptor>> = HashMap::new();
    for row in foreign_keys {
        fks_by_table.entry(row.table_name).or_default().push(ForeignKeyDescriptor {
            column: row.column_name,
            referenced_table: row.referenced_table,
            referenced_column: row.referenced_column,
        });
    }

    let mut tables = Vec::with_capacity(relations.len());
    for rel in relations {
        let kind = match rel.kind.as_str() {
            "v" | "m" => TableKind::View,
            _ => TableKind::Table,
        };
        let Some(columns) = columns_by_table.remove(&rel.name) else {
            tracing::warn!(table = %rel.name, "skipping relation without columns");
            continue;
        };
        let table = TableDescriptor {
            schema: schema.to_string(),
            primary_key: pk_by_table.remove(&rel.name).unwrap_or_default(),
            foreign_keys: fks_by_table.remove(&rel.name).unwrap_or_default(),
            unique: unique_by_table
                .remove(&rel.name)
                .map(|groups| groups.into_iter().map(|(_, cols)| cols).collect())
                .unwrap_or_default(),
            name: rel.name,
            kind,
            columns,
        };
        if !table.key_is_consistent() {
            tracing::warn!(table = %table.name, "skipping relation whose primary key is not among its columns");
            continue;
        }
        tables.push(table);
    }
    tables
}
