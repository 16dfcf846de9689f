//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE statements from a
//! reflected table descriptor. Identifiers come from the catalog only; values are
//! always parameters.

use super::params::to_param;
use super::spec::{FilterClause, FilterOp, FilterTarget, KeyTuple, QuerySpec};
use crate::schema::{Catalog, ColumnDescriptor, LogicalType, TableDescriptor};
use serde_json::{Map, Value};

/// Alias of the target relation in every statement.
const ALIAS: &str = "t";
/// Alias of the referenced relation inside relationship-filter subqueries.
const RELATED_ALIAS: &str = "r";

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Fully qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: Option<String>) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Bind `v` for `col` and return the SQL that reads it back as the column's type.
    fn placeholder(&mut self, col: &ColumnDescriptor, v: &Value) -> String {
        let n = self.push_param(to_param(col, v));
        cast_param(col, n)
    }
}

fn cast_param(col: &ColumnDescriptor, n: usize) -> String {
    match col.logical_type {
        LogicalType::Binary => format!("decode(${}, 'base64')", n),
        _ => format!("CAST(${} AS {})", n, col.cast_type),
    }
}

/// Read expression for one column, normalized so rows decode by logical type.
fn select_expr(alias: &str, col: &ColumnDescriptor) -> String {
    let c = format!("{}.{}", alias, quoted(&col.name));
    match col.logical_type {
        LogicalType::Integer => format!("{}::int8", c),
        LogicalType::Float => format!("{}::float8", c),
        LogicalType::Boolean => c,
        LogicalType::DateTime => format!("to_jsonb({}) #>> '{{}}'", c),
        LogicalType::Binary => format!("encode({}, 'base64')", c),
        LogicalType::Opaque if col.is_json() => format!("{}::jsonb", c),
        LogicalType::Decimal | LogicalType::Text | LogicalType::Enum | LogicalType::Opaque => {
            format!("{}::text", c)
        }
    }
}

/// Column list shared by SELECT and every RETURNING clause.
pub fn select_column_list(table: &TableDescriptor) -> String {
    table
        .columns
        .iter()
        .map(|c| format!("{} AS {}", select_expr(ALIAS, c), quoted(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn from_clause(table: &TableDescriptor) -> String {
    format!("{} {}", qualified_table(&table.schema, &table.name), ALIAS)
}

/// One predicate for `expr` (already qualified) against a single clause.
fn predicate(q: &mut QueryBuf, expr: &str, col: &ColumnDescriptor, clause: &FilterClause) -> String {
    match clause.op {
        FilterOp::IsNull => {
            if clause.value.as_bool().unwrap_or(true) {
                format!("{} IS NULL", expr)
            } else {
                format!("{} IS NOT NULL", expr)
            }
        }
        FilterOp::Like => {
            let n = q.push_param(clause.value.as_str().map(str::to_string));
            format!("CAST({} AS text) LIKE ${}", expr, n)
        }
        FilterOp::In => {
            let items = clause.value.as_array().map(Vec::as_slice).unwrap_or_default();
            if items.is_empty() {
                return "FALSE".into();
            }
            let list: Vec<String> = items.iter().map(|v| q.placeholder(col, v)).collect();
            format!("{} IN ({})", expr, list.join(", "))
        }
        op => {
            let ph = q.placeholder(col, &clause.value);
            format!("{} {} {}", expr, op.sql(), ph)
        }
    }
}

/// Clauses on one target: same operator OR'ed, different operators AND'ed.
fn grouped_predicates(q: &mut QueryBuf, expr: &str, col: &ColumnDescriptor, clauses: &[FilterClause]) -> String {
    let mut ops: Vec<FilterOp> = clauses.iter().map(|c| c.op).collect();
    ops.sort();
    ops.dedup();
    let groups: Vec<String> = ops
        .into_iter()
        .map(|op| {
            let alternatives: Vec<String> = clauses
                .iter()
                .filter(|c| c.op == op)
                .map(|c| predicate(q, expr, col, c))
                .collect();
            if alternatives.len() == 1 {
                alternatives.concat()
            } else {
                format!("({})", alternatives.join(" OR "))
            }
        })
        .collect();
    groups.join(" AND ")
}

fn where_clause(q: &mut QueryBuf, table: &TableDescriptor, catalog: &Catalog, spec: &QuerySpec) -> String {
    let mut parts = Vec::new();
    for (target, clauses) in &spec.filters {
        match target {
            FilterTarget::Column(name) => {
                let Some(col) = table.column(name) else { continue };
                let expr = format!("{}.{}", ALIAS, quoted(name));
                parts.push(grouped_predicates(q, &expr, col, clauses));
            }
            FilterTarget::Related {
                column,
                referenced_table,
                referenced_column,
                remote_column,
            } => {
                let Some(related) = catalog.table(referenced_table) else {
                    parts.push("FALSE".into());
                    continue;
                };
                let related = &related.descriptor;
                let Some(remote) = related.column(remote_column) else {
                    parts.push("FALSE".into());
                    continue;
                };
                let expr = format!("{}.{}", RELATED_ALIAS, quoted(remote_column));
                let inner = grouped_predicates(q, &expr, remote, clauses);
                parts.push(format!(
                    "{}.{} IN (SELECT {}.{} FROM {} {} WHERE {})",
                    ALIAS,
                    quoted(column),
                    RELATED_ALIAS,
                    quoted(referenced_column),
                    qualified_table(&related.schema, &related.name),
                    RELATED_ALIAS,
                    inner
                ));
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Requested sort keys followed by the primary key (or, without one, every orderable
/// column) so pages are deterministic.
fn order_clause(table: &TableDescriptor, spec: &QuerySpec) -> String {
    let mut keys: Vec<String> = spec
        .order_by
        .iter()
        .map(|(c, dir)| format!("{}.{} {}", ALIAS, quoted(c), dir.sql()))
        .collect();
    let tiebreak: Vec<&str> = if table.has_primary_key() {
        table.primary_key.iter().map(String::as_str).collect()
    } else {
        table
            .columns
            .iter()
            .filter(|c| c.logical_type.is_orderable())
            .map(|c| c.name.as_str())
            .collect()
    };
    for name in tiebreak {
        if spec.order_by.iter().all(|(c, _)| c != name) {
            keys.push(format!("{}.{} ASC", ALIAS, quoted(name)));
        }
    }
    if keys.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", keys.join(", "))
    }
}

/// Page of rows matching `spec`.
pub fn select_list(table: &TableDescriptor, catalog: &Catalog, spec: &QuerySpec) -> QueryBuf {
    let mut q = QueryBuf::new();
    let filter = where_clause(&mut q, table, catalog, spec);
    let order = order_clause(table, spec);
    let limit = q.push_param(Some(spec.limit.to_string()));
    let offset = q.push_param(Some(spec.offset.to_string()));
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT CAST(${} AS int8) OFFSET CAST(${} AS int8)",
        select_column_list(table),
        from_clause(table),
        filter,
        order,
        limit,
        offset
    );
    q
}

/// Total rows matching the filters of `spec`, ignoring pagination.
pub fn count(table: &TableDescriptor, catalog: &Catalog, spec: &QuerySpec) -> QueryBuf {
    let mut q = QueryBuf::new();
    let filter = where_clause(&mut q, table, catalog, spec);
    q.sql = format!("SELECT COUNT(*) AS total FROM {}{}", from_clause(table), filter);
    q
}

fn key_predicate(q: &mut QueryBuf, table: &TableDescriptor, key: &KeyTuple) -> String {
    key.iter()
        .filter_map(|(name, v)| table.column(name).map(|col| (col, v)))
        .map(|(col, v)| format!("{}.{} = {}", ALIAS, quoted(&col.name), q.placeholder(col, v)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn select_by_key(table: &TableDescriptor, key: &KeyTuple) -> QueryBuf {
    let mut q = QueryBuf::new();
    let predicate = key_predicate(&mut q, table, key);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(table),
        from_clause(table),
        predicate
    );
    q
}

/// INSERT of the supplied fields only; omitted columns take their database defaults.
pub fn insert(table: &TableDescriptor, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let target = format!("{} AS {}", qualified_table(&table.schema, &table.name), ALIAS);
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for col in &table.columns {
        let Some(v) = body.get(&col.name) else { continue };
        cols.push(quoted(&col.name));
        values.push(q.placeholder(col, v));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", target, select_column_list(table))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            target,
            cols.join(", "),
            values.join(", "),
            select_column_list(table)
        )
    };
    q
}

/// Sparse UPDATE by key: SET only the supplied non-key fields. With nothing to set the
/// statement degrades to a read of the current row.
pub fn update(table: &TableDescriptor, key: &KeyTuple, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for col in &table.columns {
        if table.primary_key.contains(&col.name) {
            continue;
        }
        let Some(v) = body.get(&col.name) else { continue };
        sets.push(format!("{} = {}", quoted(&col.name), q.placeholder(col, v)));
    }
    if sets.is_empty() {
        return select_by_key(table, key);
    }
    let predicate = key_predicate(&mut q, table, key);
    q.sql = format!(
        "UPDATE {} AS {} SET {} WHERE {} RETURNING {}",
        qualified_table(&table.schema, &table.name),
        ALIAS,
        sets.join(", "),
        predicate,
        select_column_list(table)
    );
    q
}

pub fn delete(table: &TableDescriptor, key: &KeyTuple) -> QueryBuf {
    let mut q = QueryBuf::new();
    let predicate = key_predicate(&mut q, table, key);
    q.sql = format!(
        "DELETE FROM {} AS {} WHERE {}",
        qualified_table(&table.schema, &table.name),
        ALIAS,
        predicate
    );
    q
}
