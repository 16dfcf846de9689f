//! Generic CRUD execution against PostgreSQL for any reflected table.

use crate::error::AppError;
use crate::schema::{Catalog, LogicalType, TableDescriptor, TableEntry};
use crate::sql::{count, delete, insert, select_by_key, select_list, update, KeyTuple, QueryBuf, QuerySpec};
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

pub type Record = Map<String, Value>;

pub struct QueryEngine;

impl QueryEngine {
    /// One page of rows plus the total number of rows matching the filters.
    pub async fn list(
        pool: &PgPool,
        catalog: &Catalog,
        entry: &TableEntry,
        spec: &QuerySpec,
    ) -> Result<(Vec<Record>, i64), AppError> {
        let table = &entry.descriptor;
        let page = select_list(table, catalog, spec);
        let total = count(table, catalog, spec);
        let (rows, total) = tokio::try_join!(Self::query_many(pool, table, &page), Self::query_count(pool, &total))?;
        Ok((rows, total))
    }

    pub async fn get_one(pool: &PgPool, entry: &TableEntry, key: &KeyTuple) -> Result<Record, AppError> {
        let table = &entry.descriptor;
        let q = select_by_key(table, key);
        Self::query_optional(pool, table, &q)
            .await?
            .ok_or_else(|| not_found(table, key))
    }

    /// Insert one validated payload. Returns the stored row, including server defaults.
    pub async fn create(pool: &PgPool, entry: &TableEntry, body: &Record) -> Result<Record, AppError> {
        let table = &entry.descriptor;
        ensure_writable(table)?;
        let q = insert(table, body);
        Self::query_optional(pool, table, &q)
            .await?
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Sparse update: only the fields present in `body` are written.
    pub async fn update(pool: &PgPool, entry: &TableEntry, key: &KeyTuple, body: &Record) -> Result<Record, AppError> {
        let table = &entry.descriptor;
        ensure_writable(table)?;
        let q = update(table, key, body);
        Self::query_optional(pool, table, &q)
            .await?
            .ok_or_else(|| not_found(table, key))
    }

    pub async fn delete(pool: &PgPool, entry: &TableEntry, key: &KeyTuple) -> Result<(), AppError> {
        let table = &entry.descriptor;
        ensure_writable(table)?;
        let q = delete(table, key);
        tracing::debug!(sql = %q.sql, params = q.params.len(), "execute");
        let done = bind_all(sqlx::query(&q.sql), &q).execute(pool).await?;
        if done.rows_affected() == 0 {
            return Err(not_found(table, key));
        }
        Ok(())
    }

    async fn query_optional(pool: &PgPool, table: &TableDescriptor, q: &QueryBuf) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "query");
        let row = bind_all(sqlx::query(&q.sql), q).fetch_optional(pool).await?;
        row.map(|r| row_to_record(&r, table)).transpose()
    }

    async fn query_many(pool: &PgPool, table: &TableDescriptor, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "query");
        let rows = bind_all(sqlx::query(&q.sql), q).fetch_all(pool).await?;
        rows.iter().map(|r| row_to_record(r, table)).collect()
    }

    async fn query_count(pool: &PgPool, q: &QueryBuf) -> Result<i64, AppError> {
        tracing::debug!(sql = %q.sql, params = q.params.len(), "count");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p.as_deref());
        }
        Ok(query.fetch_one(pool).await?)
    }
}

fn bind_all<'q>(mut query: Query<'q, Postgres, PgArguments>, q: &'q QueryBuf) -> Query<'q, Postgres, PgArguments> {
    for p in &q.params {
        query = query.bind(p.as_deref());
    }
    query
}

fn ensure_writable(table: &TableDescriptor) -> Result<(), AppError> {
    if table.is_writable() {
        Ok(())
    } else {
        Err(AppError::NotAllowed(format!("'{}' is read-only", table.name)))
    }
}

fn not_found(table: &TableDescriptor, key: &KeyTuple) -> AppError {
    let key = key.iter().map(|(_, v)| v.to_string()).collect::<Vec<_>>().join(", ");
    AppError::NotFound(format!("{} ({})", table.name, key))
}

/// Decode a row selected through the normalized column list.
fn row_to_record(row: &PgRow, table: &TableDescriptor) -> Result<Record, AppError> {
    let mut map = Map::with_capacity(table.columns.len());
    for col in &table.columns {
        let name = col.name.as_str();
        let v = match col.logical_type {
            LogicalType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            LogicalType::Float => row.try_get::<Option<f64>, _>(name)?.map(float_value),
            LogicalType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
            LogicalType::Decimal => row.try_get::<Option<String>, _>(name)?.map(decimal_value),
            LogicalType::Opaque if col.is_json() => row.try_get::<Option<Value>, _>(name)?,
            _ => row.try_get::<Option<String>, _>(name)?.map(Value::String),
        };
        map.insert(col.name.clone(), v.unwrap_or(Value::Null));
    }
    Ok(map)
}

/// NaN and infinities have no JSON number form and are returned as text.
fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or_else(|| Value::String(f.to_string()))
}

fn decimal_value(s: String) -> Value {
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::from_str::<Number>(&s)
            .map(Value::Number)
            .unwrap_or(Value::String(s)),
        _ => Value::String(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{fixtures, TableKind};
    use serde_json::json;

    #[test]
    fn decimals_become_numbers_when_finite() {
        assert_eq!(decimal_value("12.50".into()), json!(12.5));
        assert_eq!(decimal_value("-3".into()), json!(-3));
        assert_eq!(decimal_value("NaN".into()), json!("NaN"));
    }

    #[test]
    fn non_finite_floats_are_text() {
        assert_eq!(float_value(1.5), json!(1.5));
        assert_eq!(float_value(f64::INFINITY), json!("inf"));
    }

    #[test]
    fn views_reject_writes() {
        let mut view = fixtures::users();
        view.kind = TableKind::View;
        assert!(matches!(ensure_writable(&view), Err(AppError::NotAllowed(_))));
        assert!(ensure_writable(&fixtures::users()).is_ok());
    }

    #[test]
    fn not_found_names_the_key() {
        let e = not_found(&fixtures::comments(), &vec![("post_id".into(), json!(3)), ("author_id".into(), json!(99))]);
        assert_eq!(e.to_string(), "not found: comments (3, 99)");
    }
}
