//! Per-table handlers: list, create, read, update, replace, delete, meta.
//!
//! Every handler runs against a [`TableHandle`] bound when the table's routes are
//! assembled. Extractor order is fixed: the auth gate (`Principal`) first, then path and
//! query, then the body, so rejected requests never reach the database.

use crate::auth::Principal;
use crate::config::ApiSettings;
use crate::error::{AppError, FieldError};
use crate::interface::TableInterfaces;
use crate::response::{success_many, success_one, success_one_ok, PageMeta};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, TableDescriptor, TableEntry, TableKind};
use crate::service::{QueryEngine, Record, RequestValidator};
use crate::sql::{parse_key, KeyTuple, QuerySpec};
use crate::state::TableHandle;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// Operations a table supports under the current settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operations {
    pub list: bool,
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

impl Operations {
    pub fn of(table: &TableDescriptor, settings: &ApiSettings) -> Self {
        let write = settings.enable_write && table.is_writable();
        let keyed = table.has_primary_key();
        Operations {
            list: true,
            create: write,
            read: keyed,
            update: write && keyed,
            delete: write && keyed,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.list, "list"),
            (self.create, "create"),
            (self.read, "read"),
            (self.update, "update"),
            (self.delete, "delete"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

/// Client-facing description of a table.
#[derive(Serialize)]
pub struct TableMeta<'a> {
    pub name: &'a str,
    pub schema: &'a str,
    pub kind: TableKind,
    pub path: String,
    pub read_only: bool,
    pub primary_key: &'a [String],
    pub foreign_keys: &'a [ForeignKeyDescriptor],
    pub unique: &'a [Vec<String>],
    pub columns: &'a [ColumnDescriptor],
    pub operations: Vec<&'static str>,
    pub interfaces: &'a TableInterfaces,
}

impl<'a> TableMeta<'a> {
    pub fn new(entry: &'a TableEntry, settings: &ApiSettings) -> Self {
        let t = &entry.descriptor;
        let operations = Operations::of(t, settings);
        TableMeta {
            name: &t.name,
            schema: &t.schema,
            kind: t.kind,
            path: format!("{}/{}/", settings.api_prefix, entry.segment),
            read_only: !(operations.create || operations.update || operations.delete),
            primary_key: &t.primary_key,
            foreign_keys: &t.foreign_keys,
            unique: &t.unique,
            columns: &t.columns,
            operations: operations.names(),
            interfaces: &entry.interfaces,
        }
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v).map_err(|e| AppError::BadRequest(e.body_text()))
}

fn key_of(handle: &TableHandle, raw: &str) -> Result<KeyTuple, AppError> {
    parse_key(&handle.table.descriptor, raw, &handle.state.settings.key_delimiter)
}

fn output(entry: &TableEntry, record: Record) -> Value {
    entry.interfaces.read.project(record)
}

pub async fn list(
    _principal: Principal,
    State(handle): State<TableHandle>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let state = &handle.state;
    let entry = &handle.table;
    let spec = QuerySpec::parse(&params, &entry.descriptor, &state.catalog, state.settings.limits)?;
    let (rows, total) = QueryEngine::list(&state.pool, &state.catalog, entry, &spec).await?;
    let data = rows.into_iter().map(|r| output(entry, r)).collect();
    Ok(success_many(
        data,
        PageMeta {
            total: total.max(0) as u64,
            limit: spec.limit,
            offset: spec.offset,
        },
    ))
}

pub async fn create(
    _principal: Principal,
    State(handle): State<TableHandle>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entry = &handle.table;
    let body = RequestValidator::validate(&entry.interfaces.create, json_body(body)?)?;
    let row = QueryEngine::create(&handle.state.pool, entry, &body).await?;
    tracing::info!(table = %entry.descriptor.name, "row created");
    Ok(success_one(output(entry, row)))
}

pub async fn read(
    _principal: Principal,
    State(handle): State<TableHandle>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let key = key_of(&handle, &key)?;
    let row = QueryEngine::get_one(&handle.state.pool, &handle.table, &key).await?;
    Ok(success_one_ok(output(&handle.table, row)))
}

/// PATCH: partial update validated against the Update interface.
pub async fn update(
    _principal: Principal,
    State(handle): State<TableHandle>,
    Path(key): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entry = &handle.table;
    let key = key_of(&handle, &key)?;
    let body = RequestValidator::validate(&entry.interfaces.update, json_body(body)?)?;
    let row = QueryEngine::update(&handle.state.pool, entry, &key, &body).await?;
    Ok(success_one_ok(output(entry, row)))
}

/// PUT: full representation validated against the Create interface. Key fields may be
/// omitted from the body; when present they must match the path.
pub async fn replace(
    _principal: Principal,
    State(handle): State<TableHandle>,
    Path(key): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entry = &handle.table;
    let key = key_of(&handle, &key)?;
    let mut body = json_body(body)?;
    if let Value::Object(map) = &mut body {
        let mut mismatched = Vec::new();
        for (name, value) in &key {
            if entry.interfaces.create.field(name).is_none() {
                continue;
            }
            match map.get(name) {
                None => {
                    map.insert(name.clone(), value.clone());
                }
                Some(supplied) if !same_key_value(supplied, value) => {
                    mismatched.push(FieldError::new(name, "does not match the key in the path"));
                }
                Some(_) => {}
            }
        }
        if !mismatched.is_empty() {
            return Err(AppError::Validation(mismatched));
        }
    }
    let body = RequestValidator::validate(&entry.interfaces.create, body)?;
    let row = QueryEngine::update(&handle.state.pool, entry, &key, &body).await?;
    Ok(success_one_ok(output(entry, row)))
}

/// Key values parsed from the path are typed; a body may spell the same value as a string.
fn same_key_value(supplied: &Value, key: &Value) -> bool {
    supplied == key || supplied.as_str() == Some(key.to_string().as_str())
}

pub async fn delete(
    _principal: Principal,
    State(handle): State<TableHandle>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let key = key_of(&handle, &key)?;
    QueryEngine::delete(&handle.state.pool, &handle.table, &key).await?;
    tracing::info!(table = %handle.table.descriptor.name, "row deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn meta(_principal: Principal, State(handle): State<TableHandle>) -> Response {
    success_one_ok(TableMeta::new(&handle.table, &handle.state.settings)).into_response()
}

/// Fallback for verbs a route does not support.
pub async fn not_allowed() -> AppError {
    AppError::NotAllowed("method not supported on this resource".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use serde_json::json;

    fn settings(enable_write: bool) -> ApiSettings {
        ApiSettings {
            enable_write,
            ..ApiSettings::default()
        }
    }

    #[test]
    fn operations_follow_keys_kind_and_write_flag() {
        assert_eq!(Operations::of(&fixtures::users(), &settings(false)).names(), vec!["list", "read"]);
        assert_eq!(
            Operations::of(&fixtures::users(), &settings(true)).names(),
            vec!["list", "create", "read", "update", "delete"]
        );
        assert_eq!(Operations::of(&fixtures::audit_log(), &settings(true)).names(), vec!["list", "create"]);
        let mut view = fixtures::users();
        view.kind = TableKind::View;
        assert_eq!(Operations::of(&view, &settings(true)).names(), vec!["list", "read"]);
    }

    #[test]
    fn key_values_compare_across_spellings() {
        assert!(same_key_value(&json!(3), &json!(3)));
        assert!(same_key_value(&json!("3"), &json!(3)));
        assert!(!same_key_value(&json!(4), &json!(3)));
    }
}
