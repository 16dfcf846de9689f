//! Static endpoints: welcome page and the application, engine and schema meta.
//! The meta handlers sit behind the same auth gate as the table routes.

use super::table::TableMeta;
use crate::auth::Principal;
use crate::response::success_one_ok;
use crate::state::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

pub async fn welcome(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {}", env!("CARGO_PKG_NAME")),
        "version": env!("CARGO_PKG_VERSION"),
        "tables": state.catalog.len(),
    }))
}

pub async fn app(_principal: Principal) -> impl IntoResponse {
    success_one_ok(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
    }))
}

pub async fn engine(_principal: Principal, State(state): State<AppState>) -> impl IntoResponse {
    success_one_ok(state.engine.as_ref().clone())
}

pub async fn schema(_principal: Principal, State(state): State<AppState>) -> Response {
    let tables: Vec<TableMeta<'_>> = state
        .catalog
        .entries()
        .map(|entry| TableMeta::new(entry, &state.settings))
        .collect();
    success_one_ok(tables).into_response()
}
