//! Router assembly: static endpoints plus one router per reflected table.

pub mod common;
pub mod table;

pub use common::common_routes;
pub use table::table_routes;

use crate::error::{AppError, ConfigError};
use crate::openapi;
use crate::schema::Catalog;
use crate::state::AppState;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// First path segments owned by static endpoints when tables are served at the root.
pub const RESERVED_SEGMENTS: &[&str] = &["health", "ready", "version", "meta", "openapi.json"];

const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Every table must own a distinct segment, and none may shadow a static endpoint
/// when no prefix separates them.
pub fn check_collisions(catalog: &Catalog, api_prefix: &str) -> Result<(), ConfigError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    if api_prefix.is_empty() {
        for reserved in RESERVED_SEGMENTS {
            owners.insert(*reserved, "a built-in endpoint");
        }
    }
    for entry in catalog.entries() {
        let name = entry.descriptor.name.as_str();
        if let Some(first) = owners.insert(&entry.segment, name) {
            return Err(ConfigError::PathCollision {
                segment: entry.segment.clone(),
                first: first.to_string(),
                second: name.to_string(),
            });
        }
    }
    Ok(())
}

async fn not_found() -> AppError {
    AppError::NotFound("no route for this path".into())
}

/// Full application router. Fails when two routes would claim the same path.
pub fn build_router(state: AppState) -> Result<Router, ConfigError> {
    let prefix = state.settings.api_prefix.clone();
    check_collisions(&state.catalog, &prefix)?;

    let mut api = Router::new();
    for entry in state.catalog.entries() {
        api = api.merge(table_routes(state.clone(), entry.clone()));
    }

    let docs = state
        .settings
        .enable_docs
        .then(|| Arc::new(openapi::document(&state.catalog, &state.settings)));
    let common = common_routes(state.clone(), docs);
    let app = if prefix.is_empty() { common.merge(api) } else { common.nest(&prefix, api) };

    tracing::info!(
        tables = state.catalog.len(),
        prefix = %prefix,
        write = state.settings.enable_write,
        "router assembled"
    );

    // Each `layer` call wraps everything added before it; CORS ends up outermost.
    Ok(app
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)))
}
