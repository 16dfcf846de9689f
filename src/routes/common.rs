//! Common routes: welcome, health, readiness, version, application meta and docs.

use crate::auth::Principal;
use crate::handlers::meta::{app, engine, schema, welcome};
use crate::handlers::not_allowed;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::openapi::OpenApi;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    if let Err(e) = sqlx::query("SELECT 1").execute(&state.pool).await {
        tracing::warn!(error = %e, "readiness check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: "unavailable",
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        database: "ok",
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /, /health, /ready, /version, plus /meta/* and /openapi.json when enabled.
pub fn common_routes(state: AppState, docs: Option<Arc<OpenApi>>) -> Router {
    let mut router = Router::new()
        .route("/", get(welcome).fallback(not_allowed))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version));
    if state.settings.enable_meta {
        router = router
            .route("/meta/app", get(app))
            .route("/meta/engine", get(engine))
            .route("/meta/schema", get(schema));
    }
    if let Some(doc) = docs {
        router = router.route(
            "/openapi.json",
            get(move |_principal: Principal| async move { Json(doc.as_ref().clone()) }),
        );
    }
    router.with_state(state)
}
