//! auto-rest: reflect a PostgreSQL schema at startup and serve a generated REST API.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod interface;
pub mod openapi;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;

pub use auth::{AllowAll, Authorizer, BearerToken, Principal};
pub use config::{ApiSettings, Args, EngineInfo};
pub use error::{AppError, ConfigError};
pub use routes::build_router;
pub use schema::{reflect, Catalog};
pub use service::QueryEngine;
pub use state::AppState;

use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;

/// Connect, reflect the configured schema and assemble the router.
/// Returns the pool alongside so the caller can close it on shutdown.
pub async fn bootstrap(args: &Args) -> Result<(Router, PgPool), ConfigError> {
    let settings = args.api_settings()?;
    let connect_options = args.connect_options().await?;
    let pool = args
        .pool_options()?
        .connect_with(connect_options.clone())
        .await
        .map_err(ConfigError::Connection)?;
    let engine = EngineInfo::from_options(&connect_options, &args.db_schema);
    tracing::info!(host = %engine.host, port = engine.port, database = ?engine.database, "connected");

    let tables = reflect(&pool, &args.db_schema).await?;
    let catalog = Catalog::build(args.db_schema.clone(), tables);
    if catalog.is_empty() {
        return Err(ConfigError::EmptySchema(args.db_schema.clone()));
    }
    tracing::info!(tables = catalog.len(), "catalog built");

    let authorizer: Arc<dyn Authorizer> = match &args.api_token {
        Some(token) => Arc::new(BearerToken::new(token.clone())),
        None => Arc::new(AllowAll),
    };
    let state = AppState {
        pool: pool.clone(),
        catalog: Arc::new(catalog),
        settings: Arc::new(settings),
        authorizer,
        engine: Arc::new(engine),
    };
    let router = build_router(state)?;
    Ok((router, pool))
}
