//! Shared application state. Built once after reflection and never mutated.

use crate::auth::Authorizer;
use crate::config::{ApiSettings, EngineInfo};
use crate::schema::{Catalog, TableEntry};
use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<Catalog>,
    pub settings: Arc<ApiSettings>,
    pub authorizer: Arc<dyn Authorizer>,
    pub engine: Arc<EngineInfo>,
}

/// State of one table's router: the shared state plus the table it serves.
#[derive(Clone)]
pub struct TableHandle {
    pub state: AppState,
    pub table: Arc<TableEntry>,
}

impl FromRef<TableHandle> for AppState {
    fn from_ref(handle: &TableHandle) -> Self {
        handle.state.clone()
    }
}
