//! Routes for one table, bound to that table's [`TableHandle`].
//! Every path is registered with and without the trailing slash.

use crate::handlers::table::{create, delete, list, meta, not_allowed, read, replace, update, Operations};
use crate::schema::TableEntry;
use crate::state::{AppState, TableHandle};
use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;

pub fn table_routes(state: AppState, table: Arc<TableEntry>) -> Router {
    let ops = Operations::of(&table.descriptor, &state.settings);
    let base = format!("/{}", table.segment);

    let mut collection = get(list);
    if ops.create {
        collection = collection.post(create);
    }
    let collection = collection.fallback(not_allowed);

    let mut router = Router::new()
        .route(&base, collection.clone())
        .route(&format!("{}/", base), collection)
        .route(&format!("{}/meta", base), get(meta).fallback(not_allowed))
        .route(&format!("{}/meta/", base), get(meta).fallback(not_allowed));

    if ops.read {
        let mut item = get(read);
        if ops.update {
            item = item.put(replace).patch(update);
        }
        if ops.delete {
            item = item.delete(delete);
        }
        let item = item.fallback(not_allowed);
        router = router
            .route(&format!("{}/:key", base), item.clone())
            .route(&format!("{}/:key/", base), item);
    } else {
        router = router
            .route(&format!("{}/:key", base), any(not_allowed))
            .route(&format!("{}/:key/", base), any(not_allowed));
    }

    tracing::debug!(table = %table.descriptor.name, path = %base, operations = ?ops.names(), "routes registered");
    router.with_state(TableHandle { state, table })
}
