//! Run the configured [`Authorizer`](crate::auth::Authorizer) as an extractor.
//!
//! Handlers take `Principal` as their first argument so the gate is decided from the
//! request head, before the body is read or the database is touched.

use crate::auth::Principal;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let principal = app.authorizer.authorize(parts).await?;
        tracing::debug!(principal = ?principal, "authorized");
        Ok(principal)
    }
}
