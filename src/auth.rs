//! Pluggable authentication gate run before any handler touches the database.

use crate::error::AppError;
use async_trait::async_trait;
use axum::http::{header, request::Parts};

/// Identity attached to an authorized request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Token,
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide on a request from its head alone. `Unauthorized` when no usable
    /// credential is present, `Forbidden` when the credential is refused.
    async fn authorize(&self, parts: &Parts) -> Result<Principal, AppError>;
}

/// Default gate: every request is let through as anonymous.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _parts: &Parts) -> Result<Principal, AppError> {
        Ok(Principal::Anonymous)
    }
}

/// Static bearer token compared against `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        BearerToken { token: token.into() }
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken").finish_non_exhaustive()
    }
}

#[async_trait]
impl Authorizer for BearerToken {
    async fn authorize(&self, parts: &Parts) -> Result<Principal, AppError> {
        let presented = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AppError::Unauthorized)?;
        if presented == self.token {
            Ok(Principal::Token)
        } else {
            Err(AppError::Forbidden)
        }
    }
}
