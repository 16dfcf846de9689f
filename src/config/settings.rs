//! Runtime knobs shared by every request, resolved once at startup.

use crate::sql::PageLimits;
use serde::Serialize;
use sqlx::postgres::PgConnectOptions;

#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub enable_write: bool,
    pub enable_meta: bool,
    pub enable_docs: bool,
    /// Empty, or a path starting with `/` and without a trailing slash.
    pub api_prefix: String,
    pub limits: PageLimits,
    pub key_delimiter: String,
    pub oai_title: String,
    pub oai_version: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            enable_write: false,
            enable_meta: false,
            enable_docs: false,
            api_prefix: String::new(),
            limits: PageLimits {
                default_limit: 100,
                max_limit: 1000,
            },
            key_delimiter: "-".into(),
            oai_title: env!("CARGO_PKG_NAME").into(),
            oai_version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Normalize a user-supplied prefix: `api/`, `/api/` and `/api` all become `/api`.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Connection details safe to show to clients. Never carries the password.
#[derive(Clone, Debug, Serialize)]
pub struct EngineInfo {
    pub dialect: &'static str,
    pub driver: &'static str,
    pub database: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub schema: String,
}

impl EngineInfo {
    pub fn from_options(options: &PgConnectOptions, schema: &str) -> Self {
        EngineInfo {
            dialect: "postgresql",
            driver: "sqlx",
            database: options.get_database().map(str::to_string),
            host: options.get_host().to_string(),
            port: options.get_port(),
            username: options.get_username().to_string(),
            schema: schema.to_string(),
        }
    }
}
