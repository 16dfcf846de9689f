//! Command-line and environment configuration.

use super::settings::{normalize_prefix, ApiSettings};
use crate::error::ConfigError;
use crate::sql::PageLimits;
use clap::Parser;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "auto-rest", version, about = "Serve a REST API generated from a PostgreSQL schema")]
pub struct Args {
    /// Full connection URL. Discrete `--db-*` options override its parts.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,
    #[arg(long, env = "DB_PORT")]
    pub db_port: Option<u16>,
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,
    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,
    #[arg(long, env = "DB_PASS", hide_env_values = true)]
    pub db_pass: Option<String>,
    /// Schema to reflect.
    #[arg(long, env = "DB_SCHEMA", default_value = "public")]
    pub db_schema: String,

    #[arg(long, env = "POOL_MIN", default_value_t = 0)]
    pub pool_min: u32,
    #[arg(long, env = "POOL_MAX", default_value_t = 10)]
    pub pool_max: u32,
    /// Seconds to wait for a pooled connection.
    #[arg(long, env = "POOL_TIMEOUT", default_value_t = 30)]
    pub pool_timeout: u64,
    /// Per-statement timeout in milliseconds.
    #[arg(long, env = "STATEMENT_TIMEOUT")]
    pub statement_timeout: Option<u64>,
    /// JSON file of runtime parameters applied to every connection.
    #[arg(long, env = "ENGINE_OPTIONS")]
    pub engine_options: Option<PathBuf>,

    #[arg(long, env = "ENABLE_WRITE")]
    pub enable_write: bool,
    #[arg(long, env = "ENABLE_META")]
    pub enable_meta: bool,
    #[arg(long, env = "ENABLE_DOCS")]
    pub enable_docs: bool,

    #[arg(long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub server_host: String,
    #[arg(long, env = "SERVER_PORT", default_value_t = 8081)]
    pub server_port: u16,
    #[arg(long, env = "API_PREFIX", default_value = "")]
    pub api_prefix: String,

    #[arg(long, env = "DEFAULT_LIMIT", default_value_t = 100)]
    pub default_limit: u64,
    #[arg(long, env = "MAX_LIMIT", default_value_t = 1000)]
    pub max_limit: u64,
    /// Joins the parts of a composite primary key in item paths.
    #[arg(long, env = "KEY_DELIMITER", default_value = "-")]
    pub key_delimiter: String,

    /// Require `Authorization: Bearer <token>` on table routes.
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    #[arg(long, env = "OAI_TITLE", default_value = "auto-rest")]
    pub oai_title: String,
    #[arg(long, env = "OAI_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub oai_version: String,

    /// Log filter, e.g. `info` or `auto_rest=debug,tower_http=info`. Defaults to `RUST_LOG`.
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    /// Connection options from the URL and discrete parts, with the statement timeout and
    /// engine options applied as runtime parameters.
    pub async fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let mut options = match &self.database_url {
            Some(url) => PgConnectOptions::from_str(url).map_err(ConfigError::Connection)?,
            None => PgConnectOptions::new(),
        };
        if let Some(host) = &self.db_host {
            options = options.host(host);
        }
        if let Some(port) = self.db_port {
            options = options.port(port);
        }
        if let Some(name) = &self.db_name {
            options = options.database(name);
        }
        if let Some(user) = &self.db_user {
            options = options.username(user);
        }
        if let Some(pass) = &self.db_pass {
            options = options.password(pass);
        }

        let mut params = match &self.engine_options {
            Some(path) => load_engine_options(path).await?,
            None => BTreeMap::new(),
        };
        if let Some(ms) = self.statement_timeout {
            params.insert("statement_timeout".into(), ms.to_string());
        }
        Ok(options.application_name(env!("CARGO_PKG_NAME")).options(params))
    }

    pub fn pool_options(&self) -> Result<PgPoolOptions, ConfigError> {
        if self.pool_max == 0 || self.pool_min > self.pool_max {
            return Err(ConfigError::Settings(format!(
                "pool size must satisfy 0 <= min ({}) <= max ({}) and max > 0",
                self.pool_min, self.pool_max
            )));
        }
        Ok(PgPoolOptions::new()
            .min_connections(self.pool_min)
            .max_connections(self.pool_max)
            .acquire_timeout(Duration::from_secs(self.pool_timeout)))
    }

    pub fn api_settings(&self) -> Result<ApiSettings, ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError::Settings("max limit must be positive".into()));
        }
        if self.key_delimiter.is_empty() || self.key_delimiter.contains('/') {
            return Err(ConfigError::Settings("key delimiter must be non-empty and not contain '/'".into()));
        }
        Ok(ApiSettings {
            enable_write: self.enable_write,
            enable_meta: self.enable_meta,
            enable_docs: self.enable_docs,
            api_prefix: normalize_prefix(&self.api_prefix),
            limits: PageLimits {
                default_limit: self.default_limit.min(self.max_limit),
                max_limit: self.max_limit,
            },
            key_delimiter: self.key_delimiter.clone(),
            oai_title: self.oai_title.clone(),
            oai_version: self.oai_version.clone(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Read a JSON object of runtime parameters. Non-string scalars are stringified.
async fn load_engine_options(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Settings(format!("engine options {}: {}", path.display(), e)))?;
    parse_engine_options(&text).map_err(|e| ConfigError::Settings(format!("engine options {}: {}", path.display(), e)))
}

fn parse_engine_options(text: &str) -> Result<BTreeMap<String, String>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let Value::Object(map) = value else {
        return Err("expected a JSON object".into());
    };
    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k, s)),
            Value::Number(n) => Ok((k, n.to_string())),
            Value::Bool(b) => Ok((k, b.to_string())),
            _ => Err(format!("option '{}' must be a string, number or boolean", k)),
        })
        .collect()
}
