//! Load tenancy config from environment variables.

use crate::config::types::{TenancyConfig, DEFAULT_PUBLIC_SCHEMA, DEFAULT_TENANT_TABLE};
use crate::config::validate;
use crate::error::TenancyError;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/tenants";

impl TenancyConfig {
    /// Build config from process environment. See [`TenancyConfig::from_lookup`] for the variables read.
    pub fn from_env() -> Result<Self, TenancyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Reads `DATABASE_URL`, `TENANT_DATABASES` (`alias=url,alias=url`), `TENANT_MULTI_DB`,
    /// `PUBLIC_SCHEMA_NAME`, `PUBLIC_SCHEMA_URLCONF`, `TENANT_LIMIT_SET_CALLS`,
    /// `TENANT_EXTRA_SEARCH_PATHS`, `TENANT_TABLE` and `TENANT_MAX_CONNECTIONS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TenancyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
        let mut config = TenancyConfig::single(database_url);

        if let Some(raw) = get("TENANT_DATABASES") {
            for (alias, url) in parse_databases(&raw)? {
                config = config.with_database(alias, url);
            }
        }
        if let Some(raw) = get("TENANT_MULTI_DB") {
            config.multi_db = parse_bool("TENANT_MULTI_DB", &raw)?;
        }
        config.public_schema_name = get("PUBLIC_SCHEMA_NAME").unwrap_or_else(|| DEFAULT_PUBLIC_SCHEMA.into());
        config.public_schema_urlconf = get("PUBLIC_SCHEMA_URLCONF");
        if let Some(raw) = get("TENANT_LIMIT_SET_CALLS") {
            config.limit_set_calls = parse_bool("TENANT_LIMIT_SET_CALLS", &raw)?;
        }
        if let Some(raw) = get("TENANT_EXTRA_SEARCH_PATHS") {
            config.extra_search_paths = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        config.tenant_table = get("TENANT_TABLE").unwrap_or_else(|| DEFAULT_TENANT_TABLE.into());
        if let Some(raw) = get("TENANT_MAX_CONNECTIONS") {
            config.max_connections = raw
                .parse()
                .map_err(|_| TenancyError::Config(format!("TENANT_MAX_CONNECTIONS: not a number: {}", raw)))?;
        }

        validate(&config)?;
        Ok(config)
    }
}

/// Parse `alias=url` pairs separated by commas.
fn parse_databases(raw: &str) -> Result<Vec<(String, String)>, TenancyError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (alias, url) = pair
                .split_once('=')
                .ok_or_else(|| TenancyError::Config(format!("TENANT_DATABASES: expected alias=url, got {}", pair)))?;
            let alias = alias.trim();
            if alias.is_empty() {
                return Err(TenancyError::Config(format!("TENANT_DATABASES: empty alias in {}", pair)));
            }
            Ok((alias.to_string(), url.trim().to_string()))
        })
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, TenancyError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TenancyError::Config(format!("{}: expected a boolean, got {}", key, raw))),
    }
}
