//! Config validation: database aliases, schema names, tenant table.

use crate::config::types::{TenancyConfig, DEFAULT_DB};
use crate::error::TenancyError;
use crate::utils::is_valid_schema_name;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("static regex")
    })
}

pub fn validate(config: &TenancyConfig) -> Result<(), TenancyError> {
    match config.databases.first() {
        Some(first) if first.alias == DEFAULT_DB => {}
        _ => {
            return Err(TenancyError::Config(format!(
                "the first configured database must be '{}'",
                DEFAULT_DB
            )))
        }
    }

    let mut seen = HashSet::new();
    for db in &config.databases {
        if db.alias.is_empty() {
            return Err(TenancyError::Config("database alias must not be empty".into()));
        }
        if !seen.insert(db.alias.as_str()) {
            return Err(TenancyError::Config(format!("duplicate database alias: {}", db.alias)));
        }
    }

    if !is_valid_schema_name(&config.public_schema_name) {
        return Err(TenancyError::InvalidSchemaName(config.public_schema_name.clone()));
    }
    for schema in &config.extra_search_paths {
        if !is_valid_schema_name(schema) {
            return Err(TenancyError::InvalidSchemaName(schema.clone()));
        }
        if *schema == config.public_schema_name {
            return Err(TenancyError::Config(format!(
                "extra search path {} duplicates the public schema",
                schema
            )));
        }
    }

    if !table_name_pattern().is_match(&config.tenant_table) {
        return Err(TenancyError::Config(format!("invalid tenant table: {}", config.tenant_table)));
    }
    if config.max_connections == 0 {
        return Err(TenancyError::Config("max connections must be at least 1".into()));
    }
    Ok(())
}
