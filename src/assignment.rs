//! Round-robin placement of new tenants over the non-default databases.
//!
//! No cursor is stored: the next database follows the one holding the most recently
//! created tenant. Reading the last tenant and inserting the new one are not atomic, so
//! tenants created concurrently can land on the same database. Placement is best-effort
//! spreading, not a unique allocator.

use crate::config::{TenancyConfig, DEFAULT_DB};
use crate::directory::TenantDirectory;
use crate::error::TenancyError;
use crate::tenant::Tenant;

/// Database for a tenant about to be created with `schema_name`.
pub async fn assign_db_string(
    config: &TenancyConfig,
    directory: &dyn TenantDirectory,
    schema_name: &str,
) -> Result<String, TenancyError> {
    if config.is_public(schema_name) {
        return Ok(DEFAULT_DB.to_string());
    }
    let last = directory
        .get_most_recent_non_public(&config.public_schema_name)
        .await?;
    let db = next_db_string(config, last.as_ref());
    tracing::debug!(schema = %schema_name, db = %db, "assigned database");
    Ok(db)
}

/// Database following `last`'s in the configured pool, wrapping after the final entry.
pub fn next_db_string(config: &TenancyConfig, last: Option<&Tenant>) -> String {
    let pool = config.database_pool();
    let Some(first) = pool.first().copied() else {
        return config
            .database_aliases()
            .next()
            .unwrap_or(DEFAULT_DB)
            .to_string();
    };
    let last = match last {
        Some(t) if t.db_string != DEFAULT_DB => t,
        _ => return first.to_string(),
    };
    match pool.iter().position(|alias| *alias == last.db_string) {
        Some(index) => pool[(index + 1) % pool.len()].to_string(),
        None => {
            tracing::warn!(
                schema = %last.schema_name,
                db = %last.db_string,
                "last tenant is on a database outside the pool, starting over"
            );
            first.to_string()
        }
    }
}
