//! Hostname normalization, schema name checks and schema lookups.

use crate::config::DEFAULT_DB;
use crate::connection::Connections;
use crate::error::TenancyError;
use crate::store::quote_ident;
use regex::Regex;
use std::sync::OnceLock;

/// Drop a leading `www.` so `www.acme.example.com` and `acme.example.com` route to the same tenant.
pub fn remove_www(hostname: &str) -> &str {
    hostname.strip_prefix("www.").unwrap_or(hostname)
}

/// Older name of [`remove_www`].
pub fn remove_www_and_dev(hostname: &str) -> &str {
    remove_www(hostname)
}

fn schema_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]{0,62}$").expect("static regex"))
}

/// PostgreSQL identifier of at most 63 chars, not in the reserved `pg_` namespace.
pub fn is_valid_schema_name(name: &str) -> bool {
    schema_name_pattern().is_match(name) && !name.starts_with("pg_")
}

/// Render a search path: the schema first, then public, then any extra schemas.
pub fn search_path(schema_name: &str, public_schema: &str, extra: &[String]) -> String {
    let mut paths: Vec<&str> = Vec::with_capacity(extra.len() + 2);
    paths.push(schema_name);
    if schema_name != public_schema {
        paths.push(public_schema);
    }
    paths.extend(extra.iter().map(String::as_str));
    paths.into_iter().map(quote_ident).collect::<Vec<_>>().join(", ")
}

/// Whether `schema_name` exists (case-insensitive) on database `db`.
///
/// Without `db`, the default database is used; that is only unambiguous when a single database is configured.
pub async fn schema_exists(
    connections: &mut Connections,
    schema_name: &str,
    db: Option<&str>,
) -> Result<bool, TenancyError> {
    let alias = match db {
        Some(alias) => alias,
        None if connections.config().has_multiple_db() => {
            return Err(TenancyError::MultipleDatabasesConfigured)
        }
        None => DEFAULT_DB,
    };
    let conn = connections.get_mut(alias)?.connection().await?;
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_namespace WHERE LOWER(nspname) = LOWER($1))",
    )
    .bind(schema_name)
    .fetch_one(conn)
    .await?;
    Ok(exists.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::connection::DatabasePools;
    use std::sync::Arc;

    #[test]
    fn remove_www_strips_prefix_only() {
        for host in ["acme.example.com", "example.com", "wwwacme.com", "w.example.com", ""] {
            assert_eq!(remove_www(&format!("www.{}", host)), host);
            assert_eq!(remove_www(host), host);
        }
        assert_eq!(remove_www("www.www.acme.com"), "www.acme.com");
        assert_eq!(remove_www_and_dev("www.acme.com"), "acme.com");
    }

    #[test]
    fn schema_name_rules() {
        assert!(is_valid_schema_name("acme"));
        assert!(is_valid_schema_name("_tenant_01"));
        assert!(is_valid_schema_name(&"a".repeat(63)));
        assert!(!is_valid_schema_name(&"a".repeat(64)));
        assert!(!is_valid_schema_name("1acme"));
        assert!(!is_valid_schema_name("acme-corp"));
        assert!(!is_valid_schema_name("pg_catalog"));
        assert!(!is_valid_schema_name(""));
    }

    #[test]
    fn search_path_order() {
        assert_eq!(search_path("acme", "public", &[]), "\"acme\", \"public\"");
        assert_eq!(search_path("public", "public", &[]), "\"public\"");
        assert_eq!(
            search_path("acme", "public", &["extensions".to_string()]),
            "\"acme\", \"public\", \"extensions\""
        );
    }

    #[tokio::test]
    async fn schema_exists_needs_explicit_db_when_pooled() {
        let config = TenancyConfig::single("postgres://localhost/main")
            .with_database("db1", "postgres://localhost/db1");
        let pools = DatabasePools::connect_lazy(Arc::new(config)).unwrap();
        let mut connections = pools.checkout();
        let err = schema_exists(&mut connections, "acme", None).await.unwrap_err();
        assert!(matches!(err, TenancyError::MultipleDatabasesConfigured));
    }
}
