//! Per-database connection handles carrying a schema/tenant binding.
//!
//! [`DatabasePools`] is shared by the whole process. Each request checks out a
//! [`Connections`] set: one [`TenantConnection`] per configured alias, each with
//! its own binding. A handle only talks to PostgreSQL when [`TenantConnection::connection`]
//! is called; at that point it checks out a pooled connection and issues
//! `SET search_path` for the current binding.

use crate::config::{TenancyConfig, DEFAULT_DB};
use crate::error::TenancyError;
use crate::tenant::Tenant;
use crate::utils::{is_valid_schema_name, search_path};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared pools, one per configured logical database.
#[derive(Clone)]
pub struct DatabasePools {
    config: Arc<TenancyConfig>,
    pools: Arc<HashMap<String, PgPool>>,
}

fn pool_options(config: &TenancyConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        // Connections go back to the pool with the server default search path.
        .after_release(|conn, _meta| {
            Box::pin(async move {
                sqlx::Executor::execute(&mut *conn, "RESET search_path").await?;
                Ok(true)
            })
        })
}

impl DatabasePools {
    /// Connect every configured database.
    pub async fn connect(config: Arc<TenancyConfig>) -> Result<Self, TenancyError> {
        let mut pools = HashMap::new();
        for db in &config.databases {
            let pool = pool_options(&config).connect(&db.url).await?;
            tracing::info!(alias = %db.alias, "database pool connected");
            pools.insert(db.alias.clone(), pool);
        }
        Ok(DatabasePools {
            config,
            pools: Arc::new(pools),
        })
    }

    /// Create pools without opening connections; the first query connects.
    pub fn connect_lazy(config: Arc<TenancyConfig>) -> Result<Self, TenancyError> {
        let mut pools = HashMap::new();
        for db in &config.databases {
            pools.insert(db.alias.clone(), pool_options(&config).connect_lazy(&db.url)?);
        }
        Ok(DatabasePools {
            config,
            pools: Arc::new(pools),
        })
    }

    pub fn config(&self) -> &Arc<TenancyConfig> {
        &self.config
    }

    pub fn pool(&self, alias: &str) -> Result<&PgPool, TenancyError> {
        self.pools
            .get(alias)
            .ok_or_else(|| TenancyError::UnknownDatabase(alias.to_string()))
    }

    pub fn default_pool(&self) -> Result<&PgPool, TenancyError> {
        self.pool(DEFAULT_DB)
    }

    /// Fresh handles for one unit of work, every binding on the public schema.
    pub fn checkout(&self) -> Connections {
        let by_alias = self
            .pools
            .iter()
            .map(|(alias, pool)| {
                (
                    alias.clone(),
                    TenantConnection::new(alias.clone(), pool.clone(), self.config.clone()),
                )
            })
            .collect();
        Connections {
            config: self.config.clone(),
            by_alias,
        }
    }
}

/// The connection handles owned by one request.
pub struct Connections {
    config: Arc<TenancyConfig>,
    by_alias: HashMap<String, TenantConnection>,
}

impl Connections {
    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn get(&self, alias: &str) -> Result<&TenantConnection, TenancyError> {
        self.by_alias
            .get(alias)
            .ok_or_else(|| TenancyError::UnknownDatabase(alias.to_string()))
    }

    pub fn get_mut(&mut self, alias: &str) -> Result<&mut TenantConnection, TenancyError> {
        self.by_alias
            .get_mut(alias)
            .ok_or_else(|| TenancyError::UnknownDatabase(alias.to_string()))
    }

    pub fn default_connection(&mut self) -> Result<&mut TenantConnection, TenancyError> {
        self.get_mut(DEFAULT_DB)
    }
}

/// Which schema a handle targets, and the tenant it was bound from (if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub tenant: Option<Tenant>,
    pub schema_name: String,
}

impl Binding {
    fn public(public_schema: &str) -> Self {
        Binding {
            tenant: None,
            schema_name: public_schema.to_string(),
        }
    }
}

/// Connection handle for one logical database.
pub struct TenantConnection {
    alias: String,
    pool: PgPool,
    config: Arc<TenancyConfig>,
    binding: Binding,
    search_path_set: bool,
    conn: Option<PoolConnection<Postgres>>,
}

impl TenantConnection {
    fn new(alias: String, pool: PgPool, config: Arc<TenancyConfig>) -> Self {
        let binding = Binding::public(&config.public_schema_name);
        TenantConnection {
            alias,
            pool,
            config,
            binding,
            search_path_set: false,
            conn: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Tenant the handle was bound to with [`TenantConnection::set_tenant`]; `None` when on public or a bare schema.
    pub fn current_tenant(&self) -> Option<&Tenant> {
        self.binding.tenant.as_ref()
    }

    pub fn schema_name(&self) -> &str {
        &self.binding.schema_name
    }

    pub fn is_public(&self) -> bool {
        self.config.is_public(&self.binding.schema_name)
    }

    pub fn set_schema_to_public(&mut self) {
        let public = Binding::public(&self.config.public_schema_name);
        self.rebind(public);
    }

    /// Target `schema_name` without a tenant record.
    pub fn set_schema(&mut self, schema_name: &str) -> Result<(), TenancyError> {
        if !is_valid_schema_name(schema_name) {
            return Err(TenancyError::InvalidSchemaName(schema_name.to_string()));
        }
        self.rebind(Binding {
            tenant: None,
            schema_name: schema_name.to_string(),
        });
        Ok(())
    }

    pub fn set_tenant(&mut self, tenant: &Tenant) -> Result<(), TenancyError> {
        if !is_valid_schema_name(&tenant.schema_name) {
            return Err(TenancyError::InvalidSchemaName(tenant.schema_name.clone()));
        }
        self.rebind(Binding {
            tenant: Some(tenant.clone()),
            schema_name: tenant.schema_name.clone(),
        });
        Ok(())
    }

    /// Put back a binding captured earlier with [`TenantConnection::binding`].
    pub(crate) fn restore(&mut self, binding: Binding) {
        self.rebind(binding);
    }

    fn rebind(&mut self, binding: Binding) {
        if binding != self.binding {
            tracing::debug!(alias = %self.alias, schema = %binding.schema_name, "connection rebound");
            self.search_path_set = false;
        }
        self.binding = binding;
    }

    /// Whether the next [`TenantConnection::connection`] call sends `SET search_path`.
    ///
    /// With `limit_set_calls` the search path is only sent after a binding change or a
    /// fresh checkout; otherwise it is sent on every call.
    pub fn needs_search_path(&self) -> bool {
        !self.search_path_set || !self.config.limit_set_calls
    }

    /// Checked-out connection with `search_path` matching the current binding.
    pub async fn connection(&mut self) -> Result<&mut PgConnection, TenancyError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                self.search_path_set = false;
                self.pool.acquire().await?
            }
        };
        let needs_set = self.needs_search_path();
        let conn = self.conn.insert(conn);
        if needs_set {
            let sql = format!(
                "SET search_path = {}",
                search_path(
                    &self.binding.schema_name,
                    &self.config.public_schema_name,
                    &self.config.extra_search_paths,
                )
            );
            sqlx::Executor::execute(&mut **conn, sql.as_str()).await?;
            self.search_path_set = true;
        }
        Ok(&mut **conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> DatabasePools {
        let config = TenancyConfig::single("postgres://localhost/main")
            .with_database("db1", "postgres://localhost/db1");
        DatabasePools::connect_lazy(Arc::new(config)).unwrap()
    }

    #[tokio::test]
    async fn checkout_starts_on_public() {
        let mut connections = pools().checkout();
        for alias in ["default", "db1"] {
            let conn = connections.get_mut(alias).unwrap();
            assert!(conn.is_public());
            assert!(conn.current_tenant().is_none());
            assert_eq!(conn.schema_name(), "public");
        }
        assert!(matches!(connections.get("db9"), Err(TenancyError::UnknownDatabase(_))));
    }

    #[tokio::test]
    async fn set_tenant_and_back_to_public() {
        let mut connections = pools().checkout();
        let tenant = Tenant::new(2, "acme", "acme.example.com").with_db_string("db1");
        let conn = connections.get_mut("db1").unwrap();

        conn.set_tenant(&tenant).unwrap();
        assert_eq!(conn.schema_name(), "acme");
        assert_eq!(conn.current_tenant(), Some(&tenant));
        assert!(!conn.is_public());

        conn.set_schema_to_public();
        assert!(conn.is_public());
        assert!(conn.current_tenant().is_none());
    }

    #[tokio::test]
    async fn set_schema_validates_name() {
        let mut connections = pools().checkout();
        let conn = connections.default_connection().unwrap();
        assert!(matches!(
            conn.set_schema("drop table; --"),
            Err(TenancyError::InvalidSchemaName(_))
        ));
        assert!(conn.is_public());

        conn.set_schema("reports").unwrap();
        assert_eq!(conn.schema_name(), "reports");
        assert!(conn.current_tenant().is_none());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn connection_future_is_send() {
        let mut connections = pools().checkout();
        let conn = connections.default_connection().unwrap();
        let query = conn.connection();
        assert_send(&query);
    }

    #[tokio::test]
    async fn search_path_sent_after_rebind_when_limited() {
        let config = TenancyConfig::single("postgres://localhost/main").with_limit_set_calls(true);
        let mut connections = DatabasePools::connect_lazy(Arc::new(config)).unwrap().checkout();
        let conn = connections.default_connection().unwrap();
        assert!(conn.needs_search_path());

        conn.search_path_set = true;
        assert!(!conn.needs_search_path());

        conn.set_schema_to_public();
        assert!(!conn.needs_search_path(), "same binding must not resend");

        conn.set_tenant(&Tenant::new(2, "acme", "acme.example.com")).unwrap();
        assert!(conn.needs_search_path());
    }

    #[tokio::test]
    async fn search_path_sent_every_call_when_unlimited() {
        let mut connections = pools().checkout();
        let conn = connections.default_connection().unwrap();
        assert!(!conn.config.limit_set_calls);
        conn.search_path_set = true;
        assert!(conn.needs_search_path());
    }

    #[tokio::test]
    async fn checkouts_do_not_share_bindings() {
        let pools = pools();
        let mut first = pools.checkout();
        let second = pools.checkout();
        first
            .default_connection()
            .unwrap()
            .set_tenant(&Tenant::new(2, "acme", "acme.example.com"))
            .unwrap();
        assert!(second.get(DEFAULT_DB).unwrap().is_public());
    }
}
