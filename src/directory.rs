//! Tenant lookups. The shared tenants table lives on the default database.

use crate::error::TenancyError;
use crate::tenant::Tenant;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::RwLock;

/// Read access to tenant records.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Fails with `TenantNotFound` when no tenant has this schema name.
    async fn get_by_schema_name(&self, schema_name: &str) -> Result<Tenant, TenancyError>;

    /// Fails with `TenantNotFound` when no tenant is served on this hostname.
    async fn get_by_domain(&self, domain: &str) -> Result<Tenant, TenancyError>;

    /// Most recently created tenant (highest id) other than the public one.
    async fn get_most_recent_non_public(&self, public_schema: &str) -> Result<Option<Tenant>, TenancyError>;
}

/// Directory backed by the tenants table, read through the default pool.
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
    table: String,
}

impl PgTenantDirectory {
    /// `table` is schema-qualified (e.g. `public.tenants`) so lookups ignore the connection's search path.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        PgTenantDirectory {
            pool,
            table: table.into(),
        }
    }

    /// `id` is widened so `serial` and `bigserial` keys both decode into `i64`.
    fn select(&self, filter: &str) -> String {
        format!(
            "SELECT id::int8 AS id, schema_name, domain_url, db_string FROM {} {}",
            self.table, filter
        )
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn get_by_schema_name(&self, schema_name: &str) -> Result<Tenant, TenancyError> {
        sqlx::query_as::<_, Tenant>(&self.select("WHERE schema_name = $1"))
            .bind(schema_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| TenancyError::TenantNotFound(format!("no tenant with schema {:?}", schema_name)))
    }

    async fn get_by_domain(&self, domain: &str) -> Result<Tenant, TenancyError> {
        sqlx::query_as::<_, Tenant>(&self.select("WHERE domain_url = $1"))
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| TenancyError::TenantNotFound(format!("No tenant for {:?}", domain)))
    }

    async fn get_most_recent_non_public(&self, public_schema: &str) -> Result<Option<Tenant>, TenancyError> {
        let tenant = sqlx::query_as::<_, Tenant>(&self.select("WHERE schema_name <> $1 ORDER BY id DESC LIMIT 1"))
            .bind(public_schema)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }
}

/// Directory kept in memory. Useful for tests and fixed tenant sets.
#[derive(Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<Vec<Tenant>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        InMemoryTenantDirectory {
            tenants: RwLock::new(tenants.into_iter().collect()),
        }
    }

    /// Add a tenant, replacing any existing one with the same schema name.
    pub fn insert(&self, tenant: Tenant) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        tenants.retain(|t| t.schema_name != tenant.schema_name);
        tenants.push(tenant);
    }

    /// Next free id, mirroring a serial primary key.
    pub fn next_id(&self) -> i64 {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        tenants.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn find(&self, pred: impl Fn(&Tenant) -> bool) -> Option<Tenant> {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        tenants.iter().find(|t| pred(t)).cloned()
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn get_by_schema_name(&self, schema_name: &str) -> Result<Tenant, TenancyError> {
        self.find(|t| t.schema_name == schema_name)
            .ok_or_else(|| TenancyError::TenantNotFound(format!("no tenant with schema {:?}", schema_name)))
    }

    async fn get_by_domain(&self, domain: &str) -> Result<Tenant, TenancyError> {
        self.find(|t| t.domain_url == domain)
            .ok_or_else(|| TenancyError::TenantNotFound(format!("No tenant for {:?}", domain)))
    }

    async fn get_most_recent_non_public(&self, public_schema: &str) -> Result<Option<Tenant>, TenancyError> {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        Ok(tenants
            .iter()
            .filter(|t| t.schema_name != public_schema)
            .max_by_key(|t| t.id)
            .cloned())
    }
}
