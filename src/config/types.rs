//! Tenancy configuration: public schema, logical databases and connection options.

use crate::tenant::Tenant;

/// Alias of the primary database. The shared tenants table lives here.
pub const DEFAULT_DB: &str = "default";

/// Schema name of the public tenant unless `PUBLIC_SCHEMA_NAME` overrides it.
pub const DEFAULT_PUBLIC_SCHEMA: &str = "public";

pub const DEFAULT_TENANT_TABLE: &str = "public.tenants";

/// One configured logical database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub alias: String,
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct TenancyConfig {
    pub public_schema_name: String,
    /// Routing configuration used for requests served by the public tenant.
    pub public_schema_urlconf: Option<String>,
    /// Ordered; the first entry is always [`DEFAULT_DB`].
    pub databases: Vec<DatabaseEntry>,
    pub multi_db: bool,
    /// Issue `SET search_path` only once per binding change on a checked-out connection.
    pub limit_set_calls: bool,
    /// Schemas appended to every search path after the tenant schema and public.
    pub extra_search_paths: Vec<String>,
    /// Schema-qualified table holding tenant rows on the default database.
    pub tenant_table: String,
    pub max_connections: u32,
}

impl TenancyConfig {
    /// Single-database configuration pointing at `database_url`.
    pub fn single(database_url: impl Into<String>) -> Self {
        TenancyConfig {
            public_schema_name: DEFAULT_PUBLIC_SCHEMA.into(),
            public_schema_urlconf: None,
            databases: vec![DatabaseEntry {
                alias: DEFAULT_DB.into(),
                url: database_url.into(),
            }],
            multi_db: false,
            limit_set_calls: false,
            extra_search_paths: Vec::new(),
            tenant_table: DEFAULT_TENANT_TABLE.into(),
            max_connections: 5,
        }
    }

    /// Add (or replace) a logical database. Adding a non-default alias turns multi-db mode on.
    pub fn with_database(mut self, alias: impl Into<String>, url: impl Into<String>) -> Self {
        let alias = alias.into();
        let url = url.into();
        if let Some(existing) = self.databases.iter_mut().find(|d| d.alias == alias) {
            existing.url = url;
        } else {
            self.databases.push(DatabaseEntry { alias, url });
            self.multi_db = true;
        }
        self
    }

    pub fn with_multi_db(mut self, multi_db: bool) -> Self {
        self.multi_db = multi_db;
        self
    }

    pub fn with_public_schema_name(mut self, name: impl Into<String>) -> Self {
        self.public_schema_name = name.into();
        self
    }

    pub fn with_public_urlconf(mut self, urlconf: impl Into<String>) -> Self {
        self.public_schema_urlconf = Some(urlconf.into());
        self
    }

    pub fn with_limit_set_calls(mut self, limit: bool) -> Self {
        self.limit_set_calls = limit;
        self
    }

    pub fn with_extra_search_paths(mut self, schemas: Vec<String>) -> Self {
        self.extra_search_paths = schemas;
        self
    }

    pub fn database_aliases(&self) -> impl Iterator<Item = &str> {
        self.databases.iter().map(|d| d.alias.as_str())
    }

    pub fn has_database(&self, alias: &str) -> bool {
        self.databases.iter().any(|d| d.alias == alias)
    }

    pub fn has_multiple_db(&self) -> bool {
        self.databases.len() > 1
    }

    /// Databases new tenants are spread over: every configured alias except the default one, in order.
    pub fn database_pool(&self) -> Vec<&str> {
        self.database_aliases().filter(|a| *a != DEFAULT_DB).collect()
    }

    pub fn is_public(&self, schema_name: &str) -> bool {
        schema_name == self.public_schema_name
    }

    /// Database a tenant's connection lives on for request handling.
    pub fn effective_db<'a>(&'a self, tenant: &'a Tenant) -> &'a str {
        if !self.multi_db || self.is_public(&tenant.schema_name) || tenant.db_string.is_empty() {
            DEFAULT_DB
        } else {
            tenant.db_string.as_str()
        }
    }

    /// Remove the public urlconf prefix from `url`, if one is configured and present.
    pub fn clean_tenant_url<'a>(&self, url: &'a str) -> &'a str {
        match self.public_schema_urlconf.as_deref() {
            Some(prefix) if !prefix.is_empty() => url.strip_prefix(prefix).unwrap_or(url),
            _ => url,
        }
    }
}
