//! Tenant Schemas: hostname-based schema multi-tenancy for PostgreSQL backends.

pub mod assignment;
pub mod config;
pub mod connection;
pub mod context;
pub mod directory;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod resolver;
pub mod router;
pub mod state;
pub mod store;
pub mod tenant;
pub mod utils;

pub use assignment::{assign_db_string, next_db_string};
pub use config::{DatabaseEntry, TenancyConfig, DEFAULT_DB, DEFAULT_PUBLIC_SCHEMA};
pub use connection::{Binding, Connections, DatabasePools, TenantConnection};
pub use context::{schema_context, tenant_context, TenantScope};
pub use directory::{InMemoryTenantDirectory, PgTenantDirectory, TenantDirectory};
pub use error::TenancyError;
pub use extractors::CurrentTenant;
pub use middleware::{tenant_middleware, with_tenancy, TenantRequest};
pub use resolver::{
    hostname_from_request, resolve_tenant, DomainTenantResolver, SubdomainTenantResolver, TenantResolver,
};
pub use router::{DatabaseRouter, MultiDbRouter, RoutingState};
pub use state::TenancyState;
pub use store::ensure_database_exists;
pub use tenant::Tenant;
pub use utils::{is_valid_schema_name, remove_www, remove_www_and_dev, schema_exists};
