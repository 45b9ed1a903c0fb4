//! Shared tenancy state handed to the tenant middleware.

use crate::config::TenancyConfig;
use crate::connection::DatabasePools;
use crate::directory::TenantDirectory;
use crate::resolver::{DomainTenantResolver, TenantResolver};
use crate::router::{DatabaseRouter, MultiDbRouter};
use axum::http::StatusCode;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct TenancyState {
    pub pools: DatabasePools,
    pub directory: Arc<dyn TenantDirectory>,
    pub resolver: Arc<dyn TenantResolver>,
    pub router: Arc<dyn DatabaseRouter>,
    /// Status sent when no tenant matches the host. Defaults to 404.
    pub not_found_status: StatusCode,
    /// Alternate route tables by name; the public tenant is served by the one named in `PUBLIC_SCHEMA_URLCONF`.
    pub urlconfs: Arc<HashMap<String, Router>>,
}

impl TenancyState {
    /// Domain-based resolution, request-state routing, 404 on unknown hosts.
    pub fn new(pools: DatabasePools, directory: Arc<dyn TenantDirectory>) -> Self {
        TenancyState {
            pools,
            directory,
            resolver: Arc::new(DomainTenantResolver),
            router: Arc::new(MultiDbRouter),
            not_found_status: StatusCode::NOT_FOUND,
            urlconfs: Arc::new(HashMap::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TenantResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_router(mut self, router: Arc<dyn DatabaseRouter>) -> Self {
        self.router = router;
        self
    }

    pub fn with_not_found_status(mut self, status: StatusCode) -> Self {
        self.not_found_status = status;
        self
    }

    /// Register a named route table.
    pub fn with_urlconf(mut self, name: impl Into<String>, routes: Router) -> Self {
        Arc::make_mut(&mut self.urlconfs).insert(name.into(), routes);
        self
    }

    pub fn config(&self) -> &TenancyConfig {
        self.pools.config()
    }

    /// The configured public route table name, when no table was registered under it.
    pub fn unregistered_public_urlconf(&self) -> Option<&str> {
        self.config()
            .public_schema_urlconf
            .as_deref()
            .filter(|name| !self.urlconfs.contains_key(*name))
    }
}
