//! Hostname resolution: request host → tenant record.

use crate::config::TenancyConfig;
use crate::directory::TenantDirectory;
use crate::error::TenancyError;
use crate::tenant::Tenant;
use crate::utils::{is_valid_schema_name, remove_www};
use async_trait::async_trait;
use axum::http::{header::HOST, request::Parts};

/// Normalized hostname of a request: port removed, lowercased, leading `www.` dropped.
pub fn hostname_from_request(parts: &Parts) -> Result<String, TenancyError> {
    let raw = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TenancyError::TenantNotFound("request has no host".into()))?;
    Ok(remove_www(&strip_port(raw).to_lowercase()).to_string())
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map(|end| &host[..=end]).unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

/// Deployment-specific mapping from hostname to tenant.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// `hostname` is already normalized by [`hostname_from_request`].
    async fn get_tenant(&self, directory: &dyn TenantDirectory, hostname: &str) -> Result<Tenant, TenancyError>;
}

/// Looks the hostname up against each tenant's `domain_url`.
#[derive(Clone, Debug, Default)]
pub struct DomainTenantResolver;

#[async_trait]
impl TenantResolver for DomainTenantResolver {
    async fn get_tenant(&self, directory: &dyn TenantDirectory, hostname: &str) -> Result<Tenant, TenancyError> {
        directory.get_by_domain(hostname).await
    }
}

/// Uses the first label under `base_domain` as the schema name.
///
/// `acme.example.com` → schema `acme`; `example.com` itself → the public tenant.
#[derive(Clone, Debug)]
pub struct SubdomainTenantResolver {
    base_domain: String,
    public_schema: String,
}

impl SubdomainTenantResolver {
    pub fn new(base_domain: impl Into<String>, public_schema: impl Into<String>) -> Self {
        SubdomainTenantResolver {
            base_domain: base_domain.into().to_lowercase(),
            public_schema: public_schema.into(),
        }
    }

    fn schema_for(&self, hostname: &str) -> Option<String> {
        if hostname == self.base_domain {
            return Some(self.public_schema.clone());
        }
        let subdomain = hostname.strip_suffix(&self.base_domain)?.strip_suffix('.')?;
        if subdomain.is_empty() || subdomain.contains('.') {
            return None;
        }
        Some(subdomain.to_string())
    }
}

#[async_trait]
impl TenantResolver for SubdomainTenantResolver {
    async fn get_tenant(&self, directory: &dyn TenantDirectory, hostname: &str) -> Result<Tenant, TenancyError> {
        let schema_name = self
            .schema_for(hostname)
            .ok_or_else(|| TenancyError::TenantNotFound(format!("No tenant for {:?}", hostname)))?;
        directory.get_by_schema_name(&schema_name).await
    }
}

/// Resolve `hostname` and check the record can be bound.
///
/// A record with an unusable schema name, or pinned to a database that is not configured,
/// is reported as not found.
pub async fn resolve_tenant(
    resolver: &dyn TenantResolver,
    directory: &dyn TenantDirectory,
    config: &TenancyConfig,
    hostname: &str,
) -> Result<Tenant, TenancyError> {
    let tenant = resolver.get_tenant(directory, hostname).await?;
    if !is_valid_schema_name(&tenant.schema_name) {
        return Err(TenancyError::TenantNotFound(format!(
            "Invalid tenant {:?}: bad schema name",
            tenant.schema_name
        )));
    }
    if !config.has_database(config.effective_db(&tenant)) {
        return Err(TenancyError::TenantNotFound(format!(
            "Invalid tenant {:?}: unknown database {:?}",
            tenant.schema_name, tenant.db_string
        )));
    }
    Ok(tenant)
}
