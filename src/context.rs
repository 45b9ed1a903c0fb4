//! Scoped tenant/schema bindings.
//!
//! [`tenant_context`] and [`schema_context`] rebind one connection handle and return a
//! [`TenantScope`]. Dropping the scope puts the previous binding back, whether the
//! scoped code finished, returned early with `?`, or panicked. Scopes deref to the
//! underlying [`Connections`], so they nest:
//!
//! ```rust,ignore
//! let mut outer = tenant_context(&mut connections, &acme, None)?;
//! {
//!     let mut inner = tenant_context(&mut outer, &globex, None)?;
//!     let conn = inner.connection()?.connection().await?;
//!     // queries here run against globex
//! }
//! // back on acme
//! ```

use crate::config::DEFAULT_DB;
use crate::connection::{Binding, Connections, TenantConnection};
use crate::directory::TenantDirectory;
use crate::error::TenancyError;
use crate::tenant::Tenant;
use std::ops::{Deref, DerefMut};

/// Guard restoring a connection binding on drop.
pub struct TenantScope<'a> {
    connections: &'a mut Connections,
    alias: String,
    previous: Option<Binding>,
}

impl<'a> TenantScope<'a> {
    /// Alias of the database whose handle this scope rebound.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The rebound handle.
    pub fn connection(&mut self) -> Result<&mut TenantConnection, TenancyError> {
        self.connections.get_mut(&self.alias)
    }
}

impl Deref for TenantScope<'_> {
    type Target = Connections;

    fn deref(&self) -> &Connections {
        self.connections
    }
}

impl DerefMut for TenantScope<'_> {
    fn deref_mut(&mut self) -> &mut Connections {
        self.connections
    }
}

impl Drop for TenantScope<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let public = previous.tenant.is_none() && self.connections.config().is_public(&previous.schema_name);
        if let Ok(conn) = self.connections.get_mut(&self.alias) {
            if public {
                conn.set_schema_to_public();
            } else {
                conn.restore(previous);
            }
        }
    }
}

fn enter<'a>(
    connections: &'a mut Connections,
    alias: String,
    bind: impl FnOnce(&mut TenantConnection) -> Result<(), TenancyError>,
) -> Result<TenantScope<'a>, TenancyError> {
    let conn = connections.get_mut(&alias)?;
    let previous = conn.binding().clone();
    bind(conn)?;
    Ok(TenantScope {
        connections,
        alias,
        previous: Some(previous),
    })
}

/// Bind `tenant` on the handle for `db`, or for the tenant's own database when `db` is `None`.
pub fn tenant_context<'a>(
    connections: &'a mut Connections,
    tenant: &Tenant,
    db: Option<&str>,
) -> Result<TenantScope<'a>, TenancyError> {
    let alias = match db {
        Some(db) => db.to_string(),
        None => connections.config().effective_db(tenant).to_string(),
    };
    enter(connections, alias, |conn| conn.set_tenant(tenant))
}

/// Bind the bare schema `schema_name`.
///
/// Without `db`, the public schema maps to the default database and any other schema to
/// the database of the tenant owning it, looked up in `directory`.
pub async fn schema_context<'a>(
    connections: &'a mut Connections,
    directory: &dyn TenantDirectory,
    schema_name: &str,
    db: Option<&str>,
) -> Result<TenantScope<'a>, TenancyError> {
    let alias = match db {
        Some(db) => db.to_string(),
        None if connections.config().is_public(schema_name) => DEFAULT_DB.to_string(),
        None => {
            let tenant = directory.get_by_schema_name(schema_name).await?;
            connections.config().effective_db(&tenant).to_string()
        }
    };
    enter(connections, alias, |conn| conn.set_schema(schema_name))
}
