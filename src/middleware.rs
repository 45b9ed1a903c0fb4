//! Tenant-scope middleware.
//!
//! Per request: reset the default connection to public, resolve the tenant from the
//! host, bind the tenant's connection, record the tenant's database in the request
//! routing state, run the rest of the stack, then clear the routing state. Unknown
//! hosts are answered with the not-found status before any handler runs.

use crate::config::DEFAULT_DB;
use crate::connection::Connections;
use crate::error::TenancyError;
use crate::resolver::{hostname_from_request, resolve_tenant};
use crate::router::{DatabaseRouter, RoutingState};
use crate::state::TenancyState;
use crate::tenant::Tenant;
use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tower::ServiceExt;

/// What tenant resolution attached to the request.
#[derive(Clone)]
pub struct TenantRequest {
    pub tenant: Tenant,
    pub hostname: String,
    /// Alternate route table in effect for this request, if any.
    pub urlconf: Option<String>,
    pub routing: RoutingState,
    connections: Arc<Mutex<Connections>>,
    router: Arc<dyn DatabaseRouter>,
}

impl TenantRequest {
    /// Database alias for reading `model`; the default database when the router has no preference.
    pub fn db_for_read(&self, model: &str) -> String {
        self.router
            .db_for_read(model, &self.routing)
            .unwrap_or_else(|| DEFAULT_DB.to_string())
    }

    pub fn db_for_write(&self, model: &str) -> String {
        self.router
            .db_for_write(model, &self.routing)
            .unwrap_or_else(|| DEFAULT_DB.to_string())
    }

    /// The request's connection handles, bound by the middleware.
    pub async fn connections(&self) -> MutexGuard<'_, Connections> {
        self.connections.lock().await
    }
}

/// Empties the routing state when dropped, on every exit path of the middleware.
struct ClearRouting(RoutingState);

impl Drop for ClearRouting {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Axum middleware function; install with [`with_tenancy`] or `from_fn_with_state`.
pub async fn tenant_middleware(State(state): State<TenancyState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let routing = RoutingState::new();
    let _clear = ClearRouting(routing.clone());

    let mut connections = state.pools.checkout();
    let tenant_request = match bind_tenant(&state, &parts, &mut connections, &routing).await {
        Ok((tenant, hostname)) => {
            let urlconf = public_urlconf(&state, &tenant);
            TenantRequest {
                tenant,
                hostname,
                urlconf,
                routing: routing.clone(),
                connections: Arc::new(Mutex::new(connections)),
                router: state.router.clone(),
            }
        }
        Err(err @ TenancyError::TenantNotFound(_)) => {
            tracing::debug!(error = %err, "tenant not found");
            return err.into_response_with_status(state.not_found_status);
        }
        Err(err) => return err.into_response(),
    };

    let urlconf = tenant_request.urlconf.clone();
    parts.extensions.insert(tenant_request);
    let request = Request::from_parts(parts, body);

    if let Some(name) = urlconf.as_deref() {
        match state.urlconfs.get(name) {
            Some(routes) => {
                return routes
                    .clone()
                    .oneshot(request)
                    .await
                    .unwrap_or_else(|never| match never {});
            }
            None => tracing::warn!(urlconf = %name, "public route table not registered, serving tenant routes"),
        }
    }
    next.run(request).await
}

/// Reset, resolve and bind. Returns the tenant and normalized hostname.
async fn bind_tenant(
    state: &TenancyState,
    parts: &Parts,
    connections: &mut Connections,
    routing: &RoutingState,
) -> Result<(Tenant, String), TenancyError> {
    connections.default_connection()?.set_schema_to_public();

    let hostname = hostname_from_request(parts)?;
    let config = state.config();
    let tenant = resolve_tenant(state.resolver.as_ref(), state.directory.as_ref(), config, &hostname).await?;

    let db = config.effective_db(&tenant);
    connections.get_mut(db)?.set_tenant(&tenant)?;
    if config.multi_db {
        routing.set(db);
    }
    tracing::debug!(host = %hostname, schema = %tenant.schema_name, db = %db, "tenant bound");
    Ok((tenant, hostname))
}

fn public_urlconf(state: &TenancyState, tenant: &Tenant) -> Option<String> {
    let config = state.config();
    if config.is_public(&tenant.schema_name) {
        config.public_schema_urlconf.clone()
    } else {
        None
    }
}

/// Wrap `routes` with the tenant middleware.
pub fn with_tenancy(routes: Router, state: TenancyState) -> Router {
    routes.layer(from_fn_with_state(state, tenant_middleware))
}
