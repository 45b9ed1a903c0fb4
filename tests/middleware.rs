//! End-to-end tests for the tenant middleware driven through an axum router.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tenant_schemas::{
    with_tenancy, CurrentTenant, DatabasePools, InMemoryTenantDirectory, RoutingState, SubdomainTenantResolver,
    TenancyConfig, TenancyError, TenancyState, Tenant,
};
use tower::ServiceExt;

fn tenants() -> InMemoryTenantDirectory {
    InMemoryTenantDirectory::with_tenants([
        Tenant::new(1, "public", "example.com"),
        Tenant::new(2, "acme", "acme.example.com").with_db_string("db1"),
        Tenant::new(3, "globex", "globex.example.com").with_db_string("db2"),
    ])
}

fn single_db() -> TenancyConfig {
    TenancyConfig::single("postgres://localhost/tenants")
}

fn multi_db() -> TenancyConfig {
    single_db()
        .with_database("db1", "postgres://localhost/tenants_db1")
        .with_database("db2", "postgres://localhost/tenants_db2")
}

fn state(config: TenancyConfig) -> TenancyState {
    let pools = DatabasePools::connect_lazy(Arc::new(config)).unwrap();
    TenancyState::new(pools, Arc::new(tenants()))
}

/// Routing state seen by the last handler call, plus whether a handler ran at all.
#[derive(Clone, Default)]
struct Probe {
    routing: Arc<Mutex<Option<RoutingState>>>,
    called: Arc<AtomicBool>,
}

impl Probe {
    fn routing(&self) -> RoutingState {
        self.routing.lock().unwrap().clone().expect("handler did not run")
    }
}

fn app(state: TenancyState, probe: Probe) -> Router {
    let seen = probe.clone();
    let failing = probe.clone();
    let routes = Router::new()
        .route(
            "/whoami",
            get(move |CurrentTenant(req): CurrentTenant| {
                let seen = seen.clone();
                async move {
                    seen.called.store(true, Ordering::SeqCst);
                    *seen.routing.lock().unwrap() = Some(req.routing.clone());
                    let read_db = req.db_for_read("Invoice");
                    let write_db = req.db_for_write("Invoice");
                    let conns = req.connections().await;
                    let conn = conns.get(&read_db).unwrap();
                    Json(json!({
                        "schema_name": req.tenant.schema_name,
                        "hostname": req.hostname,
                        "read_db": read_db,
                        "write_db": write_db,
                        "bound_schema": conn.schema_name(),
                        "bound_tenant": conn.current_tenant().map(|t| t.schema_name.clone()),
                        "routing_set": req.routing.is_set(),
                        "urlconf": req.urlconf,
                    }))
                }
            }),
        )
        .route(
            "/fail",
            get(move |CurrentTenant(req): CurrentTenant| {
                let failing = failing.clone();
                async move {
                    failing.called.store(true, Ordering::SeqCst);
                    *failing.routing.lock().unwrap() = Some(req.routing.clone());
                    TenancyError::Config("handler blew up".into()).into_response()
                }
            }),
        );
    with_tenancy(routes, state)
}

fn request(host: &str, path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn www_host_resolves_and_binds_schema() {
    let probe = Probe::default();
    let response = app(state(single_db()), probe.clone())
        .oneshot(request("www.acme.example.com", "/whoami"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["schema_name"], "acme");
    assert_eq!(body["hostname"], "acme.example.com");
    assert_eq!(body["read_db"], "default");
    assert_eq!(body["bound_schema"], "acme");
    assert_eq!(body["bound_tenant"], "acme");
    assert_eq!(body["routing_set"], false);
    assert!(!probe.routing().is_set());
}

#[tokio::test]
async fn multi_db_routes_to_tenant_database_then_clears() {
    let probe = Probe::default();
    let response = app(state(multi_db()), probe.clone())
        .oneshot(request("globex.example.com:8000", "/whoami"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["read_db"], "db2");
    assert_eq!(body["write_db"], "db2");
    assert_eq!(body["bound_schema"], "globex");
    assert_eq!(body["routing_set"], true);
    assert!(!probe.routing().is_set(), "routing state leaked past the response");
}

#[tokio::test]
async fn public_tenant_routes_to_default() {
    let probe = Probe::default();
    let response = app(state(multi_db()), probe.clone())
        .oneshot(request("www.example.com", "/whoami"))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["schema_name"], "public");
    assert_eq!(body["read_db"], "default");
    assert_eq!(body["write_db"], "default");
    assert_eq!(body["bound_schema"], "public");
    assert_eq!(body["urlconf"], Value::Null);
}

#[tokio::test]
async fn unknown_host_is_not_found_and_skips_handler() {
    let probe = Probe::default();
    let response = app(state(multi_db()), probe.clone())
        .oneshot(request("initech.example.com", "/whoami"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "tenant_not_found");
    assert!(!probe.called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn not_found_status_is_configurable() {
    let probe = Probe::default();
    let state = state(single_db()).with_not_found_status(StatusCode::GONE);
    let response = app(state, probe.clone())
        .oneshot(request("initech.example.com", "/whoami"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    assert!(!probe.called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failing_handler_still_clears_routing() {
    let probe = Probe::default();
    let response = app(state(multi_db()), probe.clone())
        .oneshot(request("acme.example.com", "/fail"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(probe.called.load(Ordering::SeqCst));
    assert!(!probe.routing().is_set());
}

#[tokio::test]
async fn consecutive_requests_do_not_share_state() {
    let probe = Probe::default();
    let app = app(state(multi_db()), probe.clone());

    let first = json_body(app.clone().oneshot(request("acme.example.com", "/whoami")).await.unwrap()).await;
    let first_routing = probe.routing();
    let second = json_body(app.oneshot(request("example.com", "/whoami")).await.unwrap()).await;

    assert_eq!(first["read_db"], "db1");
    assert_eq!(second["read_db"], "default");
    assert_eq!(second["bound_schema"], "public");
    assert!(!first_routing.is_set());
}

#[tokio::test]
async fn public_tenant_uses_public_urlconf() {
    let config = single_db().with_public_urlconf("public_site");
    let public_site = Router::new().route("/whoami", get(|| async { "public site" }));
    let state = state(config).with_urlconf("public_site", public_site);
    let app = app(state, Probe::default());

    let response = app.clone().oneshot(request("example.com", "/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"public site");

    let tenant = json_body(app.oneshot(request("acme.example.com", "/whoami")).await.unwrap()).await;
    assert_eq!(tenant["schema_name"], "acme");
    assert_eq!(tenant["urlconf"], Value::Null);
}

#[tokio::test]
async fn subdomain_resolver_can_replace_domain_lookup() {
    let state = state(multi_db()).with_resolver(Arc::new(SubdomainTenantResolver::new("example.com", "public")));
    let body = json_body(
        app(state, Probe::default())
            .oneshot(request("www.acme.example.com", "/whoami"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["schema_name"], "acme");
    assert_eq!(body["read_db"], "db1");
}

#[tokio::test]
async fn extractor_without_middleware_is_a_server_error() {
    let routes = Router::new().route(
        "/whoami",
        get(|CurrentTenant(req): CurrentTenant| async move { req.tenant.schema_name }),
    );
    let response = routes.oneshot(request("acme.example.com", "/whoami")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

async fn current_schema(CurrentTenant(req): CurrentTenant) -> Result<String, TenancyError> {
    let alias = req.db_for_read("Invoice");
    let mut conns = req.connections().await;
    let conn = conns.get_mut(&alias)?.connection().await?;
    let (schema,): (String,) = sqlx::query_as("SELECT current_schema()::text").fetch_one(conn).await?;
    Ok(schema)
}

#[tokio::test]
async fn handlers_can_query_through_the_bound_connection() {
    let routes = Router::new().route("/schema", get(current_schema));
    let response = with_tenancy(routes, state(multi_db()))
        .oneshot(request("initech.example.com", "/schema"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_public_urlconf_serves_tenant_routes() {
    let state = state(single_db().with_public_urlconf("public_site"));
    assert_eq!(state.unregistered_public_urlconf(), Some("public_site"));

    let body = json_body(
        app(state, Probe::default())
            .oneshot(request("example.com", "/whoami"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["schema_name"], "public");
    assert_eq!(body["urlconf"], "public_site");
}
