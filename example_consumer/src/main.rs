//! Example consumer: an axum server serving each tenant from its own schema.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Configure with `DATABASE_URL`, `TENANT_DATABASES`, `PUBLIC_SCHEMA_URLCONF=public`, ...

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tenant_schemas::{
    assign_db_string, ensure_database_exists, schema_context, schema_exists, with_tenancy, CurrentTenant,
    DatabasePools, PgTenantDirectory, TenancyConfig, TenancyError, TenancyState,
};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tenant_schemas=info,example_consumer=info")),
        )
        .init();

    let config = Arc::new(TenancyConfig::from_env()?);
    for db in &config.databases {
        ensure_database_exists(&db.url).await?;
    }
    let pools = DatabasePools::connect(config.clone()).await?;
    let directory = Arc::new(PgTenantDirectory::new(
        pools.default_pool()?.clone(),
        config.tenant_table.clone(),
    ));

    let base = TenancyState::new(pools, directory);
    let public_routes = Router::new()
        .route("/api/v1/tenant", get(current_tenant))
        .route("/api/v1/placement/:schema_name", get(placement))
        .route("/api/v1/schemas/:schema_name/tables", get(schema_tables))
        .with_state(base.clone());
    let state = match config.public_schema_urlconf.clone() {
        Some(name) => base.with_urlconf(name, public_routes),
        None => base,
    };
    if let Some(name) = state.unregistered_public_urlconf() {
        tracing::warn!(urlconf = %name, "PUBLIC_SCHEMA_URLCONF names an unregistered route table");
    }

    let tenant_routes = Router::new()
        .route("/api/v1/tenant", get(current_tenant))
        .route("/api/v1/tables", get(tables));
    let app = with_tenancy(tenant_routes, state)
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .layer(RequestBodyLimitLayer::new(1024 * 1024));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

/// GET /api/v1/tenant: the tenant the host resolved to and where its queries go.
async fn current_tenant(CurrentTenant(req): CurrentTenant) -> Json<Value> {
    Json(json!({
        "data": {
            "tenant": req.tenant,
            "hostname": req.hostname,
            "read_db": req.db_for_read("tenant"),
            "write_db": req.db_for_write("tenant"),
        }
    }))
}

/// GET /api/v1/tables: tables visible in the tenant's schema.
async fn tables(CurrentTenant(req): CurrentTenant) -> Result<Json<Value>, TenancyError> {
    let alias = req.db_for_read("information_schema.tables");
    let mut conns = req.connections().await;
    let conn = conns.get_mut(&alias)?.connection().await?;
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT table_name::text FROM information_schema.tables WHERE table_schema = current_schema() ORDER BY 1",
    )
    .fetch_all(conn)
    .await?;
    Ok(Json(json!({ "data": names.into_iter().map(|(n,)| n).collect::<Vec<_>>() })))
}

/// GET /api/v1/placement/:schema_name: database a new tenant would be created on.
async fn placement(
    State(state): State<TenancyState>,
    CurrentTenant(req): CurrentTenant,
    Path(schema_name): Path<String>,
) -> Result<Json<Value>, TenancyError> {
    let db = assign_db_string(state.config(), state.directory.as_ref(), &schema_name).await?;
    let mut conns = req.connections().await;
    let exists = schema_exists(&mut conns, &schema_name, Some(&db)).await?;
    Ok(Json(json!({ "data": { "schema_name": schema_name, "db_string": db, "schema_exists": exists } })))
}

/// GET /api/v1/schemas/:schema_name/tables: tables of another tenant, from the public site.
async fn schema_tables(
    State(state): State<TenancyState>,
    CurrentTenant(req): CurrentTenant,
    Path(schema_name): Path<String>,
) -> Result<Json<Value>, TenancyError> {
    let mut conns = req.connections().await;
    let mut scope = schema_context(&mut conns, state.directory.as_ref(), &schema_name, None).await?;
    let conn = scope.connection()?.connection().await?;
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT table_name::text FROM information_schema.tables WHERE table_schema = current_schema() ORDER BY 1",
    )
    .fetch_all(conn)
    .await?;
    Ok(Json(json!({ "data": names.into_iter().map(|(n,)| n).collect::<Vec<_>>() })))
}
