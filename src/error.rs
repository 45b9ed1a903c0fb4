//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TenancyError {
    /// No tenant matches the request, or the matched record is not a usable tenant.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),
    #[error("multiple databases are configured; specify which one to use")]
    MultipleDatabasesConfigured,
    #[error("unknown database: {0}")]
    UnknownDatabase(String),
    #[error("invalid schema name: {0}")]
    InvalidSchemaName(String),
    #[error("tenant context missing from request")]
    MissingContext,
    #[error("config: {0}")]
    Config(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl TenancyError {
    pub fn status(&self) -> StatusCode {
        match self {
            TenancyError::TenantNotFound(_) => StatusCode::NOT_FOUND,
            TenancyError::InvalidSchemaName(_) => StatusCode::BAD_REQUEST,
            TenancyError::MultipleDatabasesConfigured
            | TenancyError::UnknownDatabase(_)
            | TenancyError::MissingContext
            | TenancyError::Config(_)
            | TenancyError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TenancyError::TenantNotFound(_) => "tenant_not_found",
            TenancyError::MultipleDatabasesConfigured => "multiple_databases",
            TenancyError::UnknownDatabase(_) => "unknown_database",
            TenancyError::InvalidSchemaName(_) => "invalid_schema_name",
            TenancyError::MissingContext => "missing_tenant_context",
            TenancyError::Config(_) => "config_error",
            TenancyError::Db(_) => "database_error",
        }
    }

    /// Render with an explicit status, used by the middleware when the not-found status is overridden.
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for TenancyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "tenancy error");
        }
        self.into_response_with_status(status)
    }
}
