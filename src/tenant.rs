//! Tenant record as stored in the shared tenants table.

use crate::config::DEFAULT_DB;
use serde::{Deserialize, Serialize};

/// One isolated customer. `schema_name` is unique; the public tenant uses the configured public schema name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    /// Creation order. The highest id is the most recently created tenant.
    pub id: i64,
    pub schema_name: String,
    /// Hostname the tenant is served on (without `www.`).
    pub domain_url: String,
    /// Logical database alias the tenant's schema lives on.
    pub db_string: String,
}

impl Tenant {
    pub fn new(id: i64, schema_name: impl Into<String>, domain_url: impl Into<String>) -> Self {
        Tenant {
            id,
            schema_name: schema_name.into(),
            domain_url: domain_url.into(),
            db_string: DEFAULT_DB.into(),
        }
    }

    pub fn with_db_string(mut self, db_string: impl Into<String>) -> Self {
        self.db_string = db_string.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tenant_lives_on_default() {
        let tenant = Tenant::new(7, "acme", "acme.example.com");
        assert_eq!(tenant.db_string, DEFAULT_DB);
        assert_eq!(tenant.with_db_string("db2").db_string, "db2");
    }
}
