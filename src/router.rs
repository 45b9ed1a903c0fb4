//! Database routing for multi-database deployments.

use std::sync::{Arc, RwLock};

/// Request-scoped slot naming the logical database for the request's queries.
///
/// Empty at the start of a request, filled by the tenant middleware, emptied when the middleware returns.
#[derive(Clone, Debug, Default)]
pub struct RoutingState {
    db: Arc<RwLock<Option<String>>>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, db: impl Into<String>) {
        *self.db.write().unwrap_or_else(|e| e.into_inner()) = Some(db.into());
    }

    pub fn get(&self) -> Option<String> {
        self.db.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_set(&self) -> bool {
        self.db.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn clear(&self) {
        self.db.write().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Chooses the database for a model's reads and writes. `None` means no preference.
pub trait DatabaseRouter: Send + Sync {
    fn db_for_read(&self, model: &str, routing: &RoutingState) -> Option<String>;
    fn db_for_write(&self, model: &str, routing: &RoutingState) -> Option<String>;
}

/// Sends every model to the database recorded for the current request.
#[derive(Clone, Debug, Default)]
pub struct MultiDbRouter;

impl DatabaseRouter for MultiDbRouter {
    fn db_for_read(&self, _model: &str, routing: &RoutingState) -> Option<String> {
        routing.get()
    }

    fn db_for_write(&self, _model: &str, routing: &RoutingState) -> Option<String> {
        routing.get()
    }
}
