//! Shared application state handed to every handler.

use crate::auth::Authorizer;
use crate::engine::CrudEngine;
use crate::schema::SchemaRegistry;
use crate::storage::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CrudEngine>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<SchemaRegistry>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        AppState {
            engine: Arc::new(CrudEngine::new(storage, registry, authorizer)),
        }
    }
}
