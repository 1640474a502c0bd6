//! Per-request resource resolution: bind a path segment to a dedicated schema
//! or fall back to a generic table-backed handle.

use crate::error::ApiError;
use crate::schema::{ResourceSchema, SchemaRegistry};
use crate::storage::Storage;
use std::sync::Arc;

/// Which binding produced the handle. The engine never branches on this; it
/// depends only on the schema and storage target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Dedicated,
    Generic,
}

/// The resolved binding for one request: schema, storage target, soft-delete
/// support. Created per request and discarded at request end.
#[derive(Clone, Debug)]
pub struct ResourceHandle {
    pub schema: Arc<ResourceSchema>,
    pub table: String,
    pub soft_delete: bool,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    /// Whether the resource declares this operation as requiring an
    /// authenticated caller.
    pub fn requires_auth(&self, operation: &str) -> bool {
        self.schema.authenticated_ops().iter().any(|op| op == operation)
    }
}

#[derive(Clone)]
pub struct ResourceResolver {
    registry: Arc<SchemaRegistry>,
}

impl ResourceResolver {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        ResourceResolver { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Dedicated schemas take precedence over generic table binding, so a
    /// schema author can override generic behavior for any table by
    /// registering a schema under the same name.
    pub async fn resolve(
        &self,
        storage: &dyn Storage,
        segment: &str,
    ) -> Result<ResourceHandle, ApiError> {
        if let Some(schema) = self.registry.describe(segment) {
            return Ok(ResourceHandle {
                table: schema.table().to_string(),
                soft_delete: schema.supports_soft_delete(),
                schema,
                kind: ResourceKind::Dedicated,
            });
        }

        if storage.table_exists(segment).await? {
            let columns = storage.column_catalog(segment).await?;
            let schema = ResourceSchema::from_catalog(segment, segment, &columns)?;
            return Ok(ResourceHandle {
                table: segment.to_string(),
                soft_delete: schema.supports_soft_delete(),
                schema: Arc::new(schema),
                kind: ResourceKind::Generic,
            });
        }

        Err(ApiError::NotFoundModel)
    }
}
