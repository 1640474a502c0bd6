//! Registry of dedicated schemas, keyed by resource name. Pure lookup after
//! the initial load; safe for concurrent reads.

use crate::error::SchemaError;
use crate::schema::{FieldDescriptor, RelationSpec, ResourceSchema};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw schema definition as authored in metadata JSON.
#[derive(Clone, Debug, Deserialize)]
pub struct SchemaDef {
    pub resource: String,
    /// Storage table; defaults to the resource name.
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub searchable: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
    #[serde(default)]
    pub authenticated_operations: Vec<String>,
}

impl SchemaDef {
    pub fn into_schema(self) -> Result<ResourceSchema, SchemaError> {
        let table = self.table.unwrap_or_else(|| self.resource.clone());
        ResourceSchema::new(
            self.resource,
            table,
            self.fields,
            self.searchable,
            self.relations,
            self.authenticated_operations,
        )
    }
}

#[derive(Default)]
pub struct SchemaRegistry {
    by_resource: HashMap<String, Arc<ResourceSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: ResourceSchema) {
        self.by_resource
            .insert(schema.resource().to_string(), Arc::new(schema));
    }

    /// Dedicated schema for a resource name, if one was registered.
    pub fn describe(&self, resource: &str) -> Option<Arc<ResourceSchema>> {
        self.by_resource.get(resource).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_resource.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }

    /// Load a registry from a JSON array of schema definitions.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let defs: Vec<SchemaDef> =
            serde_json::from_str(json).map_err(|e| SchemaError::Load(e.to_string()))?;
        let mut registry = Self::new();
        for def in defs {
            registry.register(def.into_schema()?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMAS: &str = r#"[
        {
            "resource": "files",
            "fields": [
                {"name": "id", "label": "ID", "type": "integer", "primary": true},
                {"name": "filename", "label": "Filename", "type": "text", "nullable": true,
                 "validated": true,
                 "validation": {"create": ["nullable", {"of_type": "text"}, {"max_length": 255}]}},
                {"name": "type", "label": "Type", "type": "text",
                 "validated": true,
                 "validation": {"create": ["required", {"of_type": "text"}, {"max_length": 100}],
                                "update": ["required", {"of_type": "text"}]}},
                {"name": "created_at", "label": "Created At", "type": "datetime"},
                {"name": "updated_at", "label": "Updated At", "type": "datetime"},
                {"name": "deleted_at", "label": "Deleted At", "type": "datetime", "nullable": true}
            ],
            "searchable": ["filename", "type"],
            "authenticated_operations": ["create", "update", "delete"]
        }
    ]"#;

    #[test]
    fn loads_schemas_from_json() {
        let registry = SchemaRegistry::from_json(SCHEMAS).unwrap();
        assert_eq!(registry.len(), 1);
        let schema = registry.describe("files").unwrap();
        assert_eq!(schema.table(), "files");
        assert_eq!(schema.primary_key(), "id");
        assert_eq!(schema.searchable(), &["filename".to_string(), "type".to_string()]);
        assert!(schema.supports_soft_delete());
        assert_eq!(schema.authenticated_ops(), &["create", "update", "delete"]);
    }

    #[test]
    fn describe_misses_unknown_resources() {
        let registry = SchemaRegistry::from_json(SCHEMAS).unwrap();
        assert!(registry.describe("widgets").is_none());
    }
}
