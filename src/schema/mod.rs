//! Resource schemas: ordered field metadata, searchable subset, relations,
//! and the registry of dedicated schemas.

mod field;
mod registry;

pub use field::{FieldDescriptor, FieldType, Rule, Stage, StageRules};
pub use registry::{SchemaDef, SchemaRegistry};

use crate::error::SchemaError;
use crate::storage::ColumnMeta;
use serde::{Deserialize, Serialize};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Direction of a relation: to_one (we hold the foreign key) or to_many
/// (the related table holds a foreign key to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// One eager-loadable relation declared by a schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationSpec {
    /// Name used in the `with` request parameter.
    pub name: String,
    /// Related storage table.
    pub table: String,
    /// Our column in the join.
    pub our_key: String,
    /// Their column in the join.
    pub their_key: String,
    pub kind: RelationKind,
    /// Whether the related table soft-deletes; controls `withtrashed` propagation.
    #[serde(default)]
    pub soft_delete: bool,
}

/// Ordered field metadata for one resource. Constructed at startup (dedicated)
/// or on first reference (generic, from the column catalog); read-only after.
#[derive(Clone, Debug)]
pub struct ResourceSchema {
    resource: String,
    table: String,
    fields: Vec<FieldDescriptor>,
    primary_key: String,
    searchable: Vec<String>,
    relations: Vec<RelationSpec>,
    /// Operation names that require an authenticated caller.
    authenticated_ops: Vec<String>,
}

impl ResourceSchema {
    pub fn new(
        resource: impl Into<String>,
        table: impl Into<String>,
        fields: Vec<FieldDescriptor>,
        searchable: Vec<String>,
        relations: Vec<RelationSpec>,
        authenticated_ops: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let resource = resource.into();
        let mut primary = fields.iter().filter(|f| f.primary);
        let primary_key = match (primary.next(), primary.next()) {
            (Some(pk), None) => pk.name.clone(),
            (None, _) => return Err(SchemaError::MissingPrimaryKey(resource)),
            (Some(_), Some(_)) => return Err(SchemaError::MultiplePrimaryKeys(resource)),
        };
        for name in &searchable {
            if !fields.iter().any(|f| &f.name == name) {
                return Err(SchemaError::UnknownField {
                    resource,
                    field: name.clone(),
                });
            }
        }
        Ok(ResourceSchema {
            resource,
            table: table.into(),
            fields,
            primary_key,
            searchable,
            relations,
            authenticated_ops,
        })
    }

    /// Derive a generic schema from a storage column catalog. Text columns
    /// (other than the primary key) become the searchable subset.
    pub fn from_catalog(resource: &str, table: &str, columns: &[ColumnMeta]) -> Result<Self, SchemaError> {
        let mut fields = Vec::with_capacity(columns.len());
        for col in columns {
            let field_type = field_type_for(&col.data_type);
            fields.push(FieldDescriptor::bare(
                &col.name,
                label_for(&col.name),
                field_type,
                col.nullable,
                col.primary,
            ));
        }
        // Catalogs without a declared key fall back to an `id` column.
        if !fields.iter().any(|f| f.primary) {
            if let Some(id) = fields.iter_mut().find(|f| f.name == "id") {
                id.primary = true;
            }
        }
        let searchable = fields
            .iter()
            .filter(|f| f.field_type == FieldType::Text && !f.primary)
            .map(|f| f.name.clone())
            .collect();
        Self::new(resource, table, fields, searchable, Vec::new(), Vec::new())
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn searchable(&self) -> &[String] {
        &self.searchable
    }

    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn authenticated_ops(&self) -> &[String] {
        &self.authenticated_ops
    }

    /// Soft delete is supported when the schema carries a deleted-timestamp field.
    pub fn supports_soft_delete(&self) -> bool {
        self.has_field(DELETED_AT)
    }
}

/// Map a storage type name (information_schema spelling) to a field type tag.
fn field_type_for(data_type: &str) -> FieldType {
    let t = data_type.to_lowercase();
    if t.contains("int") || t.contains("serial") {
        FieldType::Integer
    } else if t.contains("numeric") || t.contains("real") || t.contains("double") || t.contains("decimal") {
        FieldType::Float
    } else if t.starts_with("bool") {
        FieldType::Boolean
    } else if t.contains("timestamp") || t.contains("datetime") {
        FieldType::DateTime
    } else if t == "date" {
        FieldType::Date
    } else if t.contains("json") {
        FieldType::Json
    } else {
        FieldType::Text
    }
}

/// "created_at" -> "Created At"
fn label_for(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
