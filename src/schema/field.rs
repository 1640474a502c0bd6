//! Field metadata: storage type tags, validation rule tags, per-stage rule sets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage type tag for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    #[serde(rename = "datetime")]
    DateTime,
    Date,
    Json,
    /// File-typed fields are declared in schemas; upload mechanics live outside the core.
    File,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Date => "date",
            FieldType::Json => "json",
            FieldType::File => "file",
        }
    }
}

/// Closed set of composable validation predicates. Rule expressions are data,
/// not strings, so schemas stay statically checkable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    Nullable,
    MaxLength(u32),
    OfType(FieldType),
    InSet(Vec<Value>),
    Pattern(String),
}

/// Validation stage an operation runs under. Patch shares the update stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Create,
    Update,
    Delete,
}

/// Per-stage rule sets; an absent entry means the field is unchecked at that stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StageRules {
    #[serde(default)]
    pub create: Option<Vec<Rule>>,
    #[serde(default)]
    pub update: Option<Vec<Rule>>,
    #[serde(default)]
    pub delete: Option<Vec<Rule>>,
}

impl StageRules {
    pub fn for_stage(&self, stage: Stage) -> Option<&[Rule]> {
        match stage {
            Stage::Create => self.create.as_deref(),
            Stage::Update => self.update.as_deref(),
            Stage::Delete => self.delete.as_deref(),
        }
    }
}

/// One field of a resource schema. Immutable once loaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub validation: StageRules,
    /// UI hint only; inert to the engine.
    #[serde(default)]
    pub display: bool,
    #[serde(default)]
    pub note: Option<String>,
}

impl FieldDescriptor {
    /// Minimal descriptor for catalog-derived generic schemas.
    pub fn bare(name: &str, label: String, field_type: FieldType, nullable: bool, primary: bool) -> Self {
        FieldDescriptor {
            name: name.to_string(),
            label,
            field_type,
            nullable,
            primary,
            validated: false,
            validation: StageRules::default(),
            display: false,
            note: None,
        }
    }
}
