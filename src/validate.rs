//! Stage-aware request-body validation and field assignment. Validation runs
//! against the schema's per-stage rule sets and collects every failure before
//! reporting; assignment filters the body down to writable schema fields.

use crate::error::ApiError;
use crate::schema::{
    FieldDescriptor, FieldType, ResourceSchema, Rule, Stage, CREATED_AT, DELETED_AT, UPDATED_AT,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const INVALID_MESSAGE: &str = "The given data was invalid.";

/// Validate a request body for one stage. `partial` (patch) skips fields the
/// body does not mention; a full run checks every validated field.
pub fn validate(
    schema: &ResourceSchema,
    body: &Map<String, Value>,
    stage: Stage,
    partial: bool,
) -> Result<(), ApiError> {
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for field in schema.fields() {
        if !field.validated {
            continue;
        }
        let Some(rules) = field.validation.for_stage(stage) else {
            continue;
        };
        let value = body.get(&field.name);
        if partial && value.is_none() {
            continue;
        }
        let failures = check_field(field, rules, value);
        if !failures.is_empty() {
            errors.insert(field.name.clone(), failures);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation {
            message: INVALID_MESSAGE.to_string(),
            errors,
        })
    }
}

fn check_field(field: &FieldDescriptor, rules: &[Rule], value: Option<&Value>) -> Vec<String> {
    let nullable = rules.iter().any(|r| matches!(r, Rule::Nullable));
    let required = rules.iter().any(|r| matches!(r, Rule::Required));

    let present = match value {
        None | Some(Value::Null) => {
            let mut failures = Vec::new();
            if required && !nullable {
                failures.push(format!("The {} field is required.", field.label));
            }
            return failures;
        }
        Some(v) => v,
    };

    let mut failures = Vec::new();
    for rule in rules {
        match rule {
            Rule::Required | Rule::Nullable => {}
            Rule::MaxLength(max) => {
                if let Value::String(s) = present {
                    if s.chars().count() as u32 > *max {
                        failures.push(format!(
                            "The {} field must not be greater than {} characters.",
                            field.label, max
                        ));
                    }
                }
            }
            Rule::OfType(expected) => {
                if !value_matches_type(present, *expected) {
                    failures.push(format!(
                        "The {} field must be of type {}.",
                        field.label,
                        expected.as_str()
                    ));
                }
            }
            Rule::InSet(allowed) => {
                if !allowed.contains(present) {
                    failures.push(format!("The selected {} is invalid.", field.label));
                }
            }
            Rule::Pattern(pattern) => match Regex::new(pattern) {
                Ok(re) => {
                    let matches = matches!(present, Value::String(s) if re.is_match(s));
                    if !matches {
                        failures.push(format!("The {} field format is invalid.", field.label));
                    }
                }
                Err(err) => {
                    tracing::warn!(field = %field.name, %err, "unparseable validation pattern, skipping");
                }
            },
        }
    }
    failures
}

/// JSON-value check for a field type tag. Date and datetime accept strings in
/// the formats the storage layer can cast.
fn value_matches_type(value: &Value, expected: FieldType) -> bool {
    match expected {
        FieldType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
        FieldType::Float => value.is_number(),
        FieldType::Text | FieldType::File => value.is_string(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::DateTime => matches!(value, Value::String(s) if parses_as_datetime(s)),
        FieldType::Date => {
            matches!(value, Value::String(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
        }
        FieldType::Json => value.is_object() || value.is_array(),
    }
}

fn parses_as_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
}

/// Filter a request body down to assignable fields: known schema fields minus
/// the primary key and lifecycle timestamps. Keys with a leading underscore
/// are request-internal markers and are never persisted.
pub fn assignable_fields(schema: &ResourceSchema, body: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in body {
        if key.starts_with('_') {
            continue;
        }
        if key == schema.primary_key() {
            continue;
        }
        if key == CREATED_AT || key == UPDATED_AT || key == DELETED_AT {
            continue;
        }
        if schema.has_field(key) {
            fields.insert(key.clone(), value.clone());
        }
    }
    fields
}
