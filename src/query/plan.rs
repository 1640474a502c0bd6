//! Storage-agnostic query plan built from a request filter set and a schema.
//! The same predicate drives the count query and the page query; only
//! pagination differs.

use crate::error::ApiError;
use crate::query::filter::{RequestFilterSet, SortDirection};
use crate::schema::{FieldType, RelationSpec, ResourceSchema};
use serde_json::Value;

/// Soft-delete visibility for a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrashVisibility {
    /// Active records only (deleted-timestamp is null).
    Default,
    /// Active and trashed records.
    WithTrashed,
    /// Trashed records only.
    OnlyTrashed,
}

/// Free-text search: OR-combined case-insensitive contains over the
/// searchable fields. An empty field list matches nothing.
#[derive(Clone, Debug)]
pub struct SearchSpec {
    pub term: String,
    pub fields: Vec<String>,
}

/// One relation to eager-load, with the soft-delete visibility propagated
/// into the relation's own query.
#[derive(Clone, Debug)]
pub struct IncludeLoad {
    pub relation: RelationSpec,
    pub with_trashed: bool,
}

#[derive(Clone, Debug)]
pub struct QueryPlan {
    pub search: Option<SearchSpec>,
    pub filters: Vec<(String, Value)>,
    pub includes: Vec<IncludeLoad>,
    pub visibility: TrashVisibility,
    pub order_by: Vec<(String, SortDirection)>,
    pub offset: u64,
    pub limit: u64,
    /// Whether the base table soft-deletes at all.
    pub soft_delete: bool,
}

impl QueryPlan {
    /// Apply the listing rules in their fixed order. Unknown filter, order-by,
    /// and relation names are rejected rather than passed through.
    pub fn build(
        schema: &ResourceSchema,
        req: &RequestFilterSet,
        base: TrashVisibility,
    ) -> Result<QueryPlan, ApiError> {
        let search = req.search.as_ref().map(|term| SearchSpec {
            term: term.clone(),
            fields: schema.searchable().to_vec(),
        });

        let mut filters = Vec::with_capacity(req.filters.len());
        for (field, raw) in &req.filters {
            let descriptor = schema.field(field).ok_or_else(|| {
                ApiError::BadRequest(format!("Unknown filter field '{}'", field))
            })?;
            filters.push((field.clone(), coerce_filter_value(descriptor.field_type, raw)));
        }

        let mut includes = Vec::with_capacity(req.includes.len());
        for name in &req.includes {
            let relation = schema
                .relation(name)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown relation '{}'", name)))?;
            includes.push(IncludeLoad {
                relation: relation.clone(),
                with_trashed: req.with_trashed,
            });
        }

        let visibility = match base {
            TrashVisibility::OnlyTrashed => TrashVisibility::OnlyTrashed,
            _ if req.with_trashed => TrashVisibility::WithTrashed,
            other => other,
        };

        for (field, _) in &req.order_by {
            if !schema.has_field(field) {
                return Err(ApiError::BadRequest(format!("Unknown orderBy field '{}'", field)));
            }
        }

        Ok(QueryPlan {
            search,
            filters,
            includes,
            visibility,
            order_by: req.order_by.clone(),
            offset: req.page.saturating_mul(req.limit),
            limit: req.limit,
            soft_delete: schema.supports_soft_delete(),
        })
    }
}

/// Coerce a raw query-string value by the filtered field's type. Values that
/// do not parse stay strings; the storage layer's comparison will miss.
fn coerce_filter_value(field_type: FieldType, raw: &str) -> Value {
    match field_type {
        FieldType::Integer => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        FieldType::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        FieldType::Boolean => {
            if raw.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if raw.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                Value::String(raw.to_string())
            }
        }
        _ => Value::String(raw.to_string()),
    }
}
