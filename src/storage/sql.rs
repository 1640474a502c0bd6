//! Builds parameterized SELECT, INSERT, UPDATE, and DELETE statements from a
//! resource schema and a query plan. Building is separate from execution so
//! the output is assertable without a database.

use crate::query::{IncludeLoad, QueryPlan, TrashVisibility};
use crate::schema::{FieldType, RelationKind, ResourceSchema, DELETED_AT, UPDATED_AT, CREATED_AT};
use crate::storage::Selector;
use serde_json::{Map, Value};

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: names come from schema metadata).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// SQL cast for placeholders bound from JSON strings, where the column type
/// needs one to compare or store correctly.
fn cast_for(field_type: FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::DateTime => Some("timestamptz"),
        FieldType::Date => Some("date"),
        FieldType::Json => Some("jsonb"),
        _ => None,
    }
}

fn placeholder(schema: &ResourceSchema, column: &str, n: usize) -> String {
    schema
        .field(column)
        .and_then(|f| cast_for(f.field_type))
        .map(|t| format!("${}::{}", n, t))
        .unwrap_or_else(|| format!("${}", n))
}

fn column_list(schema: &ResourceSchema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| quoted(&f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn aliased_column_list(schema: &ResourceSchema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}.{}", MAIN_ALIAS, quoted(&f.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Scalar subquery loading one relation, visibility already propagated.
fn include_subquery(inc: &IncludeLoad) -> String {
    let rel = &inc.relation;
    let mut inner = format!(
        "SELECT * FROM {} WHERE {} = {}.{}",
        quoted(&rel.table),
        quoted(&rel.their_key),
        MAIN_ALIAS,
        quoted(&rel.our_key)
    );
    if rel.soft_delete && !inc.with_trashed {
        inner.push_str(&format!(" AND {} IS NULL", quoted(DELETED_AT)));
    }
    let subquery = match rel.kind {
        RelationKind::ToOne => format!("(SELECT row_to_json(sub) FROM ({}) sub)", inner),
        RelationKind::ToMany => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM ({}) sub)",
            inner
        ),
    };
    format!("{} AS {}", subquery, quoted(&rel.name))
}

fn visibility_predicate(soft_delete: bool, visibility: TrashVisibility, alias: Option<&str>) -> Option<String> {
    if !soft_delete {
        return None;
    }
    let column = match alias {
        Some(a) => format!("{}.{}", a, quoted(DELETED_AT)),
        None => quoted(DELETED_AT),
    };
    match visibility {
        TrashVisibility::Default => Some(format!("{} IS NULL", column)),
        TrashVisibility::WithTrashed => None,
        TrashVisibility::OnlyTrashed => Some(format!("{} IS NOT NULL", column)),
    }
}

/// Shared WHERE parts for the count and page queries: search group, then
/// equality filters, then soft-delete visibility.
fn plan_predicate(schema: &ResourceSchema, plan: &QueryPlan, buf: &mut QueryBuf) -> Vec<String> {
    let mut parts = Vec::new();

    if let Some(search) = &plan.search {
        if search.fields.is_empty() {
            parts.push("1 = 0".to_string());
        } else {
            let n = buf.push_param(Value::String(format!("%{}%", search.term)));
            let group = search
                .fields
                .iter()
                .map(|f| format!("{}.{} ILIKE ${}", MAIN_ALIAS, quoted(f), n))
                .collect::<Vec<_>>()
                .join(" OR ");
            parts.push(format!("({})", group));
        }
    }

    for (column, value) in &plan.filters {
        let n = buf.push_param(value.clone());
        parts.push(format!(
            "{}.{} = {}",
            MAIN_ALIAS,
            quoted(column),
            placeholder(schema, column, n)
        ));
    }

    if let Some(vis) = visibility_predicate(plan.soft_delete, plan.visibility, Some(MAIN_ALIAS)) {
        parts.push(vis);
    }
    parts
}

fn where_clause(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(schema: &ResourceSchema, plan: &QueryPlan) -> String {
    if plan.order_by.is_empty() {
        return format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(schema.primary_key()));
    }
    let keys = plan
        .order_by
        .iter()
        .map(|(f, dir)| format!("{}.{} {}", MAIN_ALIAS, quoted(f), dir.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {}", keys)
}

/// Count query: the plan's predicate with no pagination, so the reported
/// totals reflect the filtered set.
pub fn select_count(schema: &ResourceSchema, table: &str, plan: &QueryPlan) -> QueryBuf {
    let mut q = QueryBuf::new();
    let parts = plan_predicate(schema, plan, &mut q);
    q.sql = format!(
        "SELECT COUNT(*) FROM {} {}{}",
        quoted(table),
        MAIN_ALIAS,
        where_clause(&parts)
    );
    q
}

/// Page query: same predicate as the count query, plus includes, ordering,
/// and pagination.
pub fn select_page(schema: &ResourceSchema, table: &str, plan: &QueryPlan) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut select_parts = vec![aliased_column_list(schema)];
    for inc in &plan.includes {
        select_parts.push(include_subquery(inc));
    }
    let parts = plan_predicate(schema, plan, &mut q);
    q.sql = format!(
        "SELECT {} FROM {} {}{}{} LIMIT {} OFFSET {}",
        select_parts.join(", "),
        quoted(table),
        MAIN_ALIAS,
        where_clause(&parts),
        order_clause(schema, plan),
        plan.limit,
        plan.offset
    );
    q
}

/// SELECT one record by primary key within a soft-delete scope.
pub fn select_by_id(
    schema: &ResourceSchema,
    table: &str,
    id: i64,
    scope: TrashVisibility,
    includes: &[IncludeLoad],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut select_parts = vec![aliased_column_list(schema)];
    for inc in includes {
        select_parts.push(include_subquery(inc));
    }
    let n = q.push_param(Value::Number(id.into()));
    let mut parts = vec![format!(
        "{}.{} = ${}",
        MAIN_ALIAS,
        quoted(schema.primary_key()),
        n
    )];
    if let Some(vis) = visibility_predicate(schema.supports_soft_delete(), scope, Some(MAIN_ALIAS)) {
        parts.push(vis);
    }
    q.sql = format!(
        "SELECT {} FROM {} {}{}",
        select_parts.join(", "),
        quoted(table),
        MAIN_ALIAS,
        where_clause(&parts)
    );
    q
}

/// INSERT the given fields; lifecycle timestamps come from the store clock.
pub fn insert(schema: &ResourceSchema, table: &str, fields: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for field in schema.fields() {
        if let Some(v) = fields.get(&field.name) {
            let n = q.push_param(v.clone());
            cols.push(quoted(&field.name));
            values.push(placeholder(schema, &field.name, n));
        }
    }
    for ts in [CREATED_AT, UPDATED_AT] {
        if schema.has_field(ts) && !fields.contains_key(ts) {
            cols.push(quoted(ts));
            values.push("NOW()".to_string());
        }
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", quoted(table), column_list(schema))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quoted(table),
            cols.join(", "),
            values.join(", "),
            column_list(schema)
        )
    };
    q
}

/// UPDATE by primary key within a scope; bumps the updated-timestamp.
pub fn update(
    schema: &ResourceSchema,
    table: &str,
    id: i64,
    fields: &Map<String, Value>,
    scope: TrashVisibility,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for field in schema.fields() {
        if let Some(v) = fields.get(&field.name) {
            let n = q.push_param(v.clone());
            sets.push(format!(
                "{} = {}",
                quoted(&field.name),
                placeholder(schema, &field.name, n)
            ));
        }
    }
    if schema.has_field(UPDATED_AT) {
        sets.push(format!("{} = NOW()", quoted(UPDATED_AT)));
    }
    let n = q.push_param(Value::Number(id.into()));
    let mut parts = vec![format!("{} = ${}", quoted(schema.primary_key()), n)];
    if let Some(vis) = visibility_predicate(schema.supports_soft_delete(), scope, None) {
        parts.push(vis);
    }
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        quoted(table),
        sets.join(", "),
        where_clause(&parts),
        column_list(schema)
    );
    q
}

/// Selector predicate on the primary key. `All` adds nothing; the operation's
/// scope predicate still applies. An empty id list matches nothing.
fn selector_predicate(schema: &ResourceSchema, selector: &Selector, q: &mut QueryBuf) -> Option<String> {
    let pk = quoted(schema.primary_key());
    match selector {
        Selector::Id(id) => {
            let n = q.push_param(Value::Number((*id).into()));
            Some(format!("{} = ${}", pk, n))
        }
        Selector::Selected(ids) => {
            if ids.is_empty() {
                return Some("1 = 0".to_string());
            }
            let placeholders: Vec<String> = ids
                .iter()
                .map(|id| format!("${}", q.push_param(Value::Number((*id).into()))))
                .collect();
            Some(format!("{} IN ({})", pk, placeholders.join(", ")))
        }
        Selector::All => None,
    }
}

/// Soft-delete matching active records; a plain DELETE when the resource does
/// not soft-delete.
pub fn soft_delete(schema: &ResourceSchema, table: &str, selector: &Selector) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut parts = Vec::new();
    if let Some(sel) = selector_predicate(schema, selector, &mut q) {
        parts.push(sel);
    }
    if !schema.supports_soft_delete() {
        q.sql = format!(
            "DELETE FROM {}{} RETURNING {}",
            quoted(table),
            where_clause(&parts),
            column_list(schema)
        );
        return q;
    }
    parts.push(format!("{} IS NULL", quoted(DELETED_AT)));
    let mut sets = vec![format!("{} = NOW()", quoted(DELETED_AT))];
    if schema.has_field(UPDATED_AT) {
        sets.push(format!("{} = NOW()", quoted(UPDATED_AT)));
    }
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        quoted(table),
        sets.join(", "),
        where_clause(&parts),
        column_list(schema)
    );
    q
}

/// Clear the deleted-timestamp on trashed records.
pub fn restore(schema: &ResourceSchema, table: &str, selector: &Selector) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut parts = Vec::new();
    if let Some(sel) = selector_predicate(schema, selector, &mut q) {
        parts.push(sel);
    }
    parts.push(format!("{} IS NOT NULL", quoted(DELETED_AT)));
    let mut sets = vec![format!("{} = NULL", quoted(DELETED_AT))];
    if schema.has_field(UPDATED_AT) {
        sets.push(format!("{} = NOW()", quoted(UPDATED_AT)));
    }
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        quoted(table),
        sets.join(", "),
        where_clause(&parts),
        column_list(schema)
    );
    q
}

/// Permanently remove trashed records.
pub fn purge(schema: &ResourceSchema, table: &str, selector: &Selector) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut parts = Vec::new();
    if let Some(sel) = selector_predicate(schema, selector, &mut q) {
        parts.push(sel);
    }
    parts.push(format!("{} IS NOT NULL", quoted(DELETED_AT)));
    q.sql = format!(
        "DELETE FROM {}{} RETURNING {}",
        quoted(table),
        where_clause(&parts),
        column_list(schema)
    );
    q
}
