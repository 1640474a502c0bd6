//! In-memory storage and router fixtures for the end-to-end tests.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use crudkit::query::{IncludeLoad, QueryPlan, SortDirection, TrashVisibility};
use crudkit::{
    AllowAll, ApiError, AppState, Authorizer, ColumnMeta, ResourceHandle, SchemaRegistry,
    Selector, StaticTokenAuthorizer, Storage,
};
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const API_TOKEN: &str = "sesame";

#[derive(Default)]
struct Table {
    rows: Vec<Map<String, Value>>,
    next_id: i64,
}

/// Interprets query plans against plain JSON rows; the HTTP tests exercise the
/// engine without a database.
#[derive(Default)]
pub struct MemStorage {
    tables: Mutex<HashMap<String, Table>>,
    catalogs: HashMap<String, Vec<ColumnMeta>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, table: &str, columns: Vec<ColumnMeta>) -> Self {
        self.catalogs.insert(table.to_string(), columns);
        self.ensure_table(table);
        self
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.ensure_table(table);
        {
            let mut tables = self.tables.lock().unwrap();
            let t = tables.get_mut(table).unwrap();
            for row in rows {
                let row = row.as_object().unwrap().clone();
                let id = row.get("id").and_then(Value::as_i64).unwrap_or(0);
                t.next_id = t.next_id.max(id + 1);
                t.rows.push(row);
            }
        }
        self
    }

    fn ensure_table(&self, table: &str) {
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_string()).or_insert_with(|| Table {
            rows: Vec::new(),
            next_id: 1,
        });
    }
}

fn is_trashed(row: &Map<String, Value>) -> bool {
    matches!(row.get("deleted_at"), Some(v) if !v.is_null())
}

fn visible(row: &Map<String, Value>, soft_delete: bool, scope: TrashVisibility) -> bool {
    if !soft_delete {
        return true;
    }
    match scope {
        TrashVisibility::Default => !is_trashed(row),
        TrashVisibility::WithTrashed => true,
        TrashVisibility::OnlyTrashed => is_trashed(row),
    }
}

fn matches_selector(row: &Map<String, Value>, pk: &str, selector: &Selector) -> bool {
    let id = row.get(pk).and_then(Value::as_i64);
    match selector {
        Selector::Id(want) => id == Some(*want),
        Selector::Selected(ids) => id.map(|i| ids.contains(&i)).unwrap_or(false),
        Selector::All => true,
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a
            .as_str()
            .unwrap_or_default()
            .cmp(b.as_str().unwrap_or_default()),
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

#[async_trait]
impl Storage for MemStorage {
    async fn table_exists(&self, table: &str) -> Result<bool, ApiError> {
        Ok(self.catalogs.contains_key(table) || self.tables.lock().unwrap().contains_key(table))
    }

    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnMeta>, ApiError> {
        Ok(self.catalogs.get(table).cloned().unwrap_or_default())
    }

    async fn query(
        &self,
        handle: &ResourceHandle,
        plan: &QueryPlan,
    ) -> Result<(Vec<Value>, u64), ApiError> {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(&handle.table).ok_or(ApiError::NotFoundModel)?;

        let mut matched: Vec<Map<String, Value>> = table
            .rows
            .iter()
            .filter(|row| visible(row, plan.soft_delete, plan.visibility))
            .filter(|row| {
                plan.filters
                    .iter()
                    .all(|(field, want)| row.get(field) == Some(want))
            })
            .filter(|row| match &plan.search {
                None => true,
                Some(search) => {
                    let term = search.term.to_lowercase();
                    search.fields.iter().any(|f| {
                        row.get(f)
                            .and_then(Value::as_str)
                            .map(|s| s.to_lowercase().contains(&term))
                            .unwrap_or(false)
                    })
                }
            })
            .cloned()
            .collect();

        for (field, dir) in plan.order_by.iter().rev() {
            matched.sort_by(|a, b| {
                let ord = compare(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match dir {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        let count = matched.len() as u64;
        let page: Vec<Value> = matched
            .into_iter()
            .skip(plan.offset as usize)
            .take(plan.limit as usize)
            .map(Value::Object)
            .collect();
        Ok((page, count))
    }

    async fn find_by_id(
        &self,
        handle: &ResourceHandle,
        id: i64,
        scope: TrashVisibility,
        _includes: &[IncludeLoad],
    ) -> Result<Option<Value>, ApiError> {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(&handle.table).ok_or(ApiError::NotFoundModel)?;
        let pk = handle.schema.primary_key();
        Ok(table
            .rows
            .iter()
            .find(|row| {
                row.get(pk).and_then(Value::as_i64) == Some(id)
                    && visible(row, handle.soft_delete, scope)
            })
            .cloned()
            .map(Value::Object))
    }

    async fn insert(
        &self,
        handle: &ResourceHandle,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&handle.table).ok_or(ApiError::NotFoundModel)?;

        let mut row = Map::new();
        for field in handle.schema.fields() {
            row.insert(
                field.name.clone(),
                fields.get(&field.name).cloned().unwrap_or(Value::Null),
            );
        }
        row.insert(handle.schema.primary_key().to_string(), json!(table.next_id));
        table.next_id += 1;
        if handle.schema.has_field("created_at") {
            row.insert("created_at".into(), now());
        }
        if handle.schema.has_field("updated_at") {
            row.insert("updated_at".into(), now());
        }
        table.rows.push(row.clone());
        Ok(Value::Object(row))
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        id: i64,
        fields: &Map<String, Value>,
        scope: TrashVisibility,
    ) -> Result<Option<Value>, ApiError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&handle.table).ok_or(ApiError::NotFoundModel)?;
        let pk = handle.schema.primary_key().to_string();
        let soft_delete = handle.soft_delete;

        for row in table.rows.iter_mut() {
            if row.get(&pk).and_then(Value::as_i64) == Some(id) && visible(row, soft_delete, scope) {
                for (k, v) in fields {
                    row.insert(k.clone(), v.clone());
                }
                if handle.schema.has_field("updated_at") {
                    row.insert("updated_at".into(), now());
                }
                return Ok(Some(Value::Object(row.clone())));
            }
        }
        Ok(None)
    }

    async fn soft_delete(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&handle.table).ok_or(ApiError::NotFoundModel)?;
        let pk = handle.schema.primary_key().to_string();

        if !handle.soft_delete {
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut table.rows)
                .into_iter()
                .partition(|row| matches_selector(row, &pk, selector));
            table.rows = kept;
            return Ok(removed.into_iter().map(Value::Object).collect());
        }

        let mut affected = Vec::new();
        for row in table.rows.iter_mut() {
            if !is_trashed(row) && matches_selector(row, &pk, selector) {
                row.insert("deleted_at".into(), now());
                affected.push(Value::Object(row.clone()));
            }
        }
        Ok(affected)
    }

    async fn restore(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&handle.table).ok_or(ApiError::NotFoundModel)?;
        let pk = handle.schema.primary_key().to_string();

        let mut affected = Vec::new();
        for row in table.rows.iter_mut() {
            if is_trashed(row) && matches_selector(row, &pk, selector) {
                row.insert("deleted_at".into(), Value::Null);
                affected.push(Value::Object(row.clone()));
            }
        }
        Ok(affected)
    }

    async fn purge(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&handle.table).ok_or(ApiError::NotFoundModel)?;
        let pk = handle.schema.primary_key().to_string();

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut table.rows)
            .into_iter()
            .partition(|row| is_trashed(row) && matches_selector(row, &pk, selector));
        table.rows = kept;
        Ok(removed.into_iter().map(Value::Object).collect())
    }
}

const SCHEMAS: &str = r#"[
    {
        "resource": "files",
        "fields": [
            {"name": "id", "label": "ID", "type": "integer", "primary": true},
            {"name": "filename", "label": "Filename", "type": "text", "nullable": true,
             "validated": true,
             "validation": {"create": ["nullable", {"of_type": "text"}, {"max_length": 255}],
                            "update": ["nullable", {"of_type": "text"}]}},
            {"name": "type", "label": "Type", "type": "text",
             "validated": true,
             "validation": {"create": ["required", {"of_type": "text"}, {"max_length": 100}],
                            "update": ["required", {"of_type": "text"}]}},
            {"name": "size", "label": "Size", "type": "integer", "nullable": true},
            {"name": "created_at", "label": "Created At", "type": "datetime"},
            {"name": "updated_at", "label": "Updated At", "type": "datetime"},
            {"name": "deleted_at", "label": "Deleted At", "type": "datetime", "nullable": true}
        ],
        "searchable": ["filename", "type"]
    },
    {
        "resource": "secrets",
        "fields": [
            {"name": "id", "label": "ID", "type": "integer", "primary": true},
            {"name": "name", "label": "Name", "type": "text"}
        ],
        "authenticated_operations": ["list", "create"]
    }
]"#;

fn file_row(id: i64, filename: &str, kind: &str, size: i64, deleted: bool) -> Value {
    json!({
        "id": id,
        "filename": filename,
        "type": kind,
        "size": size,
        "created_at": "2024-01-01T00:00:00+00:00",
        "updated_at": "2024-01-01T00:00:00+00:00",
        "deleted_at": if deleted { json!("2024-02-01T00:00:00+00:00") } else { Value::Null }
    })
}

fn col(name: &str, data_type: &str, primary: bool) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: !primary,
        primary,
    }
}

/// Router over seeded data: dedicated `files` (soft delete) and `secrets`
/// (authenticated), a generic `notes` table (soft delete), and a generic
/// `plain` table without one.
pub fn app() -> Router {
    let storage = MemStorage::new()
        .with_rows(
            "files",
            vec![
                file_row(1, "report.pdf", "pdf", 100, false),
                file_row(2, "photo.png", "image", 2048, false),
                file_row(3, "banner.png", "image", 512, false),
                file_row(4, "old.log", "log", 10, true),
            ],
        )
        .with_rows("secrets", vec![json!({"id": 1, "name": "alpha"})])
        .with_catalog(
            "notes",
            vec![
                col("id", "bigint", true),
                col("body", "text", false),
                col("deleted_at", "timestamp with time zone", false),
            ],
        )
        .with_rows(
            "notes",
            vec![
                json!({"id": 1, "body": "first", "deleted_at": null}),
                json!({"id": 2, "body": "second", "deleted_at": null}),
            ],
        )
        .with_catalog(
            "plain",
            vec![col("id", "bigint", true), col("label", "text", false)],
        )
        .with_rows("plain", vec![json!({"id": 1, "label": "only"})]);

    let registry = SchemaRegistry::from_json(SCHEMAS).unwrap();
    let authorizer: Arc<dyn Authorizer> = Arc::new(StaticTokenAuthorizer::new(API_TOKEN));
    let state = AppState::new(Arc::new(storage), Arc::new(registry), authorizer);
    crudkit::router(state)
}

/// Same fixture with an allow-everything authorizer.
pub fn open_app() -> Router {
    let storage = MemStorage::new()
        .with_rows("files", vec![file_row(1, "a.txt", "text", 1, false)])
        .with_rows("secrets", vec![json!({"id": 1, "name": "alpha"})]);
    let registry = SchemaRegistry::from_json(SCHEMAS).unwrap();
    let state = AppState::new(Arc::new(storage), Arc::new(registry), Arc::new(AllowAll));
    crudkit::router(state)
}

pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
