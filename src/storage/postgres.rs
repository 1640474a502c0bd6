//! PostgreSQL storage: executes the built statements over a connection pool
//! and decodes rows into JSON records by the schema's field types.

use crate::error::ApiError;
use crate::query::{IncludeLoad, QueryPlan, TrashVisibility};
use crate::resolver::ResourceHandle;
use crate::schema::{FieldType, ResourceSchema};
use crate::storage::sql::{self, QueryBuf};
use crate::storage::{ColumnMeta, Selector, Storage};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgPool, PgRow, PgTypeInfo};
use sqlx::{Encode, Row, Type};

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        PgStorage { pool }
    }

    fn bind_all<'q>(
        q: &'q QueryBuf,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(BindParam(p.clone()));
        }
        query
    }

    async fn fetch_records(
        &self,
        schema: &ResourceSchema,
        includes: &[IncludeLoad],
        q: &QueryBuf,
    ) -> Result<Vec<Value>, ApiError> {
        tracing::debug!(sql = %q.sql, "executing");
        let rows = Self::bind_all(q).fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_to_json(row, schema, includes)).collect()
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn table_exists(&self, table: &str) -> Result<bool, ApiError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnMeta>, ApiError> {
        let rows = sqlx::query(
            "SELECT c.column_name, c.data_type, c.is_nullable = 'YES' AS nullable, \
                    COALESCE(k.is_primary, FALSE) AS is_primary \
             FROM information_schema.columns c \
             LEFT JOIN ( \
                 SELECT kcu.column_name, TRUE AS is_primary \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON kcu.constraint_name = tc.constraint_name \
                  AND kcu.table_schema = tc.table_schema \
                  AND kcu.table_name = tc.table_name \
                 WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
                   AND tc.constraint_type = 'PRIMARY KEY' \
             ) k ON k.column_name = c.column_name \
             WHERE c.table_schema = 'public' AND c.table_name = $1 \
             ORDER BY c.ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(ColumnMeta {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                nullable: row.try_get("nullable")?,
                primary: row.try_get("is_primary")?,
            });
        }
        Ok(columns)
    }

    async fn query(
        &self,
        handle: &ResourceHandle,
        plan: &QueryPlan,
    ) -> Result<(Vec<Value>, u64), ApiError> {
        let count_q = sql::select_count(&handle.schema, &handle.table, plan);
        tracing::debug!(sql = %count_q.sql, "executing");
        let count: i64 = Self::bind_all(&count_q).fetch_one(&self.pool).await?.try_get(0)?;

        let page_q = sql::select_page(&handle.schema, &handle.table, plan);
        let records = self.fetch_records(&handle.schema, &plan.includes, &page_q).await?;
        Ok((records, count.max(0) as u64))
    }

    async fn find_by_id(
        &self,
        handle: &ResourceHandle,
        id: i64,
        scope: TrashVisibility,
        includes: &[IncludeLoad],
    ) -> Result<Option<Value>, ApiError> {
        let q = sql::select_by_id(&handle.schema, &handle.table, id, scope, includes);
        tracing::debug!(sql = %q.sql, "executing");
        let row = Self::bind_all(&q).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_json(&r, &handle.schema, includes)).transpose()
    }

    async fn insert(
        &self,
        handle: &ResourceHandle,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError> {
        let q = sql::insert(&handle.schema, &handle.table, fields);
        tracing::debug!(sql = %q.sql, "executing");
        let row = Self::bind_all(&q).fetch_one(&self.pool).await?;
        row_to_json(&row, &handle.schema, &[])
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        id: i64,
        fields: &Map<String, Value>,
        scope: TrashVisibility,
    ) -> Result<Option<Value>, ApiError> {
        let q = sql::update(&handle.schema, &handle.table, id, fields, scope);
        tracing::debug!(sql = %q.sql, "executing");
        let row = Self::bind_all(&q).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_json(&r, &handle.schema, &[])).transpose()
    }

    async fn soft_delete(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError> {
        let q = sql::soft_delete(&handle.schema, &handle.table, selector);
        self.fetch_records(&handle.schema, &[], &q).await
    }

    async fn restore(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError> {
        let q = sql::restore(&handle.schema, &handle.table, selector);
        self.fetch_records(&handle.schema, &[], &q).await
    }

    async fn purge(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError> {
        let q = sql::purge(&handle.schema, &handle.table, selector);
        self.fetch_records(&handle.schema, &[], &q).await
    }
}

/// JSON bind parameter. The wire type follows the JSON value so integers,
/// booleans, and JSON documents bind natively; nulls and strings go as text
/// and rely on the statement's casts.
struct BindParam(Value);

impl Type<sqlx::Postgres> for BindParam {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'q> Encode<'q, sqlx::Postgres> for BindParam {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match &self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => <bool as Encode<sqlx::Postgres>>::encode_by_ref(b, buf),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    <i64 as Encode<sqlx::Postgres>>::encode_by_ref(&i, buf)
                } else {
                    let f = n.as_f64().unwrap_or(0.0);
                    <f64 as Encode<sqlx::Postgres>>::encode_by_ref(&f, buf)
                }
            }
            Value::String(s) => <&str as Encode<sqlx::Postgres>>::encode_by_ref(&s.as_str(), buf),
            other => <sqlx::types::Json<&Value> as Encode<sqlx::Postgres>>::encode_by_ref(
                &sqlx::types::Json(other),
                buf,
            ),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match &self.0 {
            Value::Null | Value::String(_) => <String as Type<sqlx::Postgres>>::type_info(),
            Value::Bool(_) => <bool as Type<sqlx::Postgres>>::type_info(),
            Value::Number(n) if n.is_i64() || n.is_u64() => <i64 as Type<sqlx::Postgres>>::type_info(),
            Value::Number(_) => <f64 as Type<sqlx::Postgres>>::type_info(),
            _ => <sqlx::types::Json<Value> as Type<sqlx::Postgres>>::type_info(),
        })
    }
}

/// Decode one row into a JSON record: schema fields by their type tags, then
/// the eager-loaded relation columns as JSON documents.
fn row_to_json(
    row: &PgRow,
    schema: &ResourceSchema,
    includes: &[IncludeLoad],
) -> Result<Value, ApiError> {
    let mut record = Map::with_capacity(schema.fields().len() + includes.len());
    for field in schema.fields() {
        record.insert(field.name.clone(), cell_to_value(row, &field.name, field.field_type)?);
    }
    for inc in includes {
        let value: Option<Value> = row.try_get(inc.relation.name.as_str())?;
        record.insert(inc.relation.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(Value::Object(record))
}

fn cell_to_value(row: &PgRow, name: &str, field_type: FieldType) -> Result<Value, ApiError> {
    let value = match field_type {
        FieldType::Integer => row
            .try_get::<Option<i64>, _>(name)
            .or_else(|_| row.try_get::<Option<i32>, _>(name).map(|v| v.map(i64::from)))
            .or_else(|_| row.try_get::<Option<i16>, _>(name).map(|v| v.map(i64::from)))?
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)
            .or_else(|_| row.try_get::<Option<f32>, _>(name).map(|v| v.map(f64::from)))?
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FieldType::Boolean => row
            .try_get::<Option<bool>, _>(name)?
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        FieldType::DateTime => row
            .try_get::<Option<DateTime<Utc>>, _>(name)
            .or_else(|_| {
                row.try_get::<Option<NaiveDateTime>, _>(name)
                    .map(|v| v.map(|dt| dt.and_utc()))
            })?
            .map(|dt| Value::String(dt.to_rfc3339()))
            .unwrap_or(Value::Null),
        FieldType::Date => row
            .try_get::<Option<NaiveDate>, _>(name)?
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        FieldType::Json => row
            .try_get::<Option<Value>, _>(name)?
            .unwrap_or(Value::Null),
        FieldType::Text | FieldType::File => row
            .try_get::<Option<String>, _>(name)?
            .map(Value::String)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}
