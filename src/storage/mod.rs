//! Persistence boundary consumed by the engine. The engine only ever sees
//! this trait; SQL lives behind it.

mod postgres;
mod sql;

pub use postgres::PgStorage;
pub use sql::QueryBuf;

use crate::error::ApiError;
use crate::query::{IncludeLoad, QueryPlan, TrashVisibility};
use crate::resolver::ResourceHandle;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One column as reported by the storage engine's catalog; used to derive
/// generic schemas for tables with no dedicated metadata.
#[derive(Clone, Debug)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary: bool,
}

/// Which record(s) a delete/restore/purge targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Id(i64),
    /// Explicit id list from the request.
    Selected(Vec<i64>),
    /// Every record in the operation's applicable scope.
    All,
}

/// Storage operations the engine delegates to. Single-record mutations are
/// atomic; the bulk mutations are one statement each, so a partial failure
/// leaves nothing half-applied.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool, ApiError>;

    async fn column_catalog(&self, table: &str) -> Result<Vec<ColumnMeta>, ApiError>;

    /// Execute a plan: the page of records plus the pre-pagination count.
    async fn query(
        &self,
        handle: &ResourceHandle,
        plan: &QueryPlan,
    ) -> Result<(Vec<Value>, u64), ApiError>;

    async fn find_by_id(
        &self,
        handle: &ResourceHandle,
        id: i64,
        scope: TrashVisibility,
        includes: &[IncludeLoad],
    ) -> Result<Option<Value>, ApiError>;

    /// Insert a record; lifecycle timestamps are assigned by the store.
    async fn insert(
        &self,
        handle: &ResourceHandle,
        fields: &Map<String, Value>,
    ) -> Result<Value, ApiError>;

    /// Update a record in the given scope. None when the id matched nothing.
    async fn update(
        &self,
        handle: &ResourceHandle,
        id: i64,
        fields: &Map<String, Value>,
        scope: TrashVisibility,
    ) -> Result<Option<Value>, ApiError>;

    /// Mark active records trashed (or remove them outright when the resource
    /// does not soft-delete). Returns the affected records.
    async fn soft_delete(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError>;

    /// Clear the deleted-timestamp on trashed records. Returns the affected records.
    async fn restore(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError>;

    /// Physically remove trashed records. Returns the removed records.
    async fn purge(
        &self,
        handle: &ResourceHandle,
        selector: &Selector,
    ) -> Result<Vec<Value>, ApiError>;
}
