//! crudkit: a schema-driven generic REST resource engine.
//!
//! One route family (`/:resource`, `/:resource/:id`, trash and export
//! variants) serves any number of resources. A resource either has a
//! dedicated schema registered at startup or is bound generically to a
//! storage table of the same name; either way the same engine runs listing,
//! CRUD, soft-delete lifecycle, and export acknowledgment against it, and
//! every response uses one envelope shape.

pub mod auth;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod query;
pub mod resolver;
pub mod response;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod validate;

pub use auth::{AllowAll, Authorizer, Capability, Operation, StaticTokenAuthorizer};
pub use engine::CrudEngine;
pub use error::{ApiError, SchemaError};
pub use query::{QueryPlan, RequestFilterSet, TrashVisibility};
pub use resolver::{ResourceHandle, ResourceKind, ResourceResolver};
pub use response::{Envelope, Meta};
pub use routes::router;
pub use schema::{FieldDescriptor, FieldType, ResourceSchema, SchemaDef, SchemaRegistry};
pub use state::AppState;
pub use storage::{ColumnMeta, PgStorage, Selector, Storage};
