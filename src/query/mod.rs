//! Listing-request translation: filter-set parsing and query-plan building.

mod filter;
mod plan;

pub use filter::{RequestFilterSet, SortDirection, DEFAULT_LIMIT, MAX_LIMIT, RESERVED_PARAMS};
pub use plan::{IncludeLoad, QueryPlan, SearchSpec, TrashVisibility};
