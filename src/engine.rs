//! The operation layer: every endpoint runs the same frame — resolve the
//! resource, gate the operation, translate the request, delegate to storage,
//! assemble the envelope.

use crate::auth::{Authorizer, Operation};
use crate::error::ApiError;
use crate::query::{QueryPlan, RequestFilterSet, TrashVisibility};
use crate::resolver::{ResourceHandle, ResourceResolver};
use crate::response::Envelope;
use crate::schema::{SchemaRegistry, Stage};
use crate::storage::{Selector, Storage};
use crate::validate::{assignable_fields, validate};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct CrudEngine {
    storage: Arc<dyn Storage>,
    resolver: ResourceResolver,
    authorizer: Arc<dyn Authorizer>,
}

impl CrudEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<SchemaRegistry>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        CrudEngine {
            storage,
            resolver: ResourceResolver::new(registry),
            authorizer,
        }
    }

    /// Resolve the path segment and gate the operation. Every endpoint starts
    /// here; a denial answers 401 regardless of the underlying cause.
    async fn open(
        &self,
        segment: &str,
        operation: Operation,
        bearer: Option<&str>,
    ) -> Result<ResourceHandle, ApiError> {
        let handle = self.resolver.resolve(self.storage.as_ref(), segment).await?;
        if handle.requires_auth(operation.as_str())
            && !self.authorizer.authorize(operation.capability(), &handle, bearer)
        {
            return Err(ApiError::Unauthorized);
        }
        Ok(handle)
    }

    async fn listing(
        &self,
        segment: &str,
        operation: Operation,
        params: &[(String, String)],
        bearer: Option<&str>,
        base: TrashVisibility,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, operation, bearer).await?;
        let req = RequestFilterSet::parse(params)?;
        let plan = QueryPlan::build(&handle.schema, &req, base)?;
        let (records, count) = self.storage.query(&handle, &plan).await?;
        Ok(Envelope::ok("Data retrieved.", Value::Array(records)).with_count(count))
    }

    /// GET /:resource — paginated listing over active records.
    pub async fn list(
        &self,
        segment: &str,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        self.listing(segment, Operation::List, params, bearer, TrashVisibility::Default)
            .await
    }

    /// GET /:resource/trashed — the same listing scoped to trashed records.
    pub async fn trashed(
        &self,
        segment: &str,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Trashed, bearer).await?;
        require_soft_delete(&handle)?;
        let req = RequestFilterSet::parse(params)?;
        let plan = QueryPlan::build(&handle.schema, &req, TrashVisibility::OnlyTrashed)?;
        let (records, count) = self.storage.query(&handle, &plan).await?;
        Ok(Envelope::ok("Data retrieved.", Value::Array(records)).with_count(count))
    }

    /// GET /:resource/:id — single record, honoring `with` and `withtrashed`.
    pub async fn show(
        &self,
        segment: &str,
        raw_id: &str,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Show, bearer).await?;
        let id = parse_id(raw_id)?;
        let req = RequestFilterSet::parse(params)?;
        let plan = QueryPlan::build(&handle.schema, &req, TrashVisibility::Default)?;
        match self
            .storage
            .find_by_id(&handle, id, plan.visibility, &plan.includes)
            .await?
        {
            // single-record reads drop the listing message's period
            Some(record) => Ok(Envelope::ok("Data retrieved", record)),
            None => Err(ApiError::NotFoundRecord("Data not found".into())),
        }
    }

    /// GET /:resource/trashed/:id — single record within the trashed scope.
    pub async fn show_trashed(
        &self,
        segment: &str,
        raw_id: &str,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Trashed, bearer).await?;
        require_soft_delete(&handle)?;
        let id = parse_id(raw_id)?;
        let req = RequestFilterSet::parse(params)?;
        let plan = QueryPlan::build(&handle.schema, &req, TrashVisibility::OnlyTrashed)?;
        match self
            .storage
            .find_by_id(&handle, id, TrashVisibility::OnlyTrashed, &plan.includes)
            .await?
        {
            Some(record) => Ok(Envelope::ok("Data retrieved", record)),
            None => Err(ApiError::NotFoundRecord("Data not found".into())),
        }
    }

    /// POST /:resource — validate at the create stage, insert, answer 201.
    pub async fn create(
        &self,
        segment: &str,
        body: &Map<String, Value>,
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Create, bearer).await?;
        validate(&handle.schema, body, Stage::Create, false)?;
        let fields = assignable_fields(&handle.schema, body);
        let record = self.storage.insert(&handle, &fields).await?;
        Ok(Envelope::created(
            format!("{} created!", singular_label(handle.schema.resource())),
            record,
        ))
    }

    /// PUT /:resource/:id — full update-stage validation.
    pub async fn update(
        &self,
        segment: &str,
        raw_id: &str,
        params: &[(String, String)],
        body: &Map<String, Value>,
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        self.apply_update(segment, raw_id, params, body, bearer, Operation::Update, false, "Data updated")
            .await
    }

    /// PATCH /:resource/:id — partial validation; absent fields are untouched.
    pub async fn patch(
        &self,
        segment: &str,
        raw_id: &str,
        params: &[(String, String)],
        body: &Map<String, Value>,
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        self.apply_update(segment, raw_id, params, body, bearer, Operation::Patch, true, "Data patched")
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_update(
        &self,
        segment: &str,
        raw_id: &str,
        params: &[(String, String)],
        body: &Map<String, Value>,
        bearer: Option<&str>,
        operation: Operation,
        partial: bool,
        message: &str,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, operation, bearer).await?;
        let id = parse_id(raw_id)?;
        // Trashed records are not updatable unless the caller widens the scope.
        let scope = if RequestFilterSet::parse(params)?.with_trashed {
            TrashVisibility::WithTrashed
        } else {
            TrashVisibility::Default
        };
        validate(&handle.schema, body, Stage::Update, partial)?;
        let fields = assignable_fields(&handle.schema, body);

        // Nothing assignable: succeed against the current record, like an
        // assignment loop that never fires.
        let record = if fields.is_empty() {
            self.storage.find_by_id(&handle, id, scope, &[]).await?
        } else {
            self.storage.update(&handle, id, &fields, scope).await?
        };
        match record {
            Some(record) => Ok(Envelope::ok(message, record)),
            None => Err(ApiError::NotFoundRecord("Data not found".into())),
        }
    }

    /// DELETE /:resource/:id — id, `selected`, or `all`. Soft-deletes when the
    /// resource supports it, permanently deletes otherwise.
    pub async fn delete(
        &self,
        segment: &str,
        raw_selector: &str,
        body: Option<&Map<String, Value>>,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Delete, bearer).await?;
        let selector = parse_selector(raw_selector, body, params)?;
        let affected = self.storage.soft_delete(&handle, &selector).await?;
        if affected.is_empty() {
            return Err(not_found_for(&selector));
        }
        let message = match selector {
            Selector::Id(_) => "Data deleted",
            Selector::Selected(_) => "Selected IDs are deleted",
            Selector::All => "All data are deleted",
        };
        Ok(Envelope::ok(message, Value::Array(affected)))
    }

    /// PUT /:resource/restore/:id — bring trashed records back.
    pub async fn restore(
        &self,
        segment: &str,
        raw_selector: &str,
        body: Option<&Map<String, Value>>,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Restore, bearer).await?;
        require_soft_delete(&handle)?;
        let selector = parse_selector(raw_selector, body, params)?;
        let affected = self.storage.restore(&handle, &selector).await?;
        if affected.is_empty() {
            // Restoring an already-active record is a no-op success.
            if let Selector::Id(id) = selector {
                let active = self
                    .storage
                    .find_by_id(&handle, id, TrashVisibility::Default, &[])
                    .await?;
                if active.is_some() {
                    return Ok(Envelope::ok("Data restored", Value::Array(vec![])));
                }
            }
            return Err(not_found_for(&selector));
        }
        Ok(Envelope::ok("Data restored", Value::Array(affected)))
    }

    /// DELETE /:resource/purge/:id — physically remove trashed records.
    pub async fn purge(
        &self,
        segment: &str,
        raw_selector: &str,
        body: Option<&Map<String, Value>>,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Purge, bearer).await?;
        require_soft_delete(&handle)?;
        let selector = parse_selector(raw_selector, body, params)?;
        let affected = self.storage.purge(&handle, &selector).await?;
        if affected.is_empty() {
            return Err(not_found_for(&selector));
        }
        Ok(Envelope::ok("Data permanent deleted!", Value::Array(affected)))
    }

    /// POST /:resource/export — validate the export request and acknowledge.
    /// File emission happens out of band.
    pub async fn export(
        &self,
        segment: &str,
        body: &Map<String, Value>,
        bearer: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let handle = self.open(segment, Operation::Export, bearer).await?;

        // `type` is nullable; only a present, unrecognized value is rejected.
        let export_type = match body.get("type") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_str() {
                Some(t) if matches!(t, "csv" | "xlsx" | "sql") => Some(t),
                _ => {
                    return Err(ApiError::validation_one(
                        "type",
                        "The selected type is invalid.".into(),
                    ))
                }
            },
        };

        if let Some(columns) = body.get("columns") {
            let Some(columns) = columns.as_array() else {
                return Err(ApiError::validation_one(
                    "columns",
                    "The columns field must be an array.".into(),
                ));
            };
            for col in columns {
                let known = matches!(col, Value::String(name) if handle.schema.has_field(name));
                if !known {
                    return Err(ApiError::validation_one(
                        "columns",
                        format!("The selected column {} is invalid.", col),
                    ));
                }
            }
        }

        tracing::debug!(resource = %segment, export_type = ?export_type, "export acknowledged");
        Ok(Envelope::ok("Data exported.", Value::Null))
    }
}

fn require_soft_delete(handle: &ResourceHandle) -> Result<(), ApiError> {
    if handle.soft_delete {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Resource '{}' does not support trash operations",
            handle.schema.resource()
        )))
    }
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!("Invalid id '{}'", raw))),
    }
}

/// A positive integer targets one record; `selected` takes its id list from
/// the body (or a comma-separated query parameter); `all` targets the whole
/// applicable scope. Anything else is not a method we define.
fn parse_selector(
    raw: &str,
    body: Option<&Map<String, Value>>,
    params: &[(String, String)],
) -> Result<Selector, ApiError> {
    if let Ok(id) = raw.parse::<i64>() {
        if id > 0 {
            return Ok(Selector::Id(id));
        }
    }
    match raw {
        "selected" => {
            let ids = selected_ids(body, params);
            if ids.is_empty() {
                Err(ApiError::BadRequest("Selected IDs is required".into()))
            } else {
                Ok(Selector::Selected(ids))
            }
        }
        "all" => Ok(Selector::All),
        _ => Err(ApiError::BadRequest("Request method not defined".into())),
    }
}

fn selected_ids(body: Option<&Map<String, Value>>, params: &[(String, String)]) -> Vec<i64> {
    if let Some(Value::Array(items)) = body.and_then(|b| b.get("selected")) {
        return items.iter().filter_map(Value::as_i64).filter(|id| *id > 0).collect();
    }
    for (key, value) in params {
        if key == "selected" {
            return value
                .split(',')
                .filter_map(|s| s.trim().parse::<i64>().ok())
                .filter(|id| *id > 0)
                .collect();
        }
    }
    Vec::new()
}

fn not_found_for(selector: &Selector) -> ApiError {
    let message = match selector {
        Selector::Id(_) => "Data not found",
        Selector::Selected(_) => "Selected IDs not found",
        Selector::All => "There is not data found",
    };
    ApiError::NotFoundRecord(message.into())
}

/// "files" -> "File", "categories" -> "Category".
fn singular_label(resource: &str) -> String {
    let singular = if let Some(stem) = resource.strip_suffix("ies") {
        format!("{}y", stem)
    } else if resource.ends_with('s') && !resource.ends_with("ss") && !resource.ends_with("us") {
        resource[..resource.len() - 1].to_string()
    } else {
        resource.to_string()
    };
    let mut chars = singular.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => singular,
    }
}
