//! Thin axum handlers: extract, delegate to the engine, let errors flow
//! through `ApiError`'s envelope mapping.

use crate::error::ApiError;
use crate::response::Envelope;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde_json::{Map, Value};

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn object(body: &Value) -> Result<&Map<String, Value>, ApiError> {
    body.as_object()
        .ok_or_else(|| ApiError::BadRequest("Request body must be a JSON object".into()))
}

pub async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Envelope, ApiError> {
    state.engine.list(&resource, &params, bearer(&headers)).await
}

pub async fn trashed(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Envelope, ApiError> {
    state.engine.trashed(&resource, &params, bearer(&headers)).await
}

pub async fn show(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Envelope, ApiError> {
    state.engine.show(&resource, &id, &params, bearer(&headers)).await
}

pub async fn show_trashed(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Envelope, ApiError> {
    state
        .engine
        .show_trashed(&resource, &id, &params, bearer(&headers))
        .await
}

pub async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Envelope, ApiError> {
    state.engine.create(&resource, object(&body)?, bearer(&headers)).await
}

pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Envelope, ApiError> {
    state
        .engine
        .update(&resource, &id, &params, object(&body)?, bearer(&headers))
        .await
}

pub async fn patch(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Envelope, ApiError> {
    state
        .engine
        .patch(&resource, &id, &params, object(&body)?, bearer(&headers))
        .await
}

pub async fn destroy(
    State(state): State<AppState>,
    Path((resource, selector)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Envelope, ApiError> {
    let body = body.as_ref().and_then(|j| j.0.as_object());
    state
        .engine
        .delete(&resource, &selector, body, &params, bearer(&headers))
        .await
}

pub async fn restore(
    State(state): State<AppState>,
    Path((resource, selector)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Envelope, ApiError> {
    let body = body.as_ref().and_then(|j| j.0.as_object());
    state
        .engine
        .restore(&resource, &selector, body, &params, bearer(&headers))
        .await
}

pub async fn purge(
    State(state): State<AppState>,
    Path((resource, selector)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Envelope, ApiError> {
    let body = body.as_ref().and_then(|j| j.0.as_object());
    state
        .engine
        .purge(&resource, &selector, body, &params, bearer(&headers))
        .await
}

pub async fn export(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Envelope, ApiError> {
    state.engine.export(&resource, object(&body)?, bearer(&headers)).await
}
