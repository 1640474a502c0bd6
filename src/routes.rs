//! Route table. Static segments (`trashed`, `export`, `restore`, `purge`)
//! take priority over the `:id` captures on the same prefix.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/:resource", get(handlers::list).post(handlers::create))
        .route("/:resource/trashed", get(handlers::trashed))
        .route("/:resource/trashed/:id", get(handlers::show_trashed))
        .route("/:resource/export", post(handlers::export))
        .route(
            "/:resource/:id",
            get(handlers::show)
                .put(handlers::update)
                .patch(handlers::patch)
                .delete(handlers::destroy),
        )
        .route("/:resource/restore/:id", put(handlers::restore))
        .route("/:resource/purge/:id", delete(handlers::purge))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }))
}
