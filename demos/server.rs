//! Example server: loads dedicated schemas from a JSON file (optional),
//! connects to PostgreSQL, and mounts the resource routes under /api/v1.

use crudkit::{AllowAll, AppState, Authorizer, PgStorage, SchemaRegistry, StaticTokenAuthorizer};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crudkit=debug".parse()?))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/crudkit".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let registry = match std::env::var("SCHEMAS_PATH") {
        Ok(path) => {
            let json = tokio::fs::read_to_string(&path).await?;
            let registry = SchemaRegistry::from_json(&json)?;
            tracing::info!(count = registry.len(), %path, "loaded dedicated schemas");
            registry
        }
        Err(_) => SchemaRegistry::new(),
    };

    let authorizer: Arc<dyn Authorizer> = match std::env::var("API_TOKEN") {
        Ok(token) => Arc::new(StaticTokenAuthorizer::new(token)),
        Err(_) => Arc::new(AllowAll),
    };

    let state = AppState::new(Arc::new(PgStorage::new(pool)), Arc::new(registry), authorizer);
    let app = Router::new().nest("/api/v1", crudkit::router(state));

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
