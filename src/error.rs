//! Typed errors and their mapping into the uniform response envelope.

use crate::response::Envelope;
use axum::response::{IntoResponse, Response};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while constructing or registering resource schemas.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("resource '{0}' has no primary key field")]
    MissingPrimaryKey(String),
    #[error("resource '{0}' declares more than one primary key field")]
    MultiplePrimaryKeys(String),
    #[error("resource '{resource}' references unknown field '{field}'")]
    UnknownField { resource: String, field: String },
    #[error("schema load: {0}")]
    Load(String),
}

/// Request-level failure taxonomy. Every user-facing failure terminates the
/// request through the envelope; nothing propagates raw to the caller.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No dedicated schema and no matching storage table for the path segment.
    #[error("Model not found!")]
    NotFoundModel,
    /// An id or selector matched nothing; the message mirrors the operation.
    #[error("{0}")]
    NotFoundRecord(String),
    #[error("You do not have authorization.")]
    Unauthorized,
    /// Schema rule violations, keyed field -> messages. `message` carries the
    /// first failure for the envelope's top-level message.
    #[error("{message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },
    #[error("{0}")]
    BadRequest(String),
    /// Unexpected storage or internal fault; preserves the underlying message.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::NotFoundModel | ApiError::NotFoundRecord(_) => 404,
            ApiError::Unauthorized => 401,
            ApiError::Validation { .. } | ApiError::BadRequest(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    /// Single-field validation failure.
    pub fn validation_one(field: &str, message: String) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.clone()]);
        ApiError::Validation { message, errors }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<SchemaError> for ApiError {
    fn from(e: SchemaError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let mut envelope = Envelope::with_status(status, message);
        if let ApiError::Validation { errors, .. } = self {
            envelope.errors = Some(errors);
        }
        envelope.into_response()
    }
}
