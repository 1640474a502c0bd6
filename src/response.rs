//! Uniform response envelope: every operation, success or failure, returns
//! `{ status, message, data, meta?, errors? }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Serialize, Debug)]
pub struct Meta {
    #[serde(rename = "totalRecords")]
    pub total_records: u64,
    /// Same filtered count as `total_records`; no pre-filter total is tracked.
    #[serde(rename = "totalFilteredRecords")]
    pub total_filtered_records: u64,
}

#[derive(Serialize, Debug)]
pub struct Envelope {
    pub status: u16,
    pub message: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl Envelope {
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Envelope {
            status,
            message: message.into(),
            data: Value::Null,
            meta: None,
            errors: None,
        }
    }

    /// 200 with data.
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        let mut e = Self::with_status(200, message);
        e.data = data;
        e
    }

    /// 201 with the created record.
    pub fn created(message: impl Into<String>, data: Value) -> Self {
        let mut e = Self::with_status(201, message);
        e.data = data;
        e
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.meta = Some(Meta {
            total_records: count,
            total_filtered_records: count,
        });
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
