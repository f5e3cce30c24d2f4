// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy shared by every layer and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::decryption::DecryptError;
use crate::ledger::LedgerError;

/// Coarse classification of every failure in the pipeline.
///
/// | Category | Retried | Effect on the intent |
/// |----------|---------|----------------------|
/// | `Validation` | never | rejected at the call site |
/// | `Authorization` | never | stays pending, surfaced to operators |
/// | `Transient` | with backoff, until the deadline | stays pending |
/// | `Conflict` | never | benign, another replica finished first |
/// | `Invariant` | never | transaction aborted, stays pending |
/// | `Internal` | never | bug or storage failure |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authorization,
    Transient,
    Conflict,
    Invariant,
    Internal,
}

impl ErrorCategory {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Authorization => StatusCode::FORBIDDEN,
            ErrorCategory::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Invariant => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        if let LedgerError::NotFound { .. } = err {
            return ApiError::not_found(err.to_string());
        }
        let category = err.category();
        if category == ErrorCategory::Internal {
            tracing::error!(error = %err, "Ledger operation failed");
            return ApiError::internal("internal storage error");
        }
        ApiError::new(category.status_code(), err.to_string())
    }
}

impl From<DecryptError> for ApiError {
    fn from(err: DecryptError) -> Self {
        ApiError::new(err.category().status_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
