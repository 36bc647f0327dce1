// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Maps the workspace [`cplane_core::Error`] taxonomy onto HTTP status codes, per spec §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cplane_core::Error;
use serde::Serialize;

/// Wraps [`cplane_core::Error`] so it can be returned directly from axum handlers.
pub struct ApiError(
    /// The underlying workspace error.
    pub Error,
);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Auth => StatusCode::UNAUTHORIZED,
            Error::Sync { .. } => StatusCode::BAD_GATEWAY,
            Error::Store { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Lifecycle { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}
