// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

//! Bearer-token authentication middleware. The token is a cluster-wide shared secret (spec §6),
//! compared in constant time so response latency can't leak how many leading bytes matched.

use crate::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Compares two byte strings in constant time with respect to their contents (not their
/// lengths): every byte of `a` is compared, and the result only depends on whether every
/// comparison matched, not on which one first differed.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub(crate) async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), state.auth_token.as_bytes()) => next.run(request).await,
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn rejects_mismatched_length() {
        assert!(!constant_time_eq(b"short", b"muchlonger"));
    }

    #[test]
    fn accepts_identical_bytes() {
        assert!(constant_time_eq(b"secret-token", b"secret-token"));
    }

    #[test]
    fn rejects_single_byte_difference() {
        assert!(!constant_time_eq(b"secret-token", b"secret-tokeX"));
    }
}
