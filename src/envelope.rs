//! Response envelope handed back to the transport.
//!
//! Success carries only the payload. Failure carries the trace id and a
//! client-safe message; internal error detail never crosses this boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use ulid::Ulid;

use crate::error::AccountError;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub trace_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Success(T),
    Error(ErrorBody),
}

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub envelope: Envelope<T>,
}

impl<T> ApiResponse<T> {
    #[must_use]
    pub fn success(status: StatusCode, payload: T) -> Self {
        Self {
            status,
            envelope: Envelope::Success(payload),
        }
    }

    #[must_use]
    pub fn ok(payload: T) -> Self {
        Self::success(StatusCode::OK, payload)
    }

    #[must_use]
    pub fn failure(trace_id: Ulid, err: &AccountError) -> Self {
        let status = status_for(err);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(%trace_id, "request failed: {err}");
        }
        Self {
            status,
            envelope: Envelope::Error(ErrorBody {
                trace_id: trace_id.to_string(),
                message: public_message(err),
            }),
        }
    }

    /// Wrap a service result, answering `status` on success.
    #[must_use]
    pub fn from_result(
        trace_id: Ulid,
        status: StatusCode,
        result: Result<T, AccountError>,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(status, payload),
            Err(err) => Self::failure(trace_id, &err),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

#[must_use]
pub fn status_for(err: &AccountError) -> StatusCode {
    match err {
        AccountError::InvalidInput(_) | AccountError::InvalidIdentifier => StatusCode::BAD_REQUEST,
        AccountError::InvalidCredentials
        | AccountError::Unauthorized
        | AccountError::TokenInvalid => StatusCode::UNAUTHORIZED,
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::EmailConflict => StatusCode::CONFLICT,
        AccountError::Hashing(_)
        | AccountError::TokenIssuance(_)
        | AccountError::InsertFailed(_)
        | AccountError::UpdateFailed(_)
        | AccountError::DeleteFailed(_)
        | AccountError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Message safe to show a client for `err`.
#[must_use]
pub fn public_message(err: &AccountError) -> String {
    match err {
        AccountError::InvalidInput(reason) => format!("Invalid request: {reason}"),
        AccountError::InvalidIdentifier => "Invalid user id".to_string(),
        AccountError::InvalidCredentials => "Invalid email or password".to_string(),
        AccountError::Unauthorized => "Unauthorized".to_string(),
        AccountError::TokenInvalid => "Invalid token".to_string(),
        AccountError::NotFound => "User not found".to_string(),
        AccountError::EmailConflict => "A user with this email already exists.".to_string(),
        _ => INTERNAL_MESSAGE.to_string(),
    }
}
