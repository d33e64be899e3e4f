//! Response envelope shared by every endpoint
//!
//! Success: `{"success": true, "data": ...}`
//! Failure: `{"success": false, "error": {"kind": "...", "message": "..."}}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use waitlist_core::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl<T> Envelope<T> {
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<()> {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                message: message.into(),
            }),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Handler error rendered as a failure envelope
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::InvalidRequest(message.into()))
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::AlreadyQueued
            | ErrorKind::NotYourTurn
            | ErrorKind::ClaimWindowExpired
            | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::NotInQueue | ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::DeliveryFailed => StatusCode::BAD_GATEWAY,
            ErrorKind::Database | ErrorKind::InvalidConfig => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.0.is_client_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = Envelope::failure(self.0.kind(), self.0.to_string());
        (status, body).into_response()
    }
}
