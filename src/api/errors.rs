// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;

use crate::crypto::error::NegotiationError;
use crate::negotiation::types::{ErrorBody, NEGOTIATION_INVALID_TAG};

/// HTTP face of a `NegotiationError`
#[derive(Debug, Clone)]
pub struct ApiError(pub NegotiationError);

impl ApiError {
    pub fn to_response(&self) -> ErrorBody {
        ErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match &self.0 {
            NegotiationError::MissingRequiredParam { .. } => 400,
            NegotiationError::TokenInvalid { .. } | NegotiationError::NegotiationInvalid { .. } => {
                401
            }
            NegotiationError::EncryptFailed { .. }
            | NegotiationError::DecryptFailed { .. }
            | NegotiationError::UnsupportedCipherRole { .. } => 400,
            NegotiationError::NegotiationFailed { .. } => 500,
            NegotiationError::Transport(_) => 502,
            NegotiationError::Timeout { .. } => 504,
        }
    }

    /// Peer must drop its session and negotiate again
    pub fn requires_renegotiation(&self) -> bool {
        self.0.requires_renegotiation()
    }
}

impl From<NegotiationError> for ApiError {
    fn from(error: NegotiationError) -> Self {
        Self(error)
    }
}

/// Unreadable bodies get the same typed error body as missing fields
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(NegotiationError::missing(format!(
            "request body ({})",
            rejection.body_text()
        )))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.0.code())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::warn!("Request failed with {}: {}", status, self);
        let body = Json(self.to_response());

        if self.requires_renegotiation() {
            (status, [(NEGOTIATION_INVALID_TAG, "true")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
