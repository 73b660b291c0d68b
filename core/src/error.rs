//! Error types for the CRM client and batch engine.
//!
//! # Design
//! `NotFound` keeps a dedicated variant because callers routinely branch on
//! "the object does not exist". Every other non-success status lands in
//! `Http`, carrying the server's own message when the body decodes as the
//! CRM error envelope. The decoded envelope travels inside the error value;
//! nothing is stashed on the client between calls.

use thiserror::Error;

use crate::http::HttpResponse;
use crate::types::{ErrorResponse, PropertyError};

/// Errors returned by `CrmClient` parse methods and `BatchEngine` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-success status not covered below.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        correlation_id: Option<String>,
    },

    /// 429 that was not retried, or was still throttled on the retry.
    #[error("rate limited (daily remaining: {daily_remaining:?}): {message}")]
    RateLimited {
        daily_remaining: Option<u64>,
        message: String,
    },

    /// A batch write was rejected by property validation and could not be
    /// repaired.
    #[error("property validation failed: {message}")]
    InvalidProperties {
        message: String,
        errors: Vec<PropertyError>,
    },

    /// The validation envelope was recognised but its embedded JSON was not.
    #[error("malformed property validation error: {0}")]
    MalformedValidationError(String),

    /// Pagination reached the configured page limit with a cursor still pending.
    #[error("pagination stopped after {max_pages} pages with more pages pending")]
    PageLimitExceeded { max_pages: usize },

    /// The executor could not complete the round-trip.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Map a non-success response to an error, decoding the error envelope
    /// when the body carries one.
    pub fn from_response(response: &HttpResponse) -> Self {
        if response.status == 404 {
            return ApiError::NotFound;
        }
        match decode_envelope(&response.body) {
            Some(envelope) => ApiError::Http {
                status: response.status,
                message: envelope.message,
                correlation_id: envelope.correlation_id,
            },
            None => ApiError::Http {
                status: response.status,
                message: response.body.clone(),
                correlation_id: None,
            },
        }
    }

    /// Status code of the failed response, if this error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound => Some(404),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::InvalidProperties { .. } | ApiError::MalformedValidationError(_) => {
                Some(400)
            }
            _ => None,
        }
    }
}

/// Decode the `{status, message, correlationId, category, links}` envelope.
/// Bodies without a message are treated as not being an envelope.
pub(crate) fn decode_envelope(body: &str) -> Option<ErrorResponse> {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .filter(|envelope| !envelope.message.is_empty())
}
