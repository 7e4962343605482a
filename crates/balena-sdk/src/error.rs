// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for balena-sdk.

use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when using the SDK.
///
/// Payloads are plain strings so the error stays `Clone`: a single failed
/// remote fetch is handed to every caller coalesced onto it.
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to the API failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// API returned a non-success status that has no dedicated variant.
    #[error("request failed [{status}]: {message}")]
    Request { status: u16, message: String },

    /// API rejected the credentials, or the caller may not touch the resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A create collided with an existing row on a unique key.
    #[error("unique constraint violation: {0}")]
    UniqueConstraintViolation(String),

    /// No entity matches the reference.
    #[error("{resource} not found: {reference}")]
    NotFound { resource: String, reference: String },

    /// More than one entity matches a non-id reference.
    #[error("ambiguous {resource} reference: {reference}")]
    AmbiguousReference { resource: String, reference: String },

    /// A parameter failed validation before any request was made.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A `(parent, key)` pair that should be unique matched several records.
    #[error("{count} {resource} records share key {key}")]
    DuplicateRecord {
        resource: String,
        key: String,
        count: usize,
    },

    /// Unexpected response from server.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SdkError {
    pub(crate) fn not_found(resource: impl Into<String>, reference: impl ToString) -> Self {
        SdkError::NotFound {
            resource: resource.into(),
            reference: reference.to_string(),
        }
    }

    pub(crate) fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SdkError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a [`SdkError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, SdkError::NotFound { .. })
    }

    /// Whether this is a [`SdkError::Unauthorized`].
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SdkError::Unauthorized(_))
    }

    /// Whether this is a [`SdkError::UniqueConstraintViolation`].
    pub fn is_unique_constraint_violation(&self) -> bool {
        matches!(self, SdkError::UniqueConstraintViolation(_))
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration; 0 marks "unknown".
            SdkError::Timeout(0)
        } else if err.is_decode() {
            SdkError::Serialization(err.to_string())
        } else {
            SdkError::Connection(err.to_string())
        }
    }
}

impl From<url::ParseError> for SdkError {
    fn from(err: url::ParseError) -> Self {
        SdkError::Config(format!("invalid url: {}", err))
    }
}
