//! Error types for Linode API operations.
//!
//! This module holds the single error type shared by every Linode client crate,
//! together with the remote error model: [`ErrorDetail`] for one failure reported
//! by the API and [`ApiErrors`] for the ordered aggregate of several of them.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Text rendered in place of an empty remote error message.
pub const MISSING_ERROR_MESSAGE: &str = "no error message available";

/// Main error type for Linode operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A request parameter could not be serialized into the wire format
    #[error("Failed to encode request: {0}")]
    Encoding(String),

    /// The request could not be built (usually a malformed base URL)
    #[error("Failed to build request: {0}")]
    RequestBuild(String),

    /// The API answered with a status that carries no trusted error payload
    #[error("API Error: {status_line}")]
    Transport {
        /// Numeric HTTP status
        status: u16,
        /// Raw status line, e.g. `500 Internal Server Error`
        status_line: String,
    },

    /// The transport failed before any status was received
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The transport gave up waiting for a response
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A response body was not the JSON shape we expected
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// One or more failures reported by the API itself
    #[error("{0}")]
    Api(ApiErrors),

    /// The response arity or record layout drifted from the API contract
    #[error("Incorrect data returned from API: {0}")]
    Shape(#[from] ShapeError),

    /// A sub-response echoed a different action than the one submitted at its position
    #[error("Unexpected action returned from API: expected `{expected}`, got `{actual}`")]
    UnexpectedAction {
        /// Action submitted at this position
        expected: String,
        /// Action echoed by the API
        actual: String,
    },

    /// Reconciliation was requested for an action without an extraction rule
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Specialized result type for Linode operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Response layout problems detected while reconciling a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The number of sub-responses does not match the number of submitted actions
    #[error("expected {expected} sub-responses, got {actual}")]
    ResponseCount {
        /// Number of actions submitted
        expected: usize,
        /// Number of sub-responses received
        actual: usize,
    },

    /// A sub-response did not carry exactly one data record
    #[error("action `{action}` returned {count} records, expected exactly one")]
    RecordCount {
        /// Action the sub-response belongs to
        action: String,
        /// Number of records found
        count: usize,
    },

    /// An action required to reconcile the entity produced no record
    #[error("no sub-response for action `{action}`")]
    MissingAction {
        /// Action with no record
        action: String,
    },

    /// A record lacks a field its extraction rule requires
    #[error("action `{action}` record is missing field `{field}`")]
    MissingField {
        /// Action the record belongs to
        action: String,
        /// Missing field name
        field: String,
    },

    /// A record field has the wrong JSON type
    #[error("action `{action}` field `{field}` is not a {expected}")]
    FieldType {
        /// Action the record belongs to
        action: String,
        /// Offending field name
        field: String,
        /// Expected JSON type
        expected: &'static str,
    },
}

/// Identifier of a remote error.
///
/// The classic API sends numbers; other generations send strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    /// Numeric code
    Numeric(i64),
    /// Textual code
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(code) => write!(f, "{code}"),
            Self::Text(code) => f.write_str(code),
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        Self::Numeric(code)
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        Self::Text(code.to_string())
    }
}

/// A single failure reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Remote error code
    #[serde(rename = "ERRORCODE")]
    pub code: ErrorCode,
    /// Human-readable description
    #[serde(rename = "ERRORMESSAGE", default, deserialize_with = "null_as_empty")]
    pub message: String,
}

impl ErrorDetail {
    /// Create a detail from a code and message.
    #[must_use]
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Render as `<code>: <message>`.
    ///
    /// Never empty: a blank message renders as [`MISSING_ERROR_MESSAGE`].
    #[must_use]
    pub fn render(&self) -> String {
        let message = if self.message.trim().is_empty() {
            MISSING_ERROR_MESSAGE
        } else {
            self.message.as_str()
        };
        format!("{}: {message}", self.code)
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered, non-empty collection of remote failures.
///
/// Only [`aggregate`] constructs this type, so an `ApiErrors` value always
/// holds at least one detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiErrors(Vec<ErrorDetail>);

impl ApiErrors {
    /// The individual failures, in the order the API reported them.
    #[must_use]
    pub fn details(&self) -> &[ErrorDetail] {
        &self.0
    }

    /// Consume the aggregate and return its failures.
    #[must_use]
    pub fn into_details(self) -> Vec<ErrorDetail> {
        self.0
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ErrorDetail::render).collect();
        f.write_str(&rendered.join(", "))
    }
}

impl From<ApiErrors> for Error {
    fn from(errors: ApiErrors) -> Self {
        Self::Api(errors)
    }
}

/// Fold remote failures into one aggregate.
///
/// Returns `None` for an empty sequence. Input order is preserved, so the
/// union of several sub-responses' lists keeps submission order.
pub fn aggregate<I>(details: I) -> Option<ApiErrors>
where
    I: IntoIterator<Item = ErrorDetail>,
{
    let details: Vec<ErrorDetail> = details.into_iter().collect();
    if details.is_empty() {
        None
    } else {
        Some(ApiErrors(details))
    }
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::RequestBuild(_) => "REQUEST_BUILD_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Api(_) => "API_ERROR",
            Self::Shape(_) => "SHAPE_ERROR",
            Self::UnexpectedAction { .. } => "UNEXPECTED_ACTION",
            Self::UnsupportedAction(_) => "UNSUPPORTED_ACTION",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// Returns true if the failure was reported by the API rather than detected locally.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Api(_) | Self::Transport { .. })
    }

    /// Remote failure details, when this is an API error.
    #[must_use]
    pub fn api_errors(&self) -> Option<&ApiErrors> {
        match self {
            Self::Api(errors) => Some(errors),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_builder() {
            Self::RequestBuild(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::RequestBuild(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
