//! # linode-core
//!
//! Core types and utilities for working with the Linode API.
//!
//! This crate provides the shared error type, configuration, and the transport
//! capability used by the Linode service clients.
//!
//! ## Modules
//!
//! - [`error`] - Error type and the remote error model
//! - [`config`] - Client configuration and API key resolution
//! - [`client`] - HTTP client settings and defaults
//! - [`transport`] - The request/response capability and its reqwest implementation
//! - [`query`] - Query string builder

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod transport;

// Re-export commonly used types
pub use error::{aggregate, ApiErrors, Error, ErrorCode, ErrorDetail, Result, ShapeError};
pub use transport::{ApiRequest, HttpTransport, RawResponse, Transport};
