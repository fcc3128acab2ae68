//! Node client for the Linode management API.
//!
//! Provides the batch request encoder, the response demultiplexer, node models,
//! and an asynchronous client that creates, retrieves and destroys nodes.

#![deny(missing_docs)]

pub mod batch;
pub mod client;
pub mod models;
pub mod response;

pub use batch::{Action, ActionName, BatchRequest};
pub use client::{NodeClient, NodeClientBuilder};
pub use models::{CreateNodeRequest, DestroyNodeRequest, Node, NodeStatus};
pub use response::{BatchResponse, MatchedRecord, MatchedRecords, SubResponse};

/// Convenient result alias that reuses the shared Linode error type.
pub type Result<T> = linode_core::Result<T>;
