//! Asynchronous node client.
//!
//! Every operation is one linear pipeline: build actions, encode the batch,
//! send it once, apply the status policy, demultiplex, and (for retrieval)
//! assemble the [`Node`]. Nothing is retried or cached.

use crate::batch::{ActionName, BatchRequest};
use crate::models::{
    assemble_node, extract_linode_id, retrieve_actions, CreateNodeRequest, DestroyNodeRequest,
    Node,
};
use crate::response::{demultiplex, interpret_status, BatchResponse, MatchedRecords};
use crate::Result;
use linode_core::client::ClientConfig;
use linode_core::config::LinodeConfig;
use linode_core::{Error, HttpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use validator::Validate;

const USER_AGENT: &str = concat!("linode-nodes/", env!("CARGO_PKG_VERSION"));

type KeyLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builder for [`NodeClient`].
pub struct NodeClientBuilder {
    config: LinodeConfig,
    http_config: Option<ClientConfig>,
    transport: Option<Arc<dyn Transport>>,
    key_lookup: Option<KeyLookup>,
}

impl NodeClientBuilder {
    /// Create a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(LinodeConfig::default())
    }

    /// Create a builder from an existing configuration.
    #[must_use]
    pub fn from_config(config: LinodeConfig) -> Self {
        Self {
            config,
            http_config: None,
            transport: None,
            key_lookup: None,
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.api_url = base_url.into();
        self
    }

    /// Set the API key. Without one, `LINODE_KEY` is consulted at build time.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config = self.config.with_api_key(api_key);
        self
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = Some(config);
        self
    }

    /// Use a caller-supplied transport instead of the default HTTP client.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Resolve a missing API key through `lookup` instead of the process
    /// environment. `lookup` receives the variable name, `LINODE_KEY`.
    #[must_use]
    pub fn with_key_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.key_lookup = Some(Box::new(lookup));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, no API key can be
    /// found, or the HTTP client cannot be constructed.
    pub fn build(self) -> Result<NodeClient> {
        self.config.validate()?;
        let base_url = self.config.parse_api_url()?;
        let api_key = match &self.key_lookup {
            Some(lookup) => self.config.resolve_api_key_with(|name| lookup(name))?,
            None => self.config.resolve_api_key()?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let http_config = self
                    .http_config
                    .unwrap_or_else(|| self.config.http_config());
                Arc::new(HttpTransport::new(&http_config, USER_AGENT)?)
            }
        };

        Ok(NodeClient {
            transport,
            base_url,
            api_key: Arc::new(api_key),
        })
    }
}

impl Default for NodeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Asynchronous client for creating, retrieving and destroying nodes.
#[derive(Clone)]
pub struct NodeClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    api_key: Arc<SecretString>,
}

impl NodeClient {
    /// Construct a client against the default API URL.
    ///
    /// An empty `api_key` falls back to the `LINODE_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key can be found.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        NodeClientBuilder::new().with_api_key(api_key).build()
    }

    /// Return the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create a node and return its ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] with every reported failure if the API rejects
    /// the request, or any transport, decoding or shape error.
    pub async fn create_node(&self, request: &CreateNodeRequest) -> Result<String> {
        let batch = BatchRequest::post(vec![request.to_action()]);
        let matched = self.execute(&batch).await?;
        let id = single_record_id(&matched, ActionName::Create)?;

        info!(linode_id = %id, "created node");
        Ok(id)
    }

    /// Destroy a node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] with every reported failure if the API rejects
    /// the request, or any transport, decoding or shape error.
    pub async fn destroy_node(&self, request: &DestroyNodeRequest) -> Result<()> {
        let batch = BatchRequest::post(vec![request.to_action()]);
        let matched = self.execute(&batch).await?;
        let id = single_record_id(&matched, ActionName::Delete)?;

        info!(linode_id = %id, "destroyed node");
        Ok(())
    }

    /// Retrieve a node, batching `linode.list`, `linode.ip.list` and
    /// `linode.disk.list` into one call.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any of the three sub-requests fails or returns an
    /// unexpected shape; no partial node is returned.
    pub async fn retrieve_node(&self, id: &str) -> Result<Node> {
        let batch = BatchRequest::get(retrieve_actions(id));
        let matched = self.execute(&batch).await?;
        assemble_node(&matched)
    }

    async fn execute(&self, batch: &BatchRequest) -> Result<MatchedRecords> {
        let expected = batch.action_names();
        let request = batch.encode(self.api_key.expose_secret(), self.base_url.as_str())?;

        info!(method = %request.method, actions = ?expected, "Linode batch request");

        let response = self.transport.send(request).await?;
        debug!(status = response.status, "Linode batch response");

        let body = interpret_status(response)?;

        let raw = BatchResponse::from_json(&body)?;
        demultiplex(raw, &expected)
    }
}

fn single_record_id(matched: &MatchedRecords, action: ActionName) -> Result<String> {
    let record = matched
        .get(action.as_str())
        .ok_or_else(|| Error::UnsupportedAction(action.as_str().to_string()))?;
    extract_linode_id(action.as_str(), record)
}
