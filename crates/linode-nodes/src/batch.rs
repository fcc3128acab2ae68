//! Batch request encoding.
//!
//! Every call to the API goes through the batch endpoint: the logical
//! operations are serialized as a JSON array of flat objects, each carrying
//! its operation name under `api_action`, and the array travels in the query
//! string next to the `batch` marker and the API key.

use linode_core::query::QueryParams;
use linode_core::{ApiRequest, Error, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Field holding the operation name inside each encoded action.
pub const ACTION_FIELD: &str = "api_action";

/// Value of the top-level `api_action` parameter for batch calls.
pub const BATCH_MARKER: &str = "batch";

/// Query parameter carrying the encoded action array.
pub const REQUEST_ARRAY_PARAM: &str = "api_requestArray";

/// Query parameter carrying the API key.
pub const API_KEY_PARAM: &str = "api_key";

/// Remote operations issued by the node client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionName {
    /// `linode.list`
    List,
    /// `linode.ip.list`
    IpList,
    /// `linode.disk.list`
    DiskList,
    /// `linode.create`
    Create,
    /// `linode.delete`
    Delete,
}

impl ActionName {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "linode.list",
            Self::IpList => "linode.ip.list",
            Self::DiskList => "linode.disk.list",
            Self::Create => "linode.create",
            Self::Delete => "linode.delete",
        }
    }

    /// Look up an operation by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linode.list" => Some(Self::List),
            "linode.ip.list" => Some(Self::IpList),
            "linode.disk.list" => Some(Self::DiskList),
            "linode.create" => Some(Self::Create),
            "linode.delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    name: String,
    parameters: BTreeMap<String, Value>,
}

impl Action {
    /// Create an action with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter. A repeated key replaces the earlier value.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(key, value);
        self
    }

    /// Add a parameter in place. A repeated key replaces the earlier value.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters, ordered by key.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    fn to_wire(&self) -> Result<BTreeMap<&str, Value>> {
        let mut object = BTreeMap::new();

        for (key, value) in &self.parameters {
            if key == ACTION_FIELD {
                return Err(Error::Encoding(format!(
                    "action `{}` uses the reserved parameter `{ACTION_FIELD}`",
                    self.name
                )));
            }
            match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    object.insert(key.as_str(), value.clone());
                }
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    return Err(Error::Encoding(format!(
                        "parameter `{key}` of action `{}` is not a flat scalar",
                        self.name
                    )));
                }
            }
        }

        object.insert(ACTION_FIELD, Value::String(self.name.clone()));
        Ok(object)
    }
}

impl From<ActionName> for Action {
    fn from(name: ActionName) -> Self {
        Self::new(name.as_str())
    }
}

/// Serialize actions into the JSON array sent as `api_requestArray`.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the batch is empty or a parameter value is
/// not a flat scalar.
pub fn encode_actions(actions: &[Action]) -> Result<String> {
    if actions.is_empty() {
        return Err(Error::Encoding("batch contains no actions".to_string()));
    }

    let objects = actions
        .iter()
        .map(Action::to_wire)
        .collect::<Result<Vec<_>>>()?;

    serde_json::to_string(&objects).map_err(|err| Error::Encoding(err.to_string()))
}

/// Parse an `api_requestArray` value back into actions.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the text is not an array of objects that each
/// carry a string `api_action`.
pub fn decode_actions(encoded: &str) -> Result<Vec<Action>> {
    let objects: Vec<BTreeMap<String, Value>> = serde_json::from_str(encoded)?;

    objects
        .into_iter()
        .enumerate()
        .map(|(index, mut object)| match object.remove(ACTION_FIELD) {
            Some(Value::String(name)) => Ok(Action {
                name,
                parameters: object,
            }),
            _ => Err(Error::Decode(format!(
                "action at position {index} has no string `{ACTION_FIELD}`"
            ))),
        })
        .collect()
}

/// Ordered actions sent in one round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    method: Method,
    actions: Vec<Action>,
}

impl BatchRequest {
    /// Create a batch sent with `method`.
    #[must_use]
    pub fn new(method: Method, actions: Vec<Action>) -> Self {
        Self { method, actions }
    }

    /// Batch sent as `GET`, used for read-only operations.
    #[must_use]
    pub fn get(actions: Vec<Action>) -> Self {
        Self::new(Method::GET, actions)
    }

    /// Batch sent as `POST`, used for mutating operations.
    #[must_use]
    pub fn post(actions: Vec<Action>) -> Self {
        Self::new(Method::POST, actions)
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Actions in submission order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Action names in submission order.
    #[must_use]
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(Action::name).collect()
    }

    /// Encode into a request against `base_url`, authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestBuild`] if `base_url` is not an http(s) URL and
    /// [`Error::Encoding`] if the actions cannot be serialized.
    pub fn encode(&self, token: &str, base_url: &str) -> Result<ApiRequest> {
        let mut url = Url::parse(base_url).map_err(|err| {
            Error::RequestBuild(format!("Error parsing base URL `{base_url}`: {err}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::RequestBuild(format!(
                "base URL `{base_url}` must use http or https"
            )));
        }

        let encoded = encode_actions(&self.actions)?;

        let mut params = QueryParams::new();
        params.push(ACTION_FIELD, BATCH_MARKER);
        params.push(REQUEST_ARRAY_PARAM, encoded);
        params.push(API_KEY_PARAM, token);
        params.apply_to(&mut url);

        Ok(ApiRequest {
            method: self.method.clone(),
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn query(request: &ApiRequest) -> HashMap<String, String> {
        request.url.query_pairs().into_owned().collect()
    }

    #[test]
    fn action_names_round_trip() {
        for name in [
            ActionName::List,
            ActionName::IpList,
            ActionName::DiskList,
            ActionName::Create,
            ActionName::Delete,
        ] {
            assert_eq!(ActionName::from_name(name.as_str()), Some(name));
        }
        assert_eq!(ActionName::from_name("linode.boot"), None);
    }

    #[test]
    fn encode_single_create_matches_wire_format() {
        let action = Action::from(ActionName::Create)
            .with_param("PlanID", "1")
            .with_param("DataCenterID", "1");

        assert_eq!(
            encode_actions(&[action]).unwrap(),
            r#"[{"DataCenterID":"1","PlanID":"1","api_action":"linode.create"}]"#
        );
    }

    #[test]
    fn encode_preserves_action_order_and_duplicates() {
        let actions = vec![
            Action::from(ActionName::DiskList).with_param("LinodeID", "7"),
            Action::from(ActionName::List).with_param("LinodeID", "7"),
            Action::from(ActionName::List).with_param("LinodeID", "7"),
        ];

        let decoded = decode_actions(&encode_actions(&actions).unwrap()).unwrap();
        let names: Vec<&str> = decoded.iter().map(Action::name).collect();
        assert_eq!(names, ["linode.disk.list", "linode.list", "linode.list"]);
    }

    #[test]
    fn repeated_key_keeps_last_value() {
        let action = Action::new("linode.list")
            .with_param("LinodeID", "1")
            .with_param("LinodeID", "2");
        assert_eq!(action.parameters().get("LinodeID"), Some(&json!("2")));
    }

    #[test]
    fn encode_then_decode_reproduces_actions() {
        let actions = vec![
            Action::new("linode.list").with_param("LinodeID", "586892"),
            Action::new("linode.ip.list")
                .with_param("LinodeID", "586892")
                .with_param("IPAddressID", "89244"),
            Action::new("avail.datacenters"),
        ];

        let decoded = decode_actions(&encode_actions(&actions).unwrap()).unwrap();
        assert_eq!(decoded, actions);
    }

    #[test]
    fn scalar_numbers_and_bools_are_accepted() {
        let action = Action::new("linode.delete")
            .with_param("LinodeID", 8204)
            .with_param("skipChecks", true);
        assert_eq!(
            encode_actions(&[action]).unwrap(),
            r#"[{"LinodeID":8204,"api_action":"linode.delete","skipChecks":true}]"#
        );
    }

    #[test]
    fn nested_values_are_rejected() {
        let action = Action::new("linode.create").with_param("PlanID", json!({"id": 1}));
        let err = encode_actions(&[action]).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));

        let action = Action::new("linode.create").with_param("PlanID", Value::Null);
        assert!(matches!(
            encode_actions(&[action]).unwrap_err(),
            Error::Encoding(_)
        ));
    }

    #[test]
    fn reserved_parameter_is_rejected() {
        let action = Action::new("linode.list").with_param(ACTION_FIELD, "linode.delete");
        assert!(matches!(
            encode_actions(&[action]).unwrap_err(),
            Error::Encoding(_)
        ));
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            encode_actions(&[]).unwrap_err(),
            Error::Encoding(_)
        ));
    }

    #[test]
    fn encode_builds_batch_query() {
        let batch = BatchRequest::get(vec![
            Action::from(ActionName::List).with_param("LinodeID", "586892"),
            Action::from(ActionName::IpList).with_param("LinodeID", "586892"),
        ]);

        let request = batch.encode("foobar", "http://localhost:4444").unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.host_str(), Some("localhost"));

        let params = query(&request);
        assert_eq!(params["api_action"], "batch");
        assert_eq!(params["api_key"], "foobar");
        assert_eq!(
            params["api_requestArray"],
            r#"[{"LinodeID":"586892","api_action":"linode.list"},{"LinodeID":"586892","api_action":"linode.ip.list"}]"#
        );
        assert_eq!(batch.action_names(), ["linode.list", "linode.ip.list"]);
    }

    #[test]
    fn encode_rejects_bad_base_url() {
        let batch = BatchRequest::post(vec![Action::from(ActionName::Create)]);

        let err = batch.encode("key", "not a url").unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));

        let err = batch.encode("key", "ftp://api.linode.com").unwrap_err();
        assert!(matches!(err, Error::RequestBuild(_)));
    }

    #[test]
    fn decode_requires_action_field() {
        let err = decode_actions(r#"[{"LinodeID":"1"}]"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
