//! Node models and the rules that fold batch records into them.

use crate::batch::{Action, ActionName};
use crate::response::{MatchedRecords, Record};
use linode_core::{Error, Result, ShapeError};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Lifecycle status of a node as reported by `linode.list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// `-2`
    BootFailed,
    /// `-1`
    BeingCreated,
    /// `0`
    BrandNew,
    /// `1`
    Running,
    /// `2`
    PoweredOff,
    /// `3`
    ShuttingDown,
    /// `4`
    SavedToDisk,
}

impl NodeStatus {
    /// Map a numeric status code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            -2 => Some(Self::BootFailed),
            -1 => Some(Self::BeingCreated),
            0 => Some(Self::BrandNew),
            1 => Some(Self::Running),
            2 => Some(Self::PoweredOff),
            3 => Some(Self::ShuttingDown),
            4 => Some(Self::SavedToDisk),
            _ => None,
        }
    }

    /// Map the textual form stored on [`Node::status`].
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        code.trim().parse::<i64>().ok().and_then(Self::from_code)
    }

    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::BootFailed => -2,
            Self::BeingCreated => -1,
            Self::BrandNew => 0,
            Self::Running => 1,
            Self::PoweredOff => 2,
            Self::ShuttingDown => 3,
            Self::SavedToDisk => 4,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BootFailed => "boot failed",
            Self::BeingCreated => "being created",
            Self::BrandNew => "brand new",
            Self::Running => "running",
            Self::PoweredOff => "powered off",
            Self::ShuttingDown => "shutting down",
            Self::SavedToDisk => "saved to disk",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label for a textual status code; empty for codes outside the known set.
#[must_use]
pub fn status_label(code: &str) -> &'static str {
    NodeStatus::parse(code).map_or("", NodeStatus::label)
}

/// A node reconciled from one `linode.list`, `linode.ip.list` and
/// `linode.disk.list` batch.
///
/// Every attribute is kept as text; numeric fields hold their canonical
/// decimal rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID (`LINODEID`)
    pub id: String,
    /// Datacenter ID (`DATACENTERID`)
    pub datacenter_id: String,
    /// Distribution vendor (`DISTRIBUTIONVENDOR`)
    pub distribution_vendor: String,
    /// Label (`LABEL`)
    pub label: String,
    /// Status code (`STATUS`)
    pub status: String,
    /// Total disk in MB (`TOTALHD`)
    pub total_hd: String,
    /// Public IP address (`IPADDRESS`)
    pub ip_address: String,
    /// Reverse DNS name (`RDNS_NAME`)
    pub dns_name: String,
    /// Disk label
    pub disk_label: String,
    /// Disk type, e.g. `ext4` or `swap`
    pub disk_type: String,
    /// Disk status code
    pub disk_status: String,
    /// Disk size in MB
    pub disk_size: String,
}

impl Node {
    /// Parsed lifecycle status, if known.
    #[must_use]
    pub fn node_status(&self) -> Option<NodeStatus> {
        NodeStatus::parse(&self.status)
    }

    /// Status label; empty when the status code is unknown.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        status_label(&self.status)
    }
}

/// Parameters for `linode.create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    /// Datacenter to place the node in
    pub datacenter_id: String,
    /// Plan to provision
    pub plan_id: String,
    /// Billing term in months, omitted when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_term: Option<String>,
}

impl CreateNodeRequest {
    /// Create a request for `plan_id` in `datacenter_id`.
    #[must_use]
    pub fn new(datacenter_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            datacenter_id: datacenter_id.into(),
            plan_id: plan_id.into(),
            payment_term: None,
        }
    }

    /// Set the payment term.
    #[must_use]
    pub fn with_payment_term(mut self, term: impl Into<String>) -> Self {
        self.payment_term = Some(term.into());
        self
    }

    /// The batch action for this request.
    #[must_use]
    pub fn to_action(&self) -> Action {
        let mut action = Action::from(ActionName::Create)
            .with_param("DataCenterID", self.datacenter_id.as_str())
            .with_param("PlanID", self.plan_id.as_str());
        if let Some(term) = &self.payment_term {
            action.set_param("PaymentTerm", term.as_str());
        }
        action
    }
}

/// Parameters for `linode.delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyNodeRequest {
    /// Node to destroy
    pub linode_id: String,
    /// Skip the server-side safety checks; sent as `false` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_checks: Option<bool>,
}

impl DestroyNodeRequest {
    /// Create a request for `linode_id`.
    #[must_use]
    pub fn new(linode_id: impl Into<String>) -> Self {
        Self {
            linode_id: linode_id.into(),
            skip_checks: None,
        }
    }

    /// Set whether to skip the safety checks.
    #[must_use]
    pub fn with_skip_checks(mut self, skip: bool) -> Self {
        self.skip_checks = Some(skip);
        self
    }

    /// The batch action for this request.
    #[must_use]
    pub fn to_action(&self) -> Action {
        let skip = if self.skip_checks.unwrap_or(false) {
            "true"
        } else {
            "false"
        };
        Action::from(ActionName::Delete)
            .with_param("LinodeID", self.linode_id.as_str())
            .with_param("skipChecks", skip)
    }
}

/// The three actions a node retrieval batches together, in submission order.
#[must_use]
pub fn retrieve_actions(id: &str) -> Vec<Action> {
    [ActionName::List, ActionName::IpList, ActionName::DiskList]
        .into_iter()
        .map(|name| Action::from(name).with_param("LinodeID", id))
        .collect()
}

/// Canonical decimal text for a JSON number.
///
/// Integral values render without a fractional part; other floats use the
/// shortest representation that round-trips.
#[must_use]
pub fn canonical_number(number: &Number) -> String {
    if let Some(value) = number.as_i64() {
        return value.to_string();
    }
    if let Some(value) = number.as_u64() {
        return value.to_string();
    }
    match number.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(value) if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 => {
            (value as i64).to_string()
        }
        Some(value) => value.to_string(),
        None => number.to_string(),
    }
}

/// Typed field access over a generic record that fails closed.
struct RecordReader<'a> {
    action: &'a str,
    record: &'a Record,
}

impl<'a> RecordReader<'a> {
    const fn new(action: &'a str, record: &'a Record) -> Self {
        Self { action, record }
    }

    fn field(&self, field: &str) -> Result<&'a Value> {
        self.record.get(field).ok_or_else(|| {
            ShapeError::MissingField {
                action: self.action.to_string(),
                field: field.to_string(),
            }
            .into()
        })
    }

    fn type_error(&self, field: &str, expected: &'static str) -> Error {
        ShapeError::FieldType {
            action: self.action.to_string(),
            field: field.to_string(),
            expected,
        }
        .into()
    }

    fn string(&self, field: &str) -> Result<String> {
        match self.field(field)? {
            Value::String(value) => Ok(value.clone()),
            _ => Err(self.type_error(field, "string")),
        }
    }

    fn number(&self, field: &str) -> Result<String> {
        match self.field(field)? {
            Value::Number(value) => Ok(canonical_number(value)),
            _ => Err(self.type_error(field, "number")),
        }
    }
}

fn apply_list(node: &mut Node, fields: &RecordReader<'_>) -> Result<()> {
    node.datacenter_id = fields.number("DATACENTERID")?;
    node.distribution_vendor = fields.string("DISTRIBUTIONVENDOR")?;
    node.id = fields.number("LINODEID")?;
    node.label = fields.string("LABEL")?;
    node.status = fields.number("STATUS")?;
    node.total_hd = fields.number("TOTALHD")?;
    Ok(())
}

fn apply_ip_list(node: &mut Node, fields: &RecordReader<'_>) -> Result<()> {
    node.ip_address = fields.string("IPADDRESS")?;
    node.dns_name = fields.string("RDNS_NAME")?;
    Ok(())
}

fn apply_disk_list(node: &mut Node, fields: &RecordReader<'_>) -> Result<()> {
    node.disk_label = fields.string("LABEL")?;
    node.disk_type = fields.string("TYPE")?;
    node.disk_status = fields.number("STATUS")?;
    node.disk_size = fields.number("SIZE")?;
    Ok(())
}

/// Fold demultiplexed records into a [`Node`].
///
/// Each of `linode.list`, `linode.ip.list` and `linode.disk.list` must be
/// present; the node is returned only if all three fold cleanly.
///
/// # Errors
///
/// - [`Error::UnsupportedAction`] for an action without an extraction rule;
/// - [`ShapeError::MissingField`] / [`ShapeError::FieldType`] for bad records;
/// - [`ShapeError::MissingAction`] if one of the three actions is absent.
pub fn assemble_node(matched: &MatchedRecords) -> Result<Node> {
    let mut node = Node::default();
    let mut seen = (false, false, false);

    for entry in matched {
        let fields = RecordReader::new(&entry.action, &entry.record);
        match ActionName::from_name(&entry.action) {
            Some(ActionName::List) => {
                apply_list(&mut node, &fields)?;
                seen.0 = true;
            }
            Some(ActionName::IpList) => {
                apply_ip_list(&mut node, &fields)?;
                seen.1 = true;
            }
            Some(ActionName::DiskList) => {
                apply_disk_list(&mut node, &fields)?;
                seen.2 = true;
            }
            Some(ActionName::Create | ActionName::Delete) | None => {
                return Err(Error::UnsupportedAction(entry.action.clone()));
            }
        }
    }

    let missing = [
        (seen.0, ActionName::List),
        (seen.1, ActionName::IpList),
        (seen.2, ActionName::DiskList),
    ]
    .into_iter()
    .find(|(present, _)| !present);

    if let Some((_, action)) = missing {
        return Err(ShapeError::MissingAction {
            action: action.as_str().to_string(),
        }
        .into());
    }

    Ok(node)
}

/// Read the `LinodeID` reported by `linode.create` or `linode.delete`.
///
/// # Errors
///
/// Returns a [`ShapeError`] if the field is missing or not a number.
pub fn extract_linode_id(action: &str, record: &Record) -> Result<String> {
    RecordReader::new(action, record).number("LinodeID")
}
