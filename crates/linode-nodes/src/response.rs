//! Batch response decoding and demultiplexing.
//!
//! A batch call answers with one sub-response per submitted action, in
//! submission order. [`demultiplex`] validates that layout and pairs each
//! sub-response's single data record with the action that produced it.

use linode_core::{aggregate, Error, ErrorDetail, RawResponse, Result, ShapeError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Generic data record: field name to dynamically-typed value.
pub type Record = Map<String, Value>;

const ERROR_CODE_FIELD: &str = "ERRORCODE";

fn decode_error(err: serde_json::Error) -> Error {
    Error::Decode(format!("Error decoding batch response: {err}"))
}

/// The portion of a batch response produced by one action.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SubResponse {
    /// Echo of the originating action name
    #[serde(rename = "ACTION", default)]
    pub action: String,
    /// Data records; an empty object or `null` counts as no record
    #[serde(rename = "DATA", default, deserialize_with = "deserialize_records")]
    pub data: Vec<Record>,
    /// Remote failures for this action
    #[serde(rename = "ERRORARRAY", default, deserialize_with = "deserialize_errors")]
    pub errors: Vec<ErrorDetail>,
}

fn deserialize_records<'de, D>(deserializer: D) -> std::result::Result<Vec<Record>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Object(record) if record.is_empty() => Ok(Vec::new()),
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(D::Error::custom(format!(
                    "expected DATA records to be objects, found {other}"
                ))),
            })
            .collect(),
        other => Err(D::Error::custom(format!(
            "expected DATA to be an object or array, found {other}"
        ))),
    }
}

fn deserialize_errors<'de, D>(deserializer: D) -> std::result::Result<Vec<ErrorDetail>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ErrorDetail>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered sub-responses of one batch call.
///
/// Accepts both the array form and the bare object some single-action calls
/// answer with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponse(pub Vec<SubResponse>);

impl BatchResponse {
    /// Decode a response body.
    ///
    /// A bare `{"ERRORCODE", "ERRORMESSAGE"}` object is the API reporting a
    /// failure outside the batch envelope and is returned as [`Error::Api`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not a batch response, naming
    /// the field that failed, and [`Error::Api`] for a bare error object.
    pub fn from_json(body: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(body).map_err(decode_error)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    SubResponse::deserialize(item).map_err(|err| {
                        Error::Decode(format!(
                            "Error decoding sub-response at position {index}: {err}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(Self),
            Value::Object(object) if object.contains_key(ERROR_CODE_FIELD) => {
                let detail = ErrorDetail::deserialize(Value::Object(object)).map_err(decode_error)?;
                warn!(code = %detail.code, "Linode API reported an error outside the batch");
                Err(aggregate([detail]).map_or_else(
                    || Error::Decode("empty error payload".to_string()),
                    Error::Api,
                ))
            }
            Value::Object(object) => SubResponse::deserialize(Value::Object(object))
                .map(|response| Self(vec![response]))
                .map_err(decode_error),
            other => Err(Error::Decode(format!(
                "Error decoding batch response: expected an array or object, found {other}"
            ))),
        }
    }

    /// Number of sub-responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no sub-responses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Aggregate of every sub-response's errors, in submission order.
    #[must_use]
    pub fn errors(&self) -> Option<linode_core::ApiErrors> {
        aggregate(self.0.iter().flat_map(|response| response.errors.iter().cloned()))
    }
}

/// Error body returned alongside 400 and 422 statuses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    /// `{"ERRORARRAY": [...]}`
    Many {
        /// Reported failures
        #[serde(rename = "ERRORARRAY")]
        errors: Vec<ErrorDetail>,
    },
    /// `{"ERRORCODE": .., "ERRORMESSAGE": ..}`
    One(ErrorDetail),
}

impl ErrorPayload {
    /// The reported failures in order.
    #[must_use]
    pub fn into_details(self) -> Vec<ErrorDetail> {
        match self {
            Self::Many { errors } => errors,
            Self::One(detail) => vec![detail],
        }
    }
}

/// Apply the status policy to a completed round trip.
///
/// 200, 201, 202 and 204 yield the body. 400 and 422 are parsed as an error
/// payload and returned as [`Error::Api`]. Any other status becomes
/// [`Error::Transport`] without looking at the body.
///
/// # Errors
///
/// Returns an error for every status other than the four success codes.
pub fn interpret_status(response: RawResponse) -> Result<String> {
    match response.status {
        200 | 201 | 202 | 204 => Ok(response.body),
        400 | 422 => Err(parse_error_payload(&response)),
        status => {
            let status_line = response.status_line();
            warn!(status, "Linode API returned an untrusted status");
            Err(Error::Transport {
                status,
                status_line,
            })
        }
    }
}

fn parse_error_payload(response: &RawResponse) -> Error {
    let status_line = response.status_line();

    match serde_json::from_str::<ErrorPayload>(&response.body) {
        Ok(payload) => aggregate(payload.into_details()).map_or_else(
            || Error::Transport {
                status: response.status,
                status_line: status_line.clone(),
            },
            Error::Api,
        ),
        Err(err) => Error::Decode(format!(
            "Error parsing error body for {status_line} response: {err}"
        )),
    }
}

/// A data record paired with the action that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRecord {
    /// Action name
    pub action: String,
    /// The single record returned for it
    pub record: Record,
}

/// Records of a demultiplexed batch, in submission order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchedRecords(Vec<MatchedRecord>);

impl MatchedRecords {
    /// Record produced by `action`, if it was part of the batch.
    #[must_use]
    pub fn get(&self, action: &str) -> Option<&Record> {
        self.0
            .iter()
            .find(|matched| matched.action == action)
            .map(|matched| &matched.record)
    }

    /// Iterate in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, MatchedRecord> {
        self.0.iter()
    }

    /// Number of matched records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MatchedRecord> for MatchedRecords {
    fn from_iter<I: IntoIterator<Item = MatchedRecord>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for MatchedRecords {
    type Item = MatchedRecord;
    type IntoIter = std::vec::IntoIter<MatchedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a MatchedRecords {
    type Item = &'a MatchedRecord;
    type IntoIter = std::slice::Iter<'a, MatchedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Pair each sub-response with the action submitted at the same position.
///
/// Checks run in a fixed order: arity, remote errors (across the whole batch),
/// one record per sub-response, then the echoed action names.
///
/// # Errors
///
/// - [`ShapeError::ResponseCount`] if the counts differ;
/// - [`Error::Api`] if any sub-response carries errors;
/// - [`ShapeError::RecordCount`] if a sub-response does not hold exactly one record;
/// - [`Error::UnexpectedAction`] if an echoed name differs from the submitted one.
pub fn demultiplex(raw: BatchResponse, expected: &[&str]) -> Result<MatchedRecords> {
    if raw.len() != expected.len() {
        return Err(ShapeError::ResponseCount {
            expected: expected.len(),
            actual: raw.len(),
        }
        .into());
    }

    if let Some(errors) = raw.errors() {
        warn!(count = errors.len(), "Linode API reported errors");
        return Err(Error::Api(errors));
    }

    for (response, expected_action) in raw.0.iter().zip(expected) {
        if response.data.len() != 1 {
            return Err(ShapeError::RecordCount {
                action: (*expected_action).to_string(),
                count: response.data.len(),
            }
            .into());
        }
    }

    let matched = raw
        .0
        .into_iter()
        .zip(expected)
        .map(|(response, expected_action)| {
            if response.action != *expected_action {
                return Err(Error::UnexpectedAction {
                    expected: (*expected_action).to_string(),
                    actual: response.action,
                });
            }
            let record = response.data.into_iter().next().unwrap_or_default();
            Ok(MatchedRecord {
                action: response.action,
                record,
            })
        })
        .collect::<Result<MatchedRecords>>()?;

    debug!(actions = ?expected, "demultiplexed batch response");
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sub(action: &str, data: Value, errors: Value) -> SubResponse {
        serde_json::from_value(json!({
            "ACTION": action,
            "DATA": data,
            "ERRORARRAY": errors,
        }))
        .unwrap()
    }

    fn ok_sub(action: &str) -> SubResponse {
        sub(action, json!([{"LINODEID": 1}]), json!([]))
    }

    #[test]
    fn decodes_array_and_single_object_forms() {
        let many = BatchResponse::from_json(
            r#"[{"ACTION":"linode.list","DATA":[{"LINODEID":1}],"ERRORARRAY":[]}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 1);
        assert_eq!(many.0[0].data.len(), 1);

        let one = BatchResponse::from_json(
            r#"{"ERRORARRAY":[],"ACTION":"linode.create","DATA":{"LinodeID":8098}}"#,
        )
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one.0[0].action, "linode.create");
        assert_eq!(one.0[0].data[0]["LinodeID"], json!(8098));
    }

    #[test]
    fn empty_object_and_null_data_hold_no_record() {
        assert!(sub("linode.create", json!({}), json!([])).data.is_empty());
        assert!(sub("linode.create", Value::Null, Value::Null).data.is_empty());
    }

    #[test]
    fn non_object_records_fail_to_decode() {
        let err = BatchResponse::from_json(r#"[{"ACTION":"linode.list","DATA":[1,2]}]"#)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn demultiplex_matches_by_position() {
        let raw = BatchResponse(vec![ok_sub("linode.list"), ok_sub("linode.ip.list")]);
        let matched = demultiplex(raw, &["linode.list", "linode.ip.list"]).unwrap();

        let actions: Vec<&str> = matched.iter().map(|m| m.action.as_str()).collect();
        assert_eq!(actions, ["linode.list", "linode.ip.list"]);
        assert!(matched.get("linode.ip.list").is_some());
        assert!(matched.get("linode.disk.list").is_none());
    }

    #[test]
    fn demultiplex_rejects_arity_mismatch() {
        let raw = BatchResponse(vec![ok_sub("linode.list"), ok_sub("linode.ip.list")]);
        let err = demultiplex(raw, &["linode.list", "linode.ip.list", "linode.disk.list"])
            .unwrap_err();
        assert_eq!(
            err,
            Error::Shape(ShapeError::ResponseCount {
                expected: 3,
                actual: 2
            })
        );

        let raw = BatchResponse(vec![ok_sub("linode.list"), ok_sub("linode.list")]);
        let err = demultiplex(raw, &["linode.list"]).unwrap_err();
        assert_eq!(
            err,
            Error::Shape(ShapeError::ResponseCount {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn any_error_fails_the_whole_batch() {
        let raw = BatchResponse(vec![
            ok_sub("linode.list"),
            sub(
                "linode.ip.list",
                json!([]),
                json!([{"ERRORCODE": 5, "ERRORMESSAGE": "Object not found"}]),
            ),
            sub(
                "linode.disk.list",
                json!([]),
                json!([{"ERRORCODE": 5, "ERRORMESSAGE": ""}]),
            ),
        ]);

        let err = demultiplex(raw, &["linode.list", "linode.ip.list", "linode.disk.list"])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "5: Object not found, 5: no error message available"
        );
    }

    #[test]
    fn errors_take_precedence_over_record_count() {
        let raw = BatchResponse(vec![sub(
            "linode.create",
            json!({}),
            json!([{"ERRORCODE": 8, "ERRORMESSAGE": "PlanID is invalid. Check linode.plans.list"}]),
        )]);
        let err = demultiplex(raw, &["linode.create"]).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }

    #[test]
    fn demultiplex_requires_exactly_one_record() {
        let raw = BatchResponse(vec![sub("linode.list", json!([]), json!([]))]);
        let err = demultiplex(raw, &["linode.list"]).unwrap_err();
        assert_eq!(
            err,
            Error::Shape(ShapeError::RecordCount {
                action: "linode.list".to_string(),
                count: 0
            })
        );

        let raw = BatchResponse(vec![sub(
            "linode.disk.list",
            json!([{"DISKID": 1}, {"DISKID": 2}]),
            json!([]),
        )]);
        let err = demultiplex(raw, &["linode.disk.list"]).unwrap_err();
        assert!(matches!(
            err,
            Error::Shape(ShapeError::RecordCount { count: 2, .. })
        ));
    }

    #[test]
    fn demultiplex_rejects_out_of_order_actions() {
        let raw = BatchResponse(vec![ok_sub("linode.ip.list"), ok_sub("linode.list")]);
        let err = demultiplex(raw, &["linode.list", "linode.ip.list"]).unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedAction {
                expected: "linode.list".to_string(),
                actual: "linode.ip.list".to_string(),
            }
        );
    }

    #[test]
    fn bare_error_object_on_success_status_keeps_remote_message() {
        let body = interpret_status(RawResponse::new(
            200,
            r#"{"ERRORCODE": 8, "ERRORMESSAGE": "PlanID is invalid. Check linode.plans.list"}"#,
        ))
        .unwrap();

        let err = BatchResponse::from_json(&body).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "8: PlanID is invalid. Check linode.plans.list");
    }

    #[test]
    fn field_errors_reach_the_decode_message() {
        let err = BatchResponse::from_json(
            r#"[{"ACTION":"linode.list","DATA":[{"LINODEID":1}]},{"ACTION":"linode.ip.list","DATA":"oops"}]"#,
        )
        .unwrap_err();

        let Error::Decode(message) = err else {
            panic!("expected a decode error, got {err:?}");
        };
        assert!(message.contains("position 1"), "{message}");
        assert!(message.contains("expected DATA to be an object or array"), "{message}");
        assert!(!message.contains("untagged"), "{message}");

        let err = BatchResponse::from_json(r#"{"ERRORCODE": 8.5}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = BatchResponse::from_json("42").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn status_policy_passes_success_bodies() {
        for status in [200, 201, 202, 204] {
            let body = interpret_status(RawResponse::new(status, "[]")).unwrap();
            assert_eq!(body, "[]");
        }
    }

    #[test]
    fn status_policy_parses_both_error_payload_shapes() {
        let err = interpret_status(RawResponse::new(
            422,
            r#"{"ERRORCODE": 8, "ERRORMESSAGE": "PlanID is invalid. Check linode.plans.list"}"#,
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "8: PlanID is invalid. Check linode.plans.list");

        let err = interpret_status(RawResponse::new(
            400,
            r#"{"ERRORARRAY": [{"ERRORCODE": 4, "ERRORMESSAGE": "Authentication failed"}, {"ERRORCODE": 6, "ERRORMESSAGE": "LinodeID is required"}]}"#,
        ))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "4: Authentication failed, 6: LinodeID is required"
        );
    }

    #[test]
    fn status_policy_reports_unparseable_error_body() {
        let err = interpret_status(RawResponse::new(400, "<html>bad</html>")).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn status_policy_treats_empty_error_list_as_transport_failure() {
        let err = interpret_status(RawResponse::new(422, r#"{"ERRORARRAY": []}"#)).unwrap_err();
        assert!(matches!(err, Error::Transport { status: 422, .. }));
    }

    #[test]
    fn status_policy_does_not_parse_other_bodies() {
        let err = interpret_status(RawResponse::new(
            500,
            r#"{"ERRORCODE": 8, "ERRORMESSAGE": "would be misleading"}"#,
        ))
        .unwrap_err();
        assert_eq!(
            err,
            Error::Transport {
                status: 500,
                status_line: "500 Internal Server Error".to_string(),
            }
        );
        assert!(err.to_string().contains("500 Internal Server Error"));

        let err = interpret_status(RawResponse::new(404, "")).unwrap_err();
        assert!(matches!(err, Error::Transport { status: 404, .. }));
    }
}
