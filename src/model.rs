//! Core data model.
//!
//! A workflow step is one user action recorded while offline. The payload is
//! owned by the producer; the queue only adds the `timestamp` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Well-known key the whole queue record is stored under.
pub const QUEUE_KEY: &str = "offline-workflows";

/// Name of the field the queue stamps onto every step.
pub const TIMESTAMP_FIELD: &str = "timestamp";

// ---------------------------------------------------------------------------
// Workflow Step
// ---------------------------------------------------------------------------

/// A buffered workflow step: the producer's record plus the append timestamp.
///
/// Serializes as a single flat JSON object, e.g.
/// `{"title":"A","timestamp":1718000000000}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Arbitrary producer-defined fields. Opaque to the queue.
    #[serde(flatten)]
    pub payload: Map<String, Value>,

    /// Milliseconds since the Unix epoch, stamped at append time.
    pub timestamp: i64,
}

impl WorkflowStep {
    /// Build a step from a producer payload, overwriting any `timestamp` key
    /// the producer may have set.
    pub(crate) fn stamped(mut payload: Map<String, Value>, timestamp: i64) -> Self {
        payload.remove(TIMESTAMP_FIELD);
        Self { payload, timestamp }
    }

    /// Look up a payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

/// Convert an arbitrary JSON value into a step payload.
///
/// Steps are records; anything other than a JSON object is rejected.
pub fn payload_from_value(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidStep(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_serializes_flat() {
        let payload = payload_from_value(json!({"title": "A", "count": 2})).unwrap();
        let step = WorkflowStep::stamped(payload, 42);

        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value, json!({"title": "A", "count": 2, "timestamp": 42}));
    }

    #[test]
    fn producer_timestamp_is_overwritten() {
        let payload = payload_from_value(json!({"title": "A", "timestamp": 1})).unwrap();
        let step = WorkflowStep::stamped(payload, 99);

        assert_eq!(step.timestamp, 99);
        assert!(step.get(TIMESTAMP_FIELD).is_none());
        let raw = serde_json::to_string(&step).unwrap();
        assert_eq!(raw.matches("timestamp").count(), 1);
    }

    #[test]
    fn stored_record_parses_back_into_payload_and_timestamp() {
        let raw = r#"[{"title":"B","nested":{"x":1},"timestamp":7}]"#;
        let steps: Vec<WorkflowStep> = serde_json::from_str(raw).unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].timestamp, 7);
        assert_eq!(steps[0].get("nested"), Some(&json!({"x": 1})));
        assert!(steps[0].get(TIMESTAMP_FIELD).is_none());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = payload_from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, Error::InvalidStep(_)));
        assert!(err.to_string().contains("an array"));
    }
}
