//! [`Envelope`] – versioned HAL message wrapper.
//!
//! Every command and telemetry document travelling between a node and its
//! controller is wrapped in an envelope carrying the protocol version, the
//! payload schema id, the target device and the sender's capability list.
//!
//! Older controllers still emit the short field names `hal_major`,
//! `hal_minor` and `caps`; they are accepted as aliases when parsing.
//!
//! # Example
//!
//! ```rust
//! use tafy_types::Envelope;
//!
//! let env = Envelope::new("tafylabs/hal/system/heartbeat/1.0", "robot-7", vec![], 1_000);
//! assert!(env.is_addressed_to("robot-7"));
//! assert!(!env.is_broadcast());
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::NodeError;

/// The one protocol major version this node understands.
pub const PROTOCOL_MAJOR: u32 = 1;
/// Minor version stamped on outbound envelopes. Inbound minors are not checked.
pub const PROTOCOL_MINOR: u32 = 0;
/// Device id addressing every node on a shared subject.
pub const BROADCAST_DEVICE_ID: &str = "*";

/// Required envelope fields with their accepted legacy alias.
pub const REQUIRED_FIELDS: [(&str, Option<&str>); 7] = [
    ("protocol_major", Some("hal_major")),
    ("protocol_minor", Some("hal_minor")),
    ("schema", None),
    ("device_id", None),
    ("capabilities", Some("caps")),
    ("ts", None),
    ("payload", None),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Envelope {
    #[serde(alias = "hal_major")]
    pub protocol_major: u32,
    #[serde(alias = "hal_minor")]
    pub protocol_minor: u32,
    pub schema: String,
    pub device_id: String,
    #[serde(alias = "caps")]
    pub capabilities: Vec<String>,
    pub ts: u64,
    pub payload: Value,
}

impl Envelope {
    /// Build an outbound envelope with the current protocol version and an
    /// empty payload object.
    pub fn new(
        schema: impl Into<String>,
        device_id: impl Into<String>,
        capabilities: Vec<String>,
        ts: u64,
    ) -> Self {
        Self {
            protocol_major: PROTOCOL_MAJOR,
            protocol_minor: PROTOCOL_MINOR,
            schema: schema.into(),
            device_id: device_id.into(),
            capabilities,
            ts,
            payload: Value::Object(Map::new()),
        }
    }

    /// Replace the payload with the serialized form of `payload`.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, NodeError> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    pub fn is_broadcast(&self) -> bool {
        self.device_id == BROADCAST_DEVICE_ID
    }

    /// `true` when the envelope targets `device_id` directly or is a broadcast.
    pub fn is_addressed_to(&self, device_id: &str) -> bool {
        self.is_broadcast() || self.device_id == device_id
    }

    /// Names of the required fields absent from `doc` (under both the
    /// canonical name and its alias). A non-object document lacks all of them.
    pub fn missing_fields(doc: &Value) -> Vec<&'static str> {
        let Some(obj) = doc.as_object() else {
            return REQUIRED_FIELDS.iter().map(|(name, _)| *name).collect();
        };
        REQUIRED_FIELDS
            .iter()
            .filter(|(name, alias)| {
                !obj.contains_key(*name) && !alias.is_some_and(|a| obj.contains_key(a))
            })
            .map(|(name, _)| *name)
            .collect()
    }

    /// Protocol major as written in `doc`, under either field name.
    pub fn declared_major(doc: &Value) -> Option<i64> {
        doc.get("protocol_major")
            .or_else(|| doc.get("hal_major"))
            .and_then(Value::as_i64)
    }

    pub fn to_document(&self) -> Result<Value, NodeError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_doc() -> Value {
        json!({
            "protocol_major": 1,
            "protocol_minor": 0,
            "schema": "tafylabs/hal/motor/differential/1.0",
            "device_id": "*",
            "capabilities": [],
            "ts": 1000,
            "payload": {}
        })
    }

    #[test]
    fn new_envelope_has_version_and_empty_payload() {
        let env = Envelope::new("s", "dev", vec!["motor.differential:v1.0".into()], 5);
        assert_eq!(env.protocol_major, PROTOCOL_MAJOR);
        assert_eq!(env.protocol_minor, PROTOCOL_MINOR);
        assert_eq!(env.payload, json!({}));
        assert_eq!(env.ts, 5);
    }

    #[test]
    fn complete_document_has_no_missing_fields() {
        assert!(Envelope::missing_fields(&full_doc()).is_empty());
    }

    #[test]
    fn each_missing_field_is_reported() {
        for (name, _) in REQUIRED_FIELDS {
            let mut doc = full_doc();
            doc.as_object_mut().unwrap().remove(name);
            assert_eq!(Envelope::missing_fields(&doc), vec![name]);
        }
    }

    #[test]
    fn legacy_aliases_satisfy_required_fields() {
        let doc = json!({
            "hal_major": 1,
            "hal_minor": 3,
            "schema": "x",
            "device_id": "a",
            "caps": ["motor.differential"],
            "ts": 1,
            "payload": {}
        });
        assert!(Envelope::missing_fields(&doc).is_empty());
        assert_eq!(Envelope::declared_major(&doc), Some(1));
        let env: Envelope = serde_json::from_value(doc).unwrap();
        assert_eq!(env.protocol_minor, 3);
        assert_eq!(env.capabilities, vec!["motor.differential".to_string()]);
    }

    #[test]
    fn non_object_document_misses_everything() {
        assert_eq!(Envelope::missing_fields(&json!([1, 2])).len(), 7);
    }

    #[test]
    fn addressing() {
        let mut env = Envelope::new("s", "*", vec![], 0);
        assert!(env.is_addressed_to("robot-1"));
        env.device_id = "robot-2".into();
        assert!(!env.is_addressed_to("robot-1"));
        assert!(env.is_addressed_to("robot-2"));
    }

    #[test]
    fn with_payload_serializes() {
        #[derive(Serialize)]
        struct P {
            a: u8,
        }
        let env = Envelope::new("s", "d", vec![], 0)
            .with_payload(&P { a: 4 })
            .unwrap();
        assert_eq!(env.payload, json!({"a": 4}));
        assert_eq!(env.to_document().unwrap()["payload"]["a"], 4);
    }
}
