// ── Wire shapes ──
//
// Outbound command envelope, inbound confirmation message, and the raw
// documents the document store pushes. Field names follow the server's
// camelCase JSON; everything the server may send as either a number or a
// string goes through the lenient deserializers at the bottom.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Outbound ─────────────────────────────────────────────────────────

/// Payload of one outbound command.
///
/// `extra` carries the action-specific fields (lock reason, refund amount,
/// settings patch, ...) flattened next to the addressing fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    pub station_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandPayload {
    pub fn new(station_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            action: action.into(),
            module_id: None,
            slot_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_slot(mut self, module_id: u32, slot_id: u32) -> Self {
        self.module_id = Some(module_id);
        self.slot_id = Some(slot_id);
        self
    }

    pub fn with_module(mut self, module_id: u32) -> Self {
        self.module_id = Some(module_id);
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_owned(), value.into());
        self
    }
}

/// `{ kind: "command", token, payload }` -- the frame actually written.
#[derive(Debug, Serialize)]
pub(crate) struct OutboundEnvelope<'a> {
    pub kind: &'static str,
    pub token: &'a str,
    pub payload: &'a CommandPayload,
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A confirmation or event received over the command channel.
///
/// Loosely typed on purpose: the action catalogue lives in `fleetsync-core`,
/// which turns this into a closed set of confirmations. Unknown fields are
/// kept in `extra` so nothing the server sends is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub action: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub status_text: Option<String>,

    #[serde(default, alias = "station", deserialize_with = "lenient_string")]
    pub affected_station: Option<String>,

    #[serde(default, alias = "module", deserialize_with = "lenient_u32")]
    pub affected_module: Option<u32>,

    #[serde(default, alias = "slot", deserialize_with = "lenient_u32")]
    pub affected_slot: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundMessage {
    /// Look up an action-specific field as a string, accepting numbers too.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Look up an action-specific field as an integer, accepting numeric strings.
    pub fn extra_i64(&self, key: &str) -> Option<i64> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Status, falling back to the human-readable status text.
    pub fn status_or_text(&self) -> Option<&str> {
        self.status.as_deref().or(self.status_text.as_deref())
    }
}

/// A `(module, slot)` address inside one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRef {
    #[serde(alias = "moduleId", deserialize_with = "strict_lenient_u32")]
    pub module: u32,
    #[serde(alias = "slotId", alias = "position", deserialize_with = "strict_lenient_u32")]
    pub slot: u32,
}

// ── Documents ────────────────────────────────────────────────────────

/// Raw station document as stored in the `stations` collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StationDocument {
    #[serde(alias = "stationId", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub modules: Vec<ModuleDocument>,
    pub ngrok_connected: Option<bool>,
    pub ssh_connected: Option<bool>,
    pub disabled: Option<bool>,
    pub flow_version: Option<String>,
    pub ui_version: Option<String>,
    /// RFC 3339 timestamp or epoch milliseconds.
    pub last_update: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleDocument {
    #[serde(deserialize_with = "lenient_u32")]
    pub id: Option<u32>,
    pub output: Option<bool>,
    pub slots: Vec<SlotDocument>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotDocument {
    #[serde(alias = "id", deserialize_with = "lenient_u32")]
    pub position: Option<u32>,
    /// Occupant serial; `0`, `"0"` and `""` all mean "empty".
    #[serde(alias = "sn", deserialize_with = "lenient_string")]
    pub serial: Option<String>,
    pub battery: Option<f64>,
    pub charging_current: Option<f64>,
    #[serde(alias = "locked")]
    pub is_locked: Option<bool>,
    pub lock_reason: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub status: Option<i64>,
}

/// Raw rental document as stored in the `rentals` collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RentalDocument {
    #[serde(alias = "rentalId", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub station_id: Option<String>,
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub started_at: Option<Value>,
}

// ── Lenient deserializers ────────────────────────────────────────────

fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u32>, D::Error> {
    Ok(lenient_i64(de)?.and_then(|n| u32::try_from(n).ok()))
}

fn strict_lenient_u32<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    lenient_u32(de)?.ok_or_else(|| serde::de::Error::custom("expected a non-negative integer"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn payload_flattens_action_fields() {
        let payload = CommandPayload::new("A", "lock slot")
            .with_slot(1, 3)
            .with_field("reason", "maintenance");

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "stationId": "A",
                "action": "lock slot",
                "moduleId": 1,
                "slotId": 3,
                "reason": "maintenance"
            })
        );
    }

    #[test]
    fn payload_omits_absent_addressing() {
        let value = serde_json::to_value(CommandPayload::new("B", "disable")).unwrap();
        assert_eq!(value, json!({ "stationId": "B", "action": "disable" }));
    }

    #[test]
    fn inbound_accepts_short_aliases_and_numeric_strings() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "action": "lock slot",
            "status": "locked",
            "station": "A",
            "module": "1",
            "slot": 3
        }))
        .unwrap();

        assert_eq!(msg.affected_station.as_deref(), Some("A"));
        assert_eq!(msg.affected_module, Some(1));
        assert_eq!(msg.affected_slot, Some(3));
        assert!(msg.extra.is_empty());
    }

    #[test]
    fn inbound_keeps_unknown_fields() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "action": "ngrok connect",
            "statusText": "Tunnel up",
            "affectedStation": 42,
            "url": "https://abc.ngrok.io"
        }))
        .unwrap();

        assert_eq!(msg.affected_station.as_deref(), Some("42"));
        assert_eq!(msg.status_or_text(), Some("Tunnel up"));
        assert_eq!(msg.extra_str("url").as_deref(), Some("https://abc.ngrok.io"));
    }

    #[test]
    fn inbound_without_action_is_rejected() {
        let result = serde_json::from_value::<InboundMessage>(json!({ "status": "ok" }));
        assert!(result.is_err());
    }

    #[test]
    fn station_document_tolerates_missing_fields() {
        let doc: StationDocument = serde_json::from_value(json!({
            "modules": [{ "id": 1, "slots": [{ "position": 1, "serial": 0 }] }]
        }))
        .unwrap();

        assert!(doc.id.is_none());
        assert_eq!(doc.modules[0].slots[0].serial.as_deref(), Some("0"));
        assert!(doc.disabled.is_none());
    }

    #[test]
    fn slot_ref_accepts_long_names() {
        let slot: SlotRef = serde_json::from_value(json!({ "moduleId": 2, "slotId": "4" })).unwrap();
        assert_eq!(slot, SlotRef { module: 2, slot: 4 });
    }
}
