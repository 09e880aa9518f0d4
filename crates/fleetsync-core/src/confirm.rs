// ── Confirmation dispatch table ──
//
// Turns a loosely-typed `InboundMessage` into a closed set of typed
// confirmations, one variant per action family, each carrying only the
// fields that action uses. Missing or malformed fields are an
// `InvalidResponse`, never a silent partial patch.

use serde_json::Value;

use fleetsync_api::InboundMessage;

use crate::command::{Action, SlotSelection, UpdateTarget};
use crate::convert::station_from_value;
use crate::error::CoreError;
use crate::model::{EntityKey, RentalId, SlotRef, Station, StationId, TunnelKind};

/// Verdict words, matched against whole words of the status. Multi-word
/// entries match consecutive words.
const ERROR_MARKERS: &[&str] = &[
    "error",
    "errored",
    "fail",
    "failed",
    "failure",
    "denied",
    "reject",
    "rejected",
    "invalid",
    "unauthorized",
    "unauthorised",
    "timeout",
    "timed out",
    "not found",
    "unable",
    "cannot",
];

const PENDING_MARKERS: &[&str] = &[
    "pending",
    "in progress",
    "progress",
    "queued",
    "sending",
    "waiting",
    "processing",
    "starting",
];

const SUCCESS_MARKERS: &[&str] = &[
    "ok",
    "success",
    "successful",
    "succeeded",
    "done",
    "complete",
    "completed",
    "ready",
    "connected",
    "disconnected",
    "locked",
    "unlocked",
    "ejected",
    "enabled",
    "disabled",
    "provisioned",
    "refunded",
    "updated",
];

/// How the server judged the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
    Pending,
}

impl Outcome {
    /// Classify a status string. The earliest verdict word decides; a
    /// status with none, or no status at all, means success.
    pub fn classify(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return Self::Success;
        };
        let lowered = status.to_ascii_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for at in 0..words.len() {
            let rest = words.get(at..).unwrap_or_default();
            if ERROR_MARKERS.iter().any(|m| starts_with_phrase(rest, m)) {
                return Self::Error;
            }
            if PENDING_MARKERS.iter().any(|m| starts_with_phrase(rest, m)) {
                return Self::Pending;
            }
            if SUCCESS_MARKERS.iter().any(|m| starts_with_phrase(rest, m)) {
                return Self::Success;
            }
        }
        Self::Success
    }
}

fn starts_with_phrase(words: &[&str], phrase: &str) -> bool {
    let mut words = words.iter();
    phrase
        .split(' ')
        .all(|part| words.next().is_some_and(|w| *w == part))
}

/// Slots an eject confirmation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EjectTarget {
    /// Explicit addresses from the message.
    Slots(Vec<SlotRef>),
    /// Re-resolved against the store when applied.
    Selection(SlotSelection),
}

/// A successful, fully-decoded confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    SlotLock {
        station: StationId,
        slot: SlotRef,
        locked: bool,
        reason: Option<String>,
    },
    Ejected {
        station: StationId,
        target: EjectTarget,
    },
    StationEnabled {
        station: StationId,
        enabled: bool,
    },
    Tunnel {
        station: StationId,
        tunnel: TunnelKind,
        connected: bool,
        info: Option<Value>,
    },
    Provisioned {
        station: StationId,
    },
    Refunded {
        station: Option<StationId>,
        rental: RentalId,
        status: String,
        amount: Option<i64>,
    },
    VersionUpdated {
        station: StationId,
        target: UpdateTarget,
        version: Option<String>,
    },
    /// A generic `*change`: full replace from the embedded snapshot.
    Replaced { station: Box<Station> },
}

impl Confirmation {
    pub fn station(&self) -> Option<&StationId> {
        match self {
            Self::SlotLock { station, .. }
            | Self::Ejected { station, .. }
            | Self::StationEnabled { station, .. }
            | Self::Tunnel { station, .. }
            | Self::Provisioned { station }
            | Self::VersionUpdated { station, .. } => Some(station),
            Self::Refunded { station, .. } => station.as_ref(),
            Self::Replaced { station } => Some(&station.id),
        }
    }

    /// The entity this confirmation patches, if any.
    pub fn entity_key(&self) -> Option<EntityKey> {
        match self {
            Self::Provisioned { .. } => None,
            Self::Refunded { rental, .. } => Some(EntityKey::from(rental)),
            other => other.station().map(EntityKey::from),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::SlotLock {
                station,
                slot,
                locked,
                ..
            } => format!(
                "Slot {}/{} on {station} {}",
                slot.module,
                slot.slot,
                if *locked { "locked" } else { "unlocked" }
            ),
            Self::Ejected { station, target } => match target {
                EjectTarget::Slots(slots) => format!("Ejected {} slot(s) on {station}", slots.len()),
                EjectTarget::Selection(selection) => {
                    format!("{} confirmed on {station}", selection.action())
                }
            },
            Self::StationEnabled { station, enabled } => {
                format!("Station {station} {}", if *enabled { "enabled" } else { "disabled" })
            }
            Self::Tunnel {
                station,
                tunnel,
                connected,
                ..
            } => format!(
                "{tunnel} {} on {station}",
                if *connected { "connected" } else { "disconnected" }
            ),
            Self::Provisioned { station } => format!("Provisioned station {station}"),
            Self::Refunded { rental, status, .. } => format!("Rental {rental} {status}"),
            Self::VersionUpdated {
                station,
                target,
                version,
            } => match version {
                Some(v) => format!("{target} on {station} updated to {v}"),
                None => format!("{target} on {station} updated"),
            },
            Self::Replaced { station } => format!("Station {} updated", station.id),
        }
    }
}

/// Everything the reconciler needs from one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub action: Action,
    pub outcome: Outcome,
    pub station: Option<StationId>,
    pub slot: Option<SlotRef>,
    /// Present only for successful outcomes.
    pub confirmation: Option<Confirmation>,
    /// Server-provided human-readable text.
    pub text: Option<String>,
}

impl Dispatch {
    /// Text to show the operator.
    pub fn message(&self) -> String {
        if let Some(ref text) = self.text {
            return text.clone();
        }
        match (&self.confirmation, self.outcome) {
            (Some(c), _) => c.summary(),
            (None, Outcome::Error) => format!("{} failed", self.action),
            (None, _) => format!("{} in progress", self.action),
        }
    }
}

/// Decode an inbound message through the action table.
pub fn dispatch(msg: &InboundMessage) -> Result<Dispatch, CoreError> {
    let action: Action = msg.action.parse()?;
    let outcome = Outcome::classify(msg.status_or_text());
    let station = msg
        .affected_station
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(StationId::from);
    let slot = msg
        .affected_module
        .zip(msg.affected_slot)
        .map(|(module, slot)| SlotRef { module, slot });

    let confirmation = match outcome {
        Outcome::Success => Some(decode(&action, msg, station.clone(), slot)?),
        Outcome::Error | Outcome::Pending => None,
    };

    Ok(Dispatch {
        action,
        outcome,
        station,
        slot,
        confirmation,
        text: msg.status_text.clone().filter(|t| !t.trim().is_empty()),
    })
}

fn decode(
    action: &Action,
    msg: &InboundMessage,
    station: Option<StationId>,
    slot: Option<SlotRef>,
) -> Result<Confirmation, CoreError> {
    let confirmation = match action {
        Action::LockSlot | Action::UnlockSlot => {
            let status = msg.status.as_deref().map(str::to_ascii_lowercase);
            let locked = lock_flag(msg)
                .or(match status.as_deref() {
                    Some("locked") => Some(true),
                    Some("unlocked") => Some(false),
                    _ => None,
                })
                .unwrap_or(matches!(action, Action::LockSlot));
            let reason = if locked {
                msg.extra_str("reason").or_else(|| msg.extra_str("lockReason"))
            } else {
                None
            };
            Confirmation::SlotLock {
                station: require(station, action, "station")?,
                slot: require(slot, action, "module/slot")?,
                locked,
                reason,
            }
        }
        Action::EjectSlot
        | Action::EjectModule
        | Action::EjectAll
        | Action::EjectFull
        | Action::EjectEmpty
        | Action::EjectLocked => Confirmation::Ejected {
            station: require(station, action, "station")?,
            target: eject_target(action, msg, slot)?,
        },
        Action::Enable | Action::Disable => Confirmation::StationEnabled {
            station: require(station, action, "station")?,
            enabled: matches!(action, Action::Enable),
        },
        Action::Tunnel { tunnel, connect } => Confirmation::Tunnel {
            station: require(station, action, "station")?,
            tunnel: *tunnel,
            connected: *connect,
            info: (!msg.extra.is_empty()).then(|| Value::Object(msg.extra.clone())),
        },
        Action::Provision => {
            let id = msg
                .extra_str("newStationId")
                .or_else(|| msg.extra_str("stationId"))
                .map(StationId::from)
                .or(station);
            Confirmation::Provisioned {
                station: require(id, action, "stationId")?,
            }
        }
        Action::Refund => Confirmation::Refunded {
            station,
            rental: require(msg.extra_str("rentalId").map(RentalId::from), action, "rentalId")?,
            status: msg
                .extra_str("rentalStatus")
                .unwrap_or_else(|| "refunded".into()),
            amount: msg.extra_i64("amount"),
        },
        Action::Update(target) => Confirmation::VersionUpdated {
            station: require(station, action, "station")?,
            target: *target,
            version: msg.extra_str("version").or_else(|| {
                msg.status_text
                    .as_deref()
                    .and_then(version_in_text)
                    .or_else(|| msg.status.as_deref().and_then(version_in_text))
            }),
        },
        Action::Change(_) => {
            let embedded = msg
                .extra
                .get("snapshot")
                .or_else(|| msg.extra.get("stationData"))
                .filter(|v| v.is_object());
            let embedded = require(embedded, action, "snapshot")?;
            let fallback = station.as_ref().map(StationId::as_str);
            Confirmation::Replaced {
                station: Box::new(station_from_value(embedded, fallback)?),
            }
        }
    };
    Ok(confirmation)
}

fn require<T>(value: Option<T>, action: &Action, field: &str) -> Result<T, CoreError> {
    value.ok_or_else(|| CoreError::InvalidResponse {
        message: format!("'{action}' confirmation is missing {field}"),
    })
}

fn lock_flag(msg: &InboundMessage) -> Option<bool> {
    ["isLocked", "locked"]
        .iter()
        .find_map(|key| msg.extra.get(*key).and_then(Value::as_bool))
}

fn eject_target(
    action: &Action,
    msg: &InboundMessage,
    slot: Option<SlotRef>,
) -> Result<EjectTarget, CoreError> {
    if let Some(raw) = msg.extra.get("slots") {
        let slots: Vec<SlotRef> =
            serde_json::from_value(raw.clone()).map_err(|e| CoreError::InvalidResponse {
                message: format!("'{action}' confirmation has malformed slots: {e}"),
            })?;
        return Ok(EjectTarget::Slots(slots));
    }
    match action {
        Action::EjectSlot => Ok(EjectTarget::Slots(vec![require(slot, action, "module/slot")?])),
        Action::EjectModule => Ok(EjectTarget::Selection(SlotSelection::Module(require(
            msg.affected_module,
            action,
            "module",
        )?))),
        other => SlotSelection::for_action(other)
            .map(EjectTarget::Selection)
            .ok_or_else(|| CoreError::Internal(format!("'{other}' is not an eject action"))),
    }
}

/// Pull a dotted version out of text like `"Flow updated to v2.4.1."`.
fn version_in_text(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '"' | '\'')))
        .map(|token| token.trim_end_matches('.'))
        .map(|token| token.strip_prefix(['v', 'V']).unwrap_or(token))
        .find(|token| {
            token.contains('.')
                && token.starts_with(|c: char| c.is_ascii_digit())
                && token.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
        })
        .map(str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn msg(value: Value) -> InboundMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn outcome_classification() {
        assert_eq!(Outcome::classify(None), Outcome::Success);
        assert_eq!(Outcome::classify(Some("locked")), Outcome::Success);
        assert_eq!(Outcome::classify(Some("Command FAILED")), Outcome::Error);
        assert_eq!(Outcome::classify(Some("slot not found")), Outcome::Error);
        assert_eq!(Outcome::classify(Some("in progress")), Outcome::Pending);
    }

    #[test]
    fn outcome_matches_whole_words_only() {
        assert_eq!(
            Outcome::classify(Some("Restarting tunnel, url ready")),
            Outcome::Success
        );
        assert_eq!(
            Outcome::classify(Some("connected after failed attempt")),
            Outcome::Success
        );
        assert_eq!(
            Outcome::classify(Some("Connected (previous attempt failed)")),
            Outcome::Success
        );
        assert_eq!(Outcome::classify(Some("Starting tunnel")), Outcome::Pending);
        assert_eq!(
            Outcome::classify(Some("Unable to lock: slot disabled")),
            Outcome::Error
        );
        assert_eq!(Outcome::classify(Some("request timed out")), Outcome::Error);
    }

    #[test]
    fn structured_status_wins_over_status_text() {
        let d = dispatch(&msg(json!({
            "action": "ngrok connect", "status": "ok",
            "statusText": "Tunnel up after failed retry", "station": "A"
        })))
        .unwrap();
        assert_eq!(d.outcome, Outcome::Success);
        assert!(d.confirmation.is_some());
    }

    #[test]
    fn restarting_tunnel_text_is_a_success() {
        let d = dispatch(&msg(json!({
            "action": "ngrok connect", "statusText": "Restarting tunnel, url ready",
            "station": "A"
        })))
        .unwrap();
        assert_eq!(d.outcome, Outcome::Success);
        assert!(matches!(
            d.confirmation,
            Some(Confirmation::Tunnel { connected: true, .. })
        ));
    }

    #[test]
    fn lock_confirmation() {
        let d = dispatch(&msg(json!({
            "action": "lock slot", "status": "locked", "station": "A", "module": 1, "slot": 3,
            "reason": "damaged"
        })))
        .unwrap();

        assert_eq!(d.outcome, Outcome::Success);
        assert_eq!(
            d.confirmation,
            Some(Confirmation::SlotLock {
                station: "A".into(),
                slot: SlotRef { module: 1, slot: 3 },
                locked: true,
                reason: Some("damaged".into()),
            })
        );
        assert_eq!(d.message(), "Slot 1/3 on A locked");
    }

    #[test]
    fn unlock_status_overrides_action_default() {
        let d = dispatch(&msg(json!({
            "action": "unlock slot", "status": "unlocked", "station": "A", "module": 1, "slot": 3
        })))
        .unwrap();
        assert!(matches!(
            d.confirmation,
            Some(Confirmation::SlotLock { locked: false, reason: None, .. })
        ));
    }

    #[test]
    fn lock_without_slot_is_invalid() {
        let err = dispatch(&msg(json!({ "action": "lock slot", "station": "A" }))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidResponse { ref message } if message.contains("module/slot")));
    }

    #[test]
    fn error_outcome_skips_decoding() {
        let d = dispatch(&msg(json!({ "action": "lock slot", "status": "error", "station": "A" }))).unwrap();
        assert_eq!(d.outcome, Outcome::Error);
        assert!(d.confirmation.is_none());
        assert_eq!(d.station, Some(StationId::from("A")));
        assert_eq!(d.message(), "lock slot failed");
    }

    #[test]
    fn eject_targets() {
        let explicit = dispatch(&msg(json!({
            "action": "eject all", "station": "A",
            "slots": [{ "module": 1, "slot": 1 }, { "moduleId": 2, "slotId": 4 }]
        })))
        .unwrap();
        assert_eq!(
            explicit.confirmation,
            Some(Confirmation::Ejected {
                station: "A".into(),
                target: EjectTarget::Slots(vec![
                    SlotRef { module: 1, slot: 1 },
                    SlotRef { module: 2, slot: 4 },
                ]),
            })
        );

        let module = dispatch(&msg(json!({ "action": "eject module", "station": "A", "module": 2 }))).unwrap();
        assert!(matches!(
            module.confirmation,
            Some(Confirmation::Ejected { target: EjectTarget::Selection(SlotSelection::Module(2)), .. })
        ));

        let full = dispatch(&msg(json!({ "action": "eject full", "station": "A" }))).unwrap();
        assert!(matches!(
            full.confirmation,
            Some(Confirmation::Ejected { target: EjectTarget::Selection(SlotSelection::Full), .. })
        ));
    }

    #[test]
    fn tunnel_carries_companion_info() {
        let d = dispatch(&msg(json!({
            "action": "ngrok connect", "statusText": "Tunnel up", "station": "A",
            "url": "https://abc.ngrok.io"
        })))
        .unwrap();

        let Some(Confirmation::Tunnel { tunnel, connected, info, .. }) = d.confirmation.clone() else {
            panic!("expected tunnel confirmation");
        };
        assert_eq!(tunnel, TunnelKind::Ngrok);
        assert!(connected);
        assert_eq!(info, Some(json!({ "url": "https://abc.ngrok.io" })));
        assert_eq!(d.message(), "Tunnel up");
    }

    #[test]
    fn provision_prefers_new_station_id() {
        let d = dispatch(&msg(json!({ "action": "provision", "station": "tmp", "newStationId": 981 }))).unwrap();
        assert_eq!(
            d.confirmation,
            Some(Confirmation::Provisioned { station: "981".into() })
        );
        assert_eq!(d.confirmation.unwrap().entity_key(), None);
    }

    #[test]
    fn refund_requires_rental_id() {
        assert!(dispatch(&msg(json!({ "action": "refund", "station": "A" }))).is_err());

        let d = dispatch(&msg(json!({ "action": "refund", "rentalId": "R1", "amount": "300" }))).unwrap();
        assert_eq!(
            d.confirmation,
            Some(Confirmation::Refunded {
                station: None,
                rental: "R1".into(),
                status: "refunded".into(),
                amount: Some(300),
            })
        );
    }

    #[test]
    fn version_is_parsed_from_status_text() {
        let d = dispatch(&msg(json!({
            "action": "update flow", "statusText": "Flow updated to v2.4.1.", "station": "A"
        })))
        .unwrap();
        assert!(matches!(
            d.confirmation,
            Some(Confirmation::VersionUpdated { target: UpdateTarget::Flow, version: Some(ref v), .. }) if v == "2.4.1"
        ));

        assert_eq!(version_in_text("UI now at 10.0.3-beta"), Some("10.0.3-beta".into()));
        assert_eq!(version_in_text("done."), None);
    }

    #[test]
    fn change_replaces_from_embedded_snapshot() {
        let d = dispatch(&msg(json!({
            "action": "module change", "station": "A",
            "snapshot": { "disabled": true, "modules": [{ "id": 1, "output": false, "slots": [] }] }
        })))
        .unwrap();

        let Some(Confirmation::Replaced { station }) = d.confirmation else {
            panic!("expected replace");
        };
        assert_eq!(station.id, StationId::from("A"));
        assert!(station.disabled);
        assert!(!station.modules[0].output);
    }

    #[test]
    fn change_without_snapshot_is_invalid() {
        assert!(dispatch(&msg(json!({ "action": "station change", "station": "A" }))).is_err());
    }

    #[test]
    fn unknown_action_is_invalid() {
        assert!(dispatch(&msg(json!({ "action": "reboot" }))).is_err());
    }
}
