// ── Document-to-domain conversions ──
//
// Bridges raw `fleetsync_api` documents into canonical model types:
// empty-occupant sentinels collapse to `None`, batteries are clamped,
// modules and slots come out sorted, timestamps are parsed leniently.

use chrono::{DateTime, Utc};
use serde_json::Value;

use fleetsync_api::{Document, ModuleDocument, RentalDocument, SlotDocument, StationDocument};

use crate::error::CoreError;
use crate::model::{Module, Rental, RentalId, Slot, Station, StationId};

// ── Helpers ────────────────────────────────────────────────────────

/// `0`, `"0"`, `""` and absent all mean "no occupant".
fn occupant_serial(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty() && s != "0")
}

#[allow(clippy::as_conversions, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn battery_level(raw: Option<f64>) -> Option<u8> {
    raw.filter(|b| b.is_finite())
        .map(|b| b.clamp(0.0, 100.0).round() as u8)
}

/// RFC 3339 string, epoch milliseconds, or a `{ seconds, nanoseconds }` object.
pub(crate) fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => {
            let secs = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            DateTime::from_timestamp(secs, nanos)
        }
        _ => None,
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

// ── Slot / Module ──────────────────────────────────────────────────

fn slot_from_document(doc: SlotDocument, fallback_position: u32) -> Slot {
    Slot {
        position: doc.position.unwrap_or(fallback_position),
        serial: occupant_serial(doc.serial),
        battery: battery_level(doc.battery),
        charging_current: doc.charging_current.filter(|c| c.is_finite()),
        locked: doc.is_locked,
        lock_reason: non_empty(doc.lock_reason),
        status_code: doc.status,
    }
}

fn module_from_document(doc: ModuleDocument, fallback_id: u32) -> Module {
    let mut slots: Vec<Slot> = doc
        .slots
        .into_iter()
        .zip(1_u32..)
        .map(|(slot, n)| slot_from_document(slot, n))
        .collect();
    slots.sort_by_key(|s| s.position);

    Module {
        id: doc.id.unwrap_or(fallback_id),
        output: doc.output.unwrap_or(true),
        slots,
    }
}

// ── Station ────────────────────────────────────────────────────────

/// Normalize a decoded station document under a known id.
pub fn station_from_parts(id: StationId, doc: StationDocument) -> Station {
    let mut modules: Vec<Module> = doc
        .modules
        .into_iter()
        .zip(1_u32..)
        .map(|(module, n)| module_from_document(module, n))
        .collect();
    modules.sort_by_key(|m| m.id);

    Station {
        id,
        modules,
        ngrok_connected: doc.ngrok_connected.unwrap_or(false),
        ssh_connected: doc.ssh_connected.unwrap_or(false),
        disabled: doc.disabled.unwrap_or(false),
        flow_version: non_empty(doc.flow_version),
        ui_version: non_empty(doc.ui_version),
        last_update: doc.last_update.as_ref().and_then(parse_timestamp),
    }
}

/// Decode a station from raw JSON. The document's own id wins over
/// `fallback_id`; one of the two must be present.
pub fn station_from_value(value: &Value, fallback_id: Option<&str>) -> Result<Station, CoreError> {
    let doc: StationDocument =
        serde_json::from_value(value.clone()).map_err(|e| CoreError::InvalidResponse {
            message: format!("undecodable station document: {e}"),
        })?;
    let id = non_empty(doc.id.clone())
        .or_else(|| fallback_id.map(str::to_owned))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::InvalidResponse {
            message: "station document has no id".into(),
        })?;
    Ok(station_from_parts(StationId::from(id), doc))
}

/// Decode one document from the `stations` collection. The document key
/// is authoritative for the id.
pub fn station_from_document(doc: &Document) -> Result<Station, CoreError> {
    let mut station = station_from_value(&doc.data, Some(&doc.id))?;
    if !doc.id.is_empty() {
        station.id = StationId::from(doc.id.as_str());
    }
    Ok(station)
}

// ── Rental ─────────────────────────────────────────────────────────

pub fn rental_from_parts(id: RentalId, doc: RentalDocument) -> Rental {
    Rental {
        id,
        station_id: non_empty(doc.station_id).map(StationId::from),
        status: non_empty(doc.status).unwrap_or_else(|| "unknown".into()),
        amount: doc.amount,
        currency: non_empty(doc.currency),
        started_at: doc.started_at.as_ref().and_then(parse_timestamp),
    }
}

/// Decode one document from the `rentals` collection.
pub fn rental_from_document(doc: &Document) -> Result<Rental, CoreError> {
    let decoded: RentalDocument =
        serde_json::from_value(doc.data.clone()).map_err(|e| CoreError::InvalidResponse {
            message: format!("undecodable rental document: {e}"),
        })?;
    let id = Some(doc.id.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| non_empty(decoded.id.clone()))
        .ok_or_else(|| CoreError::InvalidResponse {
            message: "rental document has no id".into(),
        })?;
    Ok(rental_from_parts(RentalId::from(id), decoded))
}
