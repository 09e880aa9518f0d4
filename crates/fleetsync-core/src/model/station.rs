// ── Station domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::StationId;

pub use fleetsync_api::SlotRef;

/// Battery level at or above which an occupied slot counts as "full".
pub const FULL_BATTERY_LEVEL: u8 = 100;

/// Remote-access tunnel flavours a station can expose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    Ngrok,
    Ssh,
}

/// One charging slot inside a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Slot {
    pub position: u32,
    /// Occupant serial. `None` means the slot is empty.
    pub serial: Option<String>,
    /// Battery level, 0-100.
    pub battery: Option<u8>,
    pub charging_current: Option<f64>,
    /// `None` until the kiosk has reported a lock state.
    pub locked: Option<bool>,
    pub lock_reason: Option<String>,
    pub status_code: Option<i64>,
}

impl Slot {
    pub fn is_occupied(&self) -> bool {
        self.serial.is_some()
    }

    pub fn is_full(&self) -> bool {
        self.is_occupied() && self.battery.is_some_and(|b| b >= FULL_BATTERY_LEVEL)
    }

    pub fn is_locked(&self) -> bool {
        self.locked == Some(true)
    }

    /// Forget the occupant after an ejection.
    pub fn clear_occupant(&mut self) {
        self.serial = None;
        self.battery = None;
        self.charging_current = None;
    }
}

/// A module: a row of slots sharing one output line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub id: u32,
    pub output: bool,
    pub slots: Vec<Slot>,
}

impl Module {
    pub fn slot(&self, position: u32) -> Option<&Slot> {
        self.slots.iter().find(|s| s.position == position)
    }

    pub fn slot_mut(&mut self, position: u32) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.position == position)
    }
}

/// The canonical Station type, as rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub modules: Vec<Module>,
    pub ngrok_connected: bool,
    pub ssh_connected: bool,
    pub disabled: bool,
    pub flow_version: Option<String>,
    pub ui_version: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Station {
    /// An empty, enabled station with no modules.
    pub fn new(id: impl Into<StationId>) -> Self {
        Self {
            id: id.into(),
            modules: Vec::new(),
            ngrok_connected: false,
            ssh_connected: false,
            disabled: false,
            flow_version: None,
            ui_version: None,
            last_update: None,
        }
    }

    pub fn module(&self, id: u32) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn module_mut(&mut self, id: u32) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id == id)
    }

    pub fn slot(&self, at: SlotRef) -> Option<&Slot> {
        self.module(at.module)?.slot(at.slot)
    }

    pub fn slot_mut(&mut self, at: SlotRef) -> Option<&mut Slot> {
        self.module_mut(at.module)?.slot_mut(at.slot)
    }

    /// Every slot with its address, in module then position order.
    pub fn slots(&self) -> impl Iterator<Item = (SlotRef, &Slot)> {
        self.modules.iter().flat_map(|m| {
            m.slots.iter().map(move |s| {
                (
                    SlotRef {
                        module: m.id,
                        slot: s.position,
                    },
                    s,
                )
            })
        })
    }

    pub fn tunnel_connected(&self, tunnel: TunnelKind) -> bool {
        match tunnel {
            TunnelKind::Ngrok => self.ngrok_connected,
            TunnelKind::Ssh => self.ssh_connected,
        }
    }

    pub fn set_tunnel(&mut self, tunnel: TunnelKind, connected: bool) {
        match tunnel {
            TunnelKind::Ngrok => self.ngrok_connected = connected,
            TunnelKind::Ssh => self.ssh_connected = connected,
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.slots().filter(|(_, s)| s.is_occupied()).count()
    }

    pub fn slot_count(&self) -> usize {
        self.modules.iter().map(|m| m.slots.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(position: u32, serial: Option<&str>, battery: Option<u8>) -> Slot {
        Slot {
            position,
            serial: serial.map(str::to_owned),
            battery,
            ..Slot::default()
        }
    }

    #[test]
    fn full_requires_occupant_and_charge() {
        assert!(slot(1, Some("PB-1"), Some(100)).is_full());
        assert!(!slot(1, Some("PB-1"), Some(99)).is_full());
        assert!(!slot(1, None, Some(100)).is_full());
    }

    #[test]
    fn clear_occupant_keeps_lock_state() {
        let mut s = slot(1, Some("PB-1"), Some(80));
        s.locked = Some(true);
        s.clear_occupant();
        assert!(!s.is_occupied());
        assert!(s.battery.is_none());
        assert!(s.is_locked());
    }

    #[test]
    fn slots_iterates_with_addresses() {
        let mut station = Station::new("A");
        station.modules = vec![
            Module {
                id: 1,
                output: true,
                slots: vec![slot(1, None, None), slot(2, Some("PB-2"), Some(40))],
            },
            Module {
                id: 2,
                output: true,
                slots: vec![slot(1, Some("PB-3"), Some(100))],
            },
        ];

        let addrs: Vec<SlotRef> = station.slots().map(|(at, _)| at).collect();
        assert_eq!(
            addrs,
            vec![
                SlotRef { module: 1, slot: 1 },
                SlotRef { module: 1, slot: 2 },
                SlotRef { module: 2, slot: 1 },
            ]
        );
        assert_eq!(station.occupied_count(), 2);
        assert_eq!(station.slot_count(), 3);
        assert!(station.slot(SlotRef { module: 2, slot: 1 }).is_some_and(Slot::is_full));
    }

    #[test]
    fn tunnel_flags_are_independent() {
        let mut station = Station::new("A");
        station.set_tunnel(TunnelKind::Ssh, true);
        assert!(station.tunnel_connected(TunnelKind::Ssh));
        assert!(!station.tunnel_connected(TunnelKind::Ngrok));
        assert_eq!(TunnelKind::Ngrok.to_string(), "ngrok");
    }
}
