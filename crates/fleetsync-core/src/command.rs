// ── Command API ──
//
// Every operator action is a typed `Command`. The reconciler turns it into
// a wire payload, sends it, then tracks its effects through overlays and
// suppression. Commands are not retained after send.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use fleetsync_api::CommandPayload;

use crate::error::CoreError;
use crate::model::{EntityKey, RentalId, SlotRef, Station, StationId, TunnelKind};

// ── Action tags ──────────────────────────────────────────────────────

/// Which version string an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum UpdateTarget {
    Flow,
    Ui,
}

/// The closed catalogue of action tags shared by commands and confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    LockSlot,
    UnlockSlot,
    EjectSlot,
    EjectModule,
    EjectAll,
    EjectFull,
    EjectEmpty,
    EjectLocked,
    Enable,
    Disable,
    Tunnel { tunnel: TunnelKind, connect: bool },
    Provision,
    Refund,
    Update(UpdateTarget),
    /// Generic `"<scope> change"`: the confirmation embeds a full snapshot.
    Change(String),
}

impl Action {
    pub fn as_tag(&self) -> String {
        match self {
            Self::LockSlot => "lock slot".into(),
            Self::UnlockSlot => "unlock slot".into(),
            Self::EjectSlot => "eject slot".into(),
            Self::EjectModule => "eject module".into(),
            Self::EjectAll => "eject all".into(),
            Self::EjectFull => "eject full".into(),
            Self::EjectEmpty => "eject empty".into(),
            Self::EjectLocked => "eject locked".into(),
            Self::Enable => "enable".into(),
            Self::Disable => "disable".into(),
            Self::Tunnel { tunnel, connect } => {
                format!("{tunnel} {}", if *connect { "connect" } else { "disconnect" })
            }
            Self::Provision => "provision".into(),
            Self::Refund => "refund".into(),
            Self::Update(target) => format!("update {target}"),
            Self::Change(scope) => format!("{scope} change"),
        }
    }

    pub fn is_lock(&self) -> bool {
        matches!(self, Self::LockSlot | Self::UnlockSlot)
    }

    pub fn is_eject(&self) -> bool {
        matches!(
            self,
            Self::EjectSlot
                | Self::EjectModule
                | Self::EjectAll
                | Self::EjectFull
                | Self::EjectEmpty
                | Self::EjectLocked
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_tag())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let tag = raw.trim().to_ascii_lowercase();
        let action = match tag.as_str() {
            "lock slot" => Self::LockSlot,
            "unlock slot" => Self::UnlockSlot,
            "eject slot" => Self::EjectSlot,
            "eject module" => Self::EjectModule,
            "eject all" => Self::EjectAll,
            "eject full" => Self::EjectFull,
            "eject empty" => Self::EjectEmpty,
            "eject locked" => Self::EjectLocked,
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            "provision" => Self::Provision,
            "refund" => Self::Refund,
            "update flow" => Self::Update(UpdateTarget::Flow),
            "update ui" => Self::Update(UpdateTarget::Ui),
            other => {
                if let Some((name, verb)) = other.split_once(' ') {
                    if let Ok(tunnel) = name.parse::<TunnelKind>() {
                        match verb {
                            "connect" => return Ok(Self::Tunnel { tunnel, connect: true }),
                            "disconnect" => return Ok(Self::Tunnel { tunnel, connect: false }),
                            _ => {}
                        }
                    }
                }
                match other.strip_suffix("change").map(str::trim_end) {
                    Some(scope) if !scope.is_empty() => Self::Change(scope.to_owned()),
                    _ => {
                        return Err(CoreError::InvalidResponse {
                            message: format!("unknown action '{raw}'"),
                        });
                    }
                }
            }
        };
        Ok(action)
    }
}

// ── Slot selection ───────────────────────────────────────────────────

/// Which slots an eject targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSelection {
    Slot(SlotRef),
    Module(u32),
    /// Every occupied slot.
    Occupied,
    /// Every occupied slot at full charge.
    Full,
    Empty,
    Locked,
}

impl SlotSelection {
    /// Scan `station` for the slots this selection covers.
    pub fn resolve(self, station: &Station) -> Vec<SlotRef> {
        station
            .slots()
            .filter(|(at, slot)| match self {
                Self::Slot(target) => *at == target,
                Self::Module(module) => at.module == module,
                Self::Occupied => slot.is_occupied(),
                Self::Full => slot.is_full(),
                Self::Empty => !slot.is_occupied(),
                Self::Locked => slot.is_locked(),
            })
            .map(|(at, _)| at)
            .collect()
    }

    pub fn action(self) -> Action {
        match self {
            Self::Slot(_) => Action::EjectSlot,
            Self::Module(_) => Action::EjectModule,
            Self::Occupied => Action::EjectAll,
            Self::Full => Action::EjectFull,
            Self::Empty => Action::EjectEmpty,
            Self::Locked => Action::EjectLocked,
        }
    }

    /// The selection an eject action implies, when it needs no address.
    pub fn for_action(action: &Action) -> Option<Self> {
        match action {
            Action::EjectAll => Some(Self::Occupied),
            Action::EjectFull => Some(Self::Full),
            Action::EjectEmpty => Some(Self::Empty),
            Action::EjectLocked => Some(Self::Locked),
            _ => None,
        }
    }
}

// ── Command ──────────────────────────────────────────────────────────

/// All operator-issued mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LockSlot {
        station: StationId,
        slot: SlotRef,
        reason: Option<String>,
    },
    UnlockSlot {
        station: StationId,
        slot: SlotRef,
    },
    Eject {
        station: StationId,
        selection: SlotSelection,
    },
    Enable {
        station: StationId,
    },
    Disable {
        station: StationId,
    },
    Tunnel {
        station: StationId,
        tunnel: TunnelKind,
        connect: bool,
    },
    Provision {
        station: StationId,
    },
    Refund {
        station: StationId,
        rental: RentalId,
        /// Minor units. `None` refunds the full amount.
        amount: Option<i64>,
    },
    Update {
        station: StationId,
        target: UpdateTarget,
    },
    SetModuleOutput {
        station: StationId,
        module: u32,
        output: bool,
    },
    /// Free-form settings patch for a station, confirmed by `"station change"`.
    ChangeStation {
        station: StationId,
        settings: Map<String, Value>,
    },
}

/// Payload fields a settings patch may not overwrite.
const RESERVED_PAYLOAD_KEYS: &[&str] = &["stationId", "action", "moduleId", "slotId"];

impl Command {
    pub fn station(&self) -> &StationId {
        match self {
            Self::LockSlot { station, .. }
            | Self::UnlockSlot { station, .. }
            | Self::Eject { station, .. }
            | Self::Enable { station }
            | Self::Disable { station }
            | Self::Tunnel { station, .. }
            | Self::Provision { station }
            | Self::Refund { station, .. }
            | Self::Update { station, .. }
            | Self::SetModuleOutput { station, .. }
            | Self::ChangeStation { station, .. } => station,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::LockSlot { .. } => Action::LockSlot,
            Self::UnlockSlot { .. } => Action::UnlockSlot,
            Self::Eject { selection, .. } => selection.action(),
            Self::Enable { .. } => Action::Enable,
            Self::Disable { .. } => Action::Disable,
            Self::Tunnel {
                tunnel, connect, ..
            } => Action::Tunnel {
                tunnel: *tunnel,
                connect: *connect,
            },
            Self::Provision { .. } => Action::Provision,
            Self::Refund { .. } => Action::Refund,
            Self::Update { target, .. } => Action::Update(*target),
            Self::SetModuleOutput { .. } => Action::Change("module".into()),
            Self::ChangeStation { .. } => Action::Change("station".into()),
        }
    }

    /// The entity whose snapshots must be held back while this is in flight.
    pub fn entity_key(&self) -> EntityKey {
        match self {
            Self::Refund { rental, .. } => EntityKey::from(rental),
            other => EntityKey::from(other.station()),
        }
    }

    /// Cheap structural checks that need no store access.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.station().as_str().trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "station id must not be empty".into(),
            });
        }
        match self {
            Self::Refund { rental, amount, .. } => {
                if rental.as_str().trim().is_empty() {
                    return Err(CoreError::ValidationFailed {
                        message: "rental id must not be empty".into(),
                    });
                }
                if amount.is_some_and(|a| a <= 0) {
                    return Err(CoreError::ValidationFailed {
                        message: "refund amount must be positive".into(),
                    });
                }
            }
            Self::ChangeStation { settings, .. } if settings.is_empty() => {
                return Err(CoreError::ValidationFailed {
                    message: "station change needs at least one setting".into(),
                });
            }
            Self::ChangeStation { settings, .. } => {
                let reserved = settings
                    .keys()
                    .find(|k| RESERVED_PAYLOAD_KEYS.contains(&k.as_str()));
                if let Some(key) = reserved {
                    return Err(CoreError::ValidationFailed {
                        message: format!("setting '{key}' is reserved by the command payload"),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Build the wire payload.
    pub fn payload(&self) -> CommandPayload {
        let base = CommandPayload::new(self.station().as_str(), self.action().as_tag());
        match self {
            Self::LockSlot { slot, reason, .. } => {
                let payload = base.with_slot(slot.module, slot.slot);
                match reason {
                    Some(reason) => payload.with_field("reason", reason.as_str()),
                    None => payload,
                }
            }
            Self::UnlockSlot { slot, .. } => base.with_slot(slot.module, slot.slot),
            Self::Eject { selection, .. } => match selection {
                SlotSelection::Slot(at) => base.with_slot(at.module, at.slot),
                SlotSelection::Module(module) => base.with_module(*module),
                _ => base,
            },
            Self::Refund { rental, amount, .. } => {
                let payload = base.with_field("rentalId", rental.as_str());
                match amount {
                    Some(amount) => payload.with_field("amount", *amount),
                    None => payload,
                }
            }
            Self::SetModuleOutput { module, output, .. } => {
                base.with_module(*module).with_field("output", *output)
            }
            Self::ChangeStation { settings, .. } => {
                let mut payload = base;
                payload.extra.extend(settings.clone());
                payload
            }
            Self::Enable { .. }
            | Self::Disable { .. }
            | Self::Tunnel { .. }
            | Self::Provision { .. }
            | Self::Update { .. } => base,
        }
    }
}
