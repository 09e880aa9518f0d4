//! Single-slot command handlers.

use fleetsync_core::{Command, Fleet, SlotRef, SlotSelection, StationId};

use crate::cli::{GlobalOpts, SlotAddress, SlotArgs, SlotCommand};
use crate::error::CliError;

use super::util;

fn resolve(fleet: &Fleet, at: &SlotAddress) -> Result<(StationId, SlotRef), CliError> {
    let station = util::find_station(fleet, &at.station)?;
    let slot = SlotRef {
        module: at.module,
        slot: at.slot,
    };
    if station.slot(slot).is_none() {
        return Err(CliError::NotFound {
            resource_type: "slot".into(),
            identifier: format!("{}/{}/{}", at.station, at.module, at.slot),
            list_command: format!("station show {}", at.station),
        });
    }
    Ok((station.id.clone(), slot))
}

pub async fn handle(fleet: &Fleet, args: SlotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    util::ready(fleet, global, true).await?;

    let command = match args.command {
        SlotCommand::Lock { at, reason } => {
            let (station, slot) = resolve(fleet, &at)?;
            Command::LockSlot {
                station,
                slot,
                reason,
            }
        }
        SlotCommand::Unlock { at } => {
            let (station, slot) = resolve(fleet, &at)?;
            Command::UnlockSlot { station, slot }
        }
        SlotCommand::Eject { at } => {
            let (station, slot) = resolve(fleet, &at)?;
            Command::Eject {
                station,
                selection: SlotSelection::Slot(slot),
            }
        }
    };

    util::run_command(fleet, command, global).await
}
