//! Station-level command handlers.

use serde_json::{Map, Value};

use fleetsync_core::{Command, Fleet, SlotSelection, StationId, TunnelKind, UpdateTarget};

use crate::cli::{
    EjectScope, GlobalOpts, StationArgs, StationCommand, Switch, TunnelAction, TunnelArg,
    UpdateArg,
};
use crate::error::CliError;
use crate::output;

use super::{stations, util};

/// Parse `KEY=VALUE` pairs. Values that parse as JSON keep their type,
/// everything else is a string.
fn parse_settings(pairs: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut settings = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(CliError::Validation {
                field: "settings".into(),
                reason: format!("expected KEY=VALUE, got '{pair}'"),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Validation {
                field: "settings".into(),
                reason: format!("empty key in '{pair}'"),
            });
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        settings.insert(key.to_owned(), value);
    }
    Ok(settings)
}

fn selection(module: Option<u32>, scope: Option<EjectScope>) -> Result<SlotSelection, CliError> {
    match (module, scope) {
        (Some(module), None) => Ok(SlotSelection::Module(module)),
        (None, Some(EjectScope::All)) => Ok(SlotSelection::Occupied),
        (None, Some(EjectScope::Full)) => Ok(SlotSelection::Full),
        (None, Some(EjectScope::Empty)) => Ok(SlotSelection::Empty),
        (None, Some(EjectScope::Locked)) => Ok(SlotSelection::Locked),
        _ => Err(CliError::Validation {
            field: "eject".into(),
            reason: "pass exactly one of --module or --scope".into(),
        }),
    }
}

/// Resolve a known station id, checking it against the current snapshot.
fn known(fleet: &Fleet, id: &str) -> Result<StationId, CliError> {
    Ok(util::find_station(fleet, id)?.id.clone())
}

pub async fn handle(fleet: &Fleet, args: StationArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = match args.command {
        StationCommand::Show { station } => return stations::show(fleet, &station, global).await,

        StationCommand::ClearPending { station } => {
            util::ready(fleet, global, false).await?;
            let id = known(fleet, &station)?;
            let cleared = fleet.clear_overlays(id).await?;
            output::print_output(
                &format!("Cleared {cleared} pending marker(s) on {station}"),
                global.quiet,
            );
            return Ok(());
        }

        // A station being provisioned is not in the snapshot yet.
        StationCommand::Provision { station } => {
            util::ready(fleet, global, true).await?;
            Command::Provision {
                station: StationId::from(station),
            }
        }

        other => {
            util::ready(fleet, global, true).await?;
            build(fleet, other)?
        }
    };

    util::run_command(fleet, command, global).await
}

fn build(fleet: &Fleet, cmd: StationCommand) -> Result<Command, CliError> {
    let command = match cmd {
        StationCommand::Enable { station } => Command::Enable {
            station: known(fleet, &station)?,
        },
        StationCommand::Disable { station } => Command::Disable {
            station: known(fleet, &station)?,
        },
        StationCommand::Eject {
            station,
            module,
            scope,
        } => Command::Eject {
            station: known(fleet, &station)?,
            selection: selection(module, scope)?,
        },
        StationCommand::Tunnel {
            station,
            kind,
            action,
        } => Command::Tunnel {
            station: known(fleet, &station)?,
            tunnel: match kind {
                TunnelArg::Ngrok => TunnelKind::Ngrok,
                TunnelArg::Ssh => TunnelKind::Ssh,
            },
            connect: action == TunnelAction::Connect,
        },
        StationCommand::Update { station, target } => Command::Update {
            station: known(fleet, &station)?,
            target: match target {
                UpdateArg::Flow => UpdateTarget::Flow,
                UpdateArg::Ui => UpdateTarget::Ui,
            },
        },
        StationCommand::Output {
            station,
            module,
            state,
        } => Command::SetModuleOutput {
            station: known(fleet, &station)?,
            module,
            output: state == Switch::On,
        },
        StationCommand::Set { station, settings } => Command::ChangeStation {
            station: known(fleet, &station)?,
            settings: parse_settings(&settings)?,
        },
        StationCommand::Show { .. }
        | StationCommand::ClearPending { .. }
        | StationCommand::Provision { .. } => {
            return Err(CliError::Internal("station command routed twice".into()));
        }
    };
    Ok(command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_keep_json_types_and_fall_back_to_strings() {
        let pairs = vec![
            "volume=7".to_owned(),
            "maintenance=true".to_owned(),
            "label=Lobby east".to_owned(),
        ];
        let settings = parse_settings(&pairs).unwrap();
        assert_eq!(settings["volume"], json!(7));
        assert_eq!(settings["maintenance"], json!(true));
        assert_eq!(settings["label"], json!("Lobby east"));
    }

    #[test]
    fn settings_without_equals_are_rejected() {
        let err = parse_settings(&["volume".to_owned()]).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn scope_maps_to_selection() {
        assert_eq!(selection(Some(2), None).unwrap(), SlotSelection::Module(2));
        assert_eq!(
            selection(None, Some(EjectScope::All)).unwrap(),
            SlotSelection::Occupied
        );
        assert!(selection(None, None).is_err());
    }
}
