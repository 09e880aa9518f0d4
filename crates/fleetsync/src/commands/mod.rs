//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod rental;
pub mod slot;
pub mod station;
pub mod stations;
pub mod util;
pub mod watch;

use fleetsync_core::Fleet;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a fleet-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, fleet: &Fleet, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(fleet, args, global).await,
        Command::Stations(args) => stations::list(fleet, args, global).await,
        Command::Slot(args) => slot::handle(fleet, args, global).await,
        Command::Station(args) => station::handle(fleet, args, global).await,
        Command::Rental(args) => rental::handle(fleet, args, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions run without a fleet".into(),
        )),
    }
}
