//! Shared helpers for command handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use fleetsync_core::{Command, Fleet, Notice, NoticeLevel, Station, StationId};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub fn timeout(global: &GlobalOpts) -> Duration {
    Duration::from_secs(global.timeout)
}

/// Wait until the fleet is usable: the first station snapshot, and the
/// command channel too when `channel` is set.
pub async fn ready(fleet: &Fleet, global: &GlobalOpts, channel: bool) -> Result<(), CliError> {
    if channel {
        fleet.wait_connected(timeout(global)).await?;
    }
    fleet.wait_for_stations(timeout(global)).await?;
    Ok(())
}

/// Look a station up in the current snapshot.
pub fn find_station(fleet: &Fleet, id: &str) -> Result<Arc<Station>, CliError> {
    fleet
        .station(&StationId::from(id))
        .ok_or_else(|| CliError::NotFound {
            resource_type: "station".into(),
            identifier: id.into(),
            list_command: "stations".into(),
        })
}

/// Whether `notice` is the final word on `command`.
fn concludes(notice: &Notice, tag: &str, station: &StationId, match_station: bool) -> bool {
    if !notice.is_terminal() || notice.action.as_deref() != Some(tag) {
        return false;
    }
    !match_station || notice.station.as_ref().is_none_or(|s| s == station)
}

/// Submit `command` and wait for its success or error confirmation.
///
/// Pending notices for the command are echoed unless `--quiet`.
pub async fn submit_and_wait(
    fleet: &Fleet,
    command: Command,
    global: &GlobalOpts,
) -> Result<Notice, CliError> {
    let tag = command.action().as_tag();
    let station = command.station().clone();
    // The backend names a provisioned station itself.
    let match_station = !matches!(command, Command::Provision { .. });

    let mut notices = fleet.notices();
    fleet.submit(command).await?;

    let wait = timeout(global);
    let deadline = Instant::now() + wait;
    let color = output::should_color(global.color);
    loop {
        let notice = match tokio::time::timeout_at(deadline, notices.recv()).await {
            Err(_) => {
                return Err(CliError::Timeout {
                    what: format!("'{tag}' confirmation"),
                    seconds: wait.as_secs(),
                });
            }
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "notice stream lagged");
                continue;
            }
            Ok(Err(RecvError::Closed)) => {
                return Err(CliError::Internal("fleet engine stopped".into()));
            }
            Ok(Ok(notice)) => notice,
        };

        if notice.level == NoticeLevel::Pending && notice.action.as_deref() == Some(tag.as_str()) {
            if !global.quiet {
                eprintln!("{}", output::notice_line(&notice, color));
            }
            continue;
        }
        if !concludes(&notice, &tag, &station, match_station) {
            tracing::debug!(message = %notice.message, "unrelated notice");
            continue;
        }
        return match notice.level {
            NoticeLevel::Error => Err(CliError::Rejected {
                action: tag,
                message: notice.message,
            }),
            _ => Ok(notice),
        };
    }
}

/// Submit, wait, then print the confirming notice.
pub async fn run_command(fleet: &Fleet, command: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let notice = submit_and_wait(fleet, command, global).await?;
    let out = output::render_single(
        global.output,
        &notice,
        |n| output::notice_line(n, output::should_color(global.color)),
        |n| n.message.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
