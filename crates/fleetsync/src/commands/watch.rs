//! Live notice stream.

use tokio::sync::broadcast::error::RecvError;

use fleetsync_core::{ChannelState, Fleet};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

fn state_label(state: ChannelState) -> &'static str {
    match state {
        ChannelState::Disconnected => "disconnected",
        ChannelState::Connecting => "connecting",
        ChannelState::Connected => "connected",
    }
}

/// Print notices (and optionally station changes) until Ctrl-C.
pub async fn handle(fleet: &Fleet, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let structured = matches!(global.output, OutputFormat::Json | OutputFormat::JsonCompact);

    let mut notices = fleet.notices();
    let mut state = fleet.connection_state();
    let mut stations = fleet.subscribe_stations();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => break,

            received = notices.recv() => match received {
                Ok(notice) => {
                    let line = if structured {
                        output::render_json(&notice, true)?
                    } else {
                        output::notice_line(&notice, color)
                    };
                    output::print_output(&line, global.quiet);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "dropped notices");
                }
                Err(RecvError::Closed) => break,
            },

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = state_label(current), "command channel");
            }

            snapshot = stations.changed(), if args.stations => {
                let Some(snapshot) = snapshot else { break };
                let summary = format!("{} station(s) in view", snapshot.len());
                output::print_output(&summary, global.quiet || structured);
            }
        }
    }
    Ok(())
}
