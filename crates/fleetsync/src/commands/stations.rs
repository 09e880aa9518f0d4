//! Station listing and detail views.

use std::sync::Arc;

use tabled::Tabled;

use fleetsync_core::{Fleet, OverlayMarker, Station};

use crate::cli::{GlobalOpts, StationsArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct StationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Slots")]
    slots: String,
    #[tabled(rename = "Full")]
    full: usize,
    #[tabled(rename = "Tunnels")]
    tunnels: String,
    #[tabled(rename = "Flow")]
    flow: String,
    #[tabled(rename = "UI")]
    ui: String,
}

impl From<&Arc<Station>> for StationRow {
    fn from(s: &Arc<Station>) -> Self {
        Self {
            id: s.id.to_string(),
            state: state_label(s).into(),
            slots: format!("{}/{}", s.occupied_count(), s.slot_count()),
            full: s.slots().filter(|(_, slot)| slot.is_full()).count(),
            tunnels: tunnels_label(s),
            flow: s.flow_version.clone().unwrap_or_default(),
            ui: s.ui_version.clone().unwrap_or_default(),
        }
    }
}

fn state_label(s: &Station) -> &'static str {
    if s.disabled { "disabled" } else { "enabled" }
}

fn tunnels_label(s: &Station) -> String {
    let mut open = Vec::new();
    if s.ngrok_connected {
        open.push("ngrok");
    }
    if s.ssh_connected {
        open.push("ssh");
    }
    if open.is_empty() {
        "-".into()
    } else {
        open.join(",")
    }
}

/// Multi-line detail view, with pending markers inline.
fn detail(s: &Arc<Station>, pending: &[Arc<OverlayMarker>]) -> String {
    let mut lines = vec![
        format!("ID:       {}", s.id),
        format!("State:    {}", state_label(s)),
        format!("Tunnels:  {}", tunnels_label(s)),
        format!("Flow:     {}", s.flow_version.as_deref().unwrap_or("-")),
        format!("UI:       {}", s.ui_version.as_deref().unwrap_or("-")),
        format!(
            "Updated:  {}",
            s.last_update
                .map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        ),
    ];
    for module in &s.modules {
        lines.push(format!(
            "Module {} (output {})",
            module.id,
            if module.output { "on" } else { "off" }
        ));
        for slot in &module.slots {
            let marker = pending
                .iter()
                .find(|m| m.module == module.id && m.slot == slot.position)
                .map(|m| format!("  [pending {}]", kind_label(m)))
                .unwrap_or_default();
            let occupant = slot.serial.as_deref().unwrap_or("empty");
            let battery = slot.battery.map_or_else(|| "-".into(), |b| format!("{b}%"));
            let lock = match slot.locked {
                Some(true) => match slot.lock_reason {
                    Some(ref reason) => format!("locked ({reason})"),
                    None => "locked".into(),
                },
                Some(false) => "unlocked".into(),
                None => "-".into(),
            };
            lines.push(format!(
                "  {:>2}  {occupant:<12} {battery:>5}  {lock}{marker}",
                slot.position
            ));
        }
    }
    lines.join("\n")
}

fn kind_label(m: &OverlayMarker) -> &'static str {
    match m.kind {
        fleetsync_core::OverlayKind::Pending => "confirmation",
        fleetsync_core::OverlayKind::Ejecting => "eject",
        fleetsync_core::OverlayKind::Locking { locked: true } => "lock",
        fleetsync_core::OverlayKind::Locking { locked: false } => "unlock",
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(fleet: &Fleet, args: StationsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    util::ready(fleet, global, false).await?;
    let snap: Vec<Arc<Station>> = fleet
        .stations()
        .iter()
        .filter(|s| !args.disabled || s.disabled)
        .cloned()
        .collect();
    let out = output::render_list(global.output, &snap, |s| StationRow::from(s), |s| s.id.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn show(fleet: &Fleet, station: &str, global: &GlobalOpts) -> Result<(), CliError> {
    util::ready(fleet, global, false).await?;
    let found = util::find_station(fleet, station)?;
    let pending: Vec<Arc<OverlayMarker>> = fleet
        .subscribe_overlays()
        .latest()
        .iter()
        .filter(|m| m.station == found.id)
        .cloned()
        .collect();
    let out = output::render_single(
        global.output,
        &found,
        |s| detail(s, &pending),
        |s| s.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
