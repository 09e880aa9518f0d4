// ── Reconciler ──
//
// The single writer of the Entity Store. Consumes full-collection
// snapshots, inbound confirmations, and locally-submitted commands, and
// decides through the suppression registry which of them may overwrite
// what. All methods take `&mut self` and run to completion: one call is
// one non-preemptive step.
//
// Merge rules:
// - snapshot for a suppressed entity: discarded, store value kept
// - snapshot otherwise: full replace with the normalized document
// - confirmation: targeted patch that bypasses suppression, then
//   `suppress(ttl)` and removal of the matching overlay
// - submission: overlays for every affected slot, then `suppress(ttl)`

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use fleetsync_api::{ChannelEvent, ChannelState, CommandSink, Document, InboundMessage};

use crate::clock::Clock;
use crate::command::{Command, SlotSelection};
use crate::confirm::{Confirmation, Dispatch, EjectTarget, Outcome, dispatch};
use crate::convert::{rental_from_document, station_from_document};
use crate::error::CoreError;
use crate::model::{EntityKey, Rental, RentalId, Station, StationId};
use crate::notice::Notice;
use crate::overlay::{OptimisticOverlay, OverlayKey, OverlayKind};
use crate::store::{Change, EntityStore};
use crate::suppression::{SuppressionRegistry, SuppressionTtls};

pub const NOTICE_CHANNEL_CAPACITY: usize = 256;

/// What one snapshot did to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotReport {
    /// Entities written (new or changed).
    pub updated: usize,
    /// Entities identical to the store, left alone.
    pub unchanged: usize,
    /// Entities held back by an open suppression window.
    pub suppressed: usize,
    /// Entities absent from the snapshot and dropped.
    pub removed: usize,
    /// Documents that failed to decode.
    pub skipped: usize,
}

pub struct Reconciler<S: CommandSink> {
    sink: S,
    store: Arc<EntityStore>,
    suppression: SuppressionRegistry,
    overlay: OptimisticOverlay,
    ttls: SuppressionTtls,
    notices: broadcast::Sender<Notice>,
    provisioned: Vec<StationId>,
    /// Collections whose listener last reported an error.
    degraded: HashSet<String>,
    channel_state: ChannelState,
}

impl<S: CommandSink> Reconciler<S> {
    pub fn new(
        sink: S,
        store: Arc<EntityStore>,
        clock: Arc<dyn Clock>,
        ttls: SuppressionTtls,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            sink,
            store,
            suppression: SuppressionRegistry::new(clock),
            overlay: OptimisticOverlay::new(),
            ttls,
            notices,
            provisioned: Vec::new(),
            degraded: HashSet::new(),
            channel_state: ChannelState::Disconnected,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn suppression(&self) -> &SuppressionRegistry {
        &self.suppression
    }

    pub fn overlay(&self) -> &OptimisticOverlay {
        &self.overlay
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn ttls(&self) -> SuppressionTtls {
        self.ttls
    }

    /// Station ids assigned by `provision` confirmations, oldest first.
    pub fn provisioned(&self) -> &[StationId] {
        &self.provisioned
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    // ── Command submission ───────────────────────────────────────────

    /// Validate, send, then record the command's expected effects.
    ///
    /// A failed send leaves the store, the overlay and the suppression
    /// registry untouched and only emits an error notice.
    pub fn submit(&mut self, command: &Command) -> Result<(), CoreError> {
        let action = command.action();
        let station = command.station().clone();

        if let Err(e) = self.check(command) {
            self.notify(
                Notice::error(e.to_string())
                    .with_action(action.as_tag())
                    .with_station(station),
            );
            return Err(e);
        }

        if let Err(e) = self.sink.send(&command.payload()) {
            warn!(station = %station, %action, error = %e, "command rejected by channel");
            self.notify(
                Notice::error(format!("Cannot send '{action}': command channel is not connected"))
                    .with_action(action.as_tag())
                    .with_station(station),
            );
            return Err(e.into());
        }

        let now = self.suppression.clock().now();
        match command {
            Command::LockSlot { slot, .. } => {
                self.overlay.insert(
                    OverlayKey::new(station.clone(), *slot),
                    OverlayKind::Locking { locked: true },
                    now,
                );
            }
            Command::UnlockSlot { slot, .. } => {
                self.overlay.insert(
                    OverlayKey::new(station.clone(), *slot),
                    OverlayKind::Locking { locked: false },
                    now,
                );
            }
            Command::Eject { selection, .. } => {
                if let Some(current) = self.store.station(&station) {
                    for at in selection.resolve(&current) {
                        let occupied = current.slot(at).is_some_and(crate::model::Slot::is_occupied);
                        let kind = if occupied {
                            OverlayKind::Ejecting
                        } else {
                            OverlayKind::Pending
                        };
                        self.overlay
                            .insert(OverlayKey::new(station.clone(), at), kind, now);
                    }
                }
            }
            Command::Enable { .. } | Command::Disable { .. } => {
                let disabled = matches!(command, Command::Disable { .. });
                self.patch_station(&station, |s| s.disabled = disabled);
            }
            Command::SetModuleOutput { module, output, .. } => {
                self.patch_station(&station, |s| {
                    if let Some(m) = s.module_mut(*module) {
                        m.output = *output;
                    }
                });
            }
            Command::Tunnel { .. }
            | Command::Provision { .. }
            | Command::Refund { .. }
            | Command::Update { .. }
            | Command::ChangeStation { .. } => {}
        }

        // A provisioned station does not exist yet; nothing to protect.
        if !matches!(command, Command::Provision { .. }) {
            let ttl = if action.is_lock() {
                self.ttls.lock_confirm
            } else {
                self.ttls.command
            };
            self.suppression.suppress(command.entity_key(), ttl);
        }

        self.publish_overlays();
        debug!(station = %station, %action, "command submitted");
        self.notify(
            Notice::pending(format!("'{action}' sent to {station}"))
                .with_action(action.as_tag())
                .with_station(station),
        );
        Ok(())
    }

    /// Checks that need the store: the addressed station, module and slot
    /// must exist.
    fn check(&self, command: &Command) -> Result<(), CoreError> {
        command.validate()?;
        if matches!(command, Command::Provision { .. } | Command::Refund { .. }) {
            return Ok(());
        }

        let id = command.station();
        let station = self
            .store
            .station(id)
            .ok_or_else(|| CoreError::StationNotFound {
                identifier: id.to_string(),
            })?;

        let slot = match command {
            Command::LockSlot { slot, .. }
            | Command::UnlockSlot { slot, .. }
            | Command::Eject {
                selection: SlotSelection::Slot(slot),
                ..
            } => Some(*slot),
            _ => None,
        };
        if let Some(at) = slot {
            if station.slot(at).is_none() {
                return Err(CoreError::SlotNotFound {
                    station: id.to_string(),
                    module: at.module,
                    slot: at.slot,
                });
            }
        }

        let module = match command {
            Command::Eject {
                selection: SlotSelection::Module(module),
                ..
            }
            | Command::SetModuleOutput { module, .. } => Some(*module),
            _ => None,
        };
        if let Some(module) = module {
            if station.module(module).is_none() {
                return Err(CoreError::ValidationFailed {
                    message: format!("module {module} not found on station {id}"),
                });
            }
        }
        Ok(())
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Merge a full `stations` collection snapshot.
    pub fn apply_station_snapshot(&mut self, docs: &[Document]) -> SnapshotReport {
        let mut report = SnapshotReport::default();
        let mut incoming: BTreeMap<String, Station> = BTreeMap::new();
        let mut undecodable: HashSet<String> = HashSet::new();

        for doc in docs {
            match station_from_document(doc) {
                Ok(station) => {
                    incoming.insert(station.id.as_str().to_owned(), station);
                }
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "skipping undecodable station document");
                    report.skipped += 1;
                    undecodable.insert(doc.id.clone());
                }
            }
        }

        let trusted: Vec<StationId> = incoming
            .keys()
            .filter(|id| !self.suppression.is_suppressed(StationId::from(id.as_str())))
            .map(|id| StationId::from(id.as_str()))
            .collect();

        let (changes, removed) = plan_changes(
            incoming,
            &undecodable,
            self.store.station_ids().into_iter().map(|id| id.as_str().to_owned()),
            |key| self.store.station(&StationId::from(key)),
            |key| self.suppression.is_suppressed(StationId::from(key)),
            &mut report,
        );
        self.store.apply_stations(changes);

        for id in &removed {
            self.overlay.clear_station(&StationId::from(id.as_str()));
        }
        for id in &trusted {
            self.sweep(id);
        }
        self.publish_overlays();
        self.store.mark_station_snapshot(Utc::now());
        self.mark_healthy("stations");

        debug!(
            updated = report.updated,
            unchanged = report.unchanged,
            suppressed = report.suppressed,
            removed = report.removed,
            skipped = report.skipped,
            "station snapshot applied"
        );
        report
    }

    /// Merge a full `rentals` collection snapshot.
    pub fn apply_rental_snapshot(&mut self, docs: &[Document]) -> SnapshotReport {
        let mut report = SnapshotReport::default();
        let mut incoming: BTreeMap<String, Rental> = BTreeMap::new();
        let mut undecodable: HashSet<String> = HashSet::new();

        for doc in docs {
            match rental_from_document(doc) {
                Ok(rental) => {
                    incoming.insert(rental.id.as_str().to_owned(), rental);
                }
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "skipping undecodable rental document");
                    report.skipped += 1;
                    undecodable.insert(doc.id.clone());
                }
            }
        }

        let (changes, _removed) = plan_changes(
            incoming,
            &undecodable,
            self.store.rental_ids().into_iter().map(|id| id.as_str().to_owned()),
            |key| self.store.rental(&RentalId::from(key)),
            |key| self.suppression.is_suppressed(RentalId::from(key)),
            &mut report,
        );
        self.store.apply_rentals(changes);
        self.store.mark_rental_snapshot(Utc::now());
        self.mark_healthy("rentals");

        debug!(
            updated = report.updated,
            suppressed = report.suppressed,
            removed = report.removed,
            "rental snapshot applied"
        );
        report
    }

    /// The document store reported a stream error. The store is left as is.
    pub fn on_listener_error(&mut self, collection: &str, error: &CoreError) {
        warn!(collection, error = %error, "document store listener error");
        if self.degraded.insert(collection.to_owned()) {
            self.notify(Notice::error(format!(
                "Document store unavailable ({collection}): {error}. Showing last known state."
            )));
        }
    }

    fn mark_healthy(&mut self, collection: &str) {
        if self.degraded.remove(collection) {
            info!(collection, "document store listener recovered");
            self.notify(Notice::info(format!("Document store connection restored ({collection})")));
        }
    }

    // ── Command channel ──────────────────────────────────────────────

    pub fn on_channel_event(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Message(msg) => self.handle_message(msg),
            ChannelEvent::InvalidResponse { raw, reason } => {
                debug!(%reason, len = raw.len(), "unparseable channel frame");
                self.notify(
                    Notice::error("Invalid response from server")
                        .with_detail(serde_json::Value::String(reason.clone())),
                );
            }
        }
    }

    pub fn on_channel_state(&mut self, state: ChannelState) {
        let previous = std::mem::replace(&mut self.channel_state, state);
        if previous == state {
            return;
        }
        match state {
            ChannelState::Connected => self.notify(Notice::info("Command channel connected")),
            ChannelState::Disconnected if previous == ChannelState::Connected => {
                self.notify(Notice::error("Command channel disconnected, reconnecting"));
            }
            ChannelState::Disconnected | ChannelState::Connecting => {}
        }
    }

    /// Run one inbound message through the dispatch table and apply it.
    pub fn handle_message(&mut self, msg: &InboundMessage) {
        let dispatch = match dispatch(msg) {
            Ok(d) => d,
            Err(e) => {
                warn!(action = %msg.action, error = %e, "invalid confirmation");
                let mut notice = Notice::error("Invalid response from server")
                    .with_action(msg.action.clone())
                    .with_detail(serde_json::Value::String(e.to_string()));
                notice.station = msg.affected_station.as_deref().map(StationId::from);
                self.notify(notice);
                return;
            }
        };

        match dispatch.outcome {
            Outcome::Pending => self.notify(notice_for(&dispatch, Notice::pending(dispatch.message()))),
            Outcome::Error => self.apply_failure(&dispatch, msg),
            Outcome::Success => {
                if let Some(ref confirmation) = dispatch.confirmation {
                    self.apply_confirmation(confirmation);
                }
                let mut notice = notice_for(&dispatch, Notice::success(dispatch.message()));
                if let Some(Confirmation::Tunnel {
                    info: Some(ref info), ..
                }) = dispatch.confirmation
                {
                    notice = notice.with_detail(info.clone());
                }
                self.notify(notice);
            }
        }
    }

    /// The server rejected the command: drop its markers and let the next
    /// snapshot show the truth.
    fn apply_failure(&mut self, dispatch: &Dispatch, msg: &InboundMessage) {
        if let Some(ref station) = dispatch.station {
            match dispatch.slot {
                Some(at) => {
                    self.overlay.remove(&OverlayKey::new(station.clone(), at));
                }
                None => {
                    self.overlay.clear_station(station);
                }
            }
            self.suppression.clear(station);
        }
        if let Some(rental) = msg.extra_str("rentalId") {
            self.suppression.clear(RentalId::from(rental));
        }
        self.publish_overlays();
        self.notify(notice_for(dispatch, Notice::error(dispatch.message())));
    }

    fn apply_confirmation(&mut self, confirmation: &Confirmation) {
        match confirmation {
            Confirmation::SlotLock {
                station,
                slot,
                locked,
                reason,
            } => {
                self.patch_station(station, |s| {
                    if let Some(target) = s.slot_mut(*slot) {
                        target.locked = Some(*locked);
                        target.lock_reason.clone_from(reason);
                    }
                });
                self.overlay.remove(&OverlayKey::new(station.clone(), *slot));
                self.suppression.suppress(station, self.ttls.lock_confirm);
            }
            Confirmation::Ejected { station, target } => {
                let slots = match target {
                    EjectTarget::Slots(slots) => slots.clone(),
                    EjectTarget::Selection(selection) => self
                        .store
                        .station(station)
                        .map(|s| selection.resolve(&s))
                        .unwrap_or_default(),
                };
                self.patch_station(station, |s| {
                    for at in &slots {
                        if let Some(slot) = s.slot_mut(*at) {
                            slot.clear_occupant();
                        }
                    }
                });
                for at in &slots {
                    self.overlay.remove(&OverlayKey::new(station.clone(), *at));
                }
                self.suppression.suppress(station, self.ttls.command);
            }
            Confirmation::StationEnabled { station, enabled } => {
                self.patch_station(station, |s| s.disabled = !*enabled);
                self.suppression.suppress(station, self.ttls.command);
            }
            Confirmation::Tunnel {
                station,
                tunnel,
                connected,
                ..
            } => {
                self.patch_station(station, |s| s.set_tunnel(*tunnel, *connected));
                self.suppression.suppress(station, self.ttls.command);
            }
            Confirmation::Provisioned { station } => {
                info!(station = %station, "station provisioned");
                if !self.provisioned.contains(station) {
                    self.provisioned.push(station.clone());
                }
            }
            Confirmation::Refunded {
                rental,
                status,
                amount,
                ..
            } => {
                match self.store.rental(rental) {
                    Some(current) => {
                        let mut next = (*current).clone();
                        next.status.clone_from(status);
                        if amount.is_some() {
                            next.amount = *amount;
                        }
                        self.store.put_rental(next);
                    }
                    None => warn!(rental = %rental, "refund confirmed for unknown rental"),
                }
                self.suppression.suppress(rental, self.ttls.command);
            }
            Confirmation::VersionUpdated {
                station,
                target,
                version,
            } => {
                if let Some(version) = version {
                    self.patch_station(station, |s| match target {
                        crate::command::UpdateTarget::Flow => s.flow_version = Some(version.clone()),
                        crate::command::UpdateTarget::Ui => s.ui_version = Some(version.clone()),
                    });
                }
                self.suppression.suppress(station, self.ttls.command);
            }
            Confirmation::Replaced { station } => {
                let id = station.id.clone();
                self.store.put_station((**station).clone());
                self.suppression.suppress(&id, self.ttls.command);
            }
        }

        if let Some(EntityKey::Station(id)) = confirmation.entity_key() {
            self.sweep(&id);
        }
        self.publish_overlays();
    }

    // ── Edit sessions and manual clears ──────────────────────────────

    /// Hold back snapshots for `station` while an operator edits it.
    pub fn begin_edit(&mut self, station: &StationId) {
        debug!(station = %station, "edit session started");
        self.suppression.suppress(station, self.ttls.edit_session);
    }

    /// End the edit session: the next snapshot is trusted immediately.
    pub fn end_edit(&mut self, station: &StationId) {
        debug!(station = %station, "edit session ended");
        self.suppression.clear(station);
    }

    /// Drop every overlay marker on `station`. Returns how many were removed.
    pub fn clear_overlays(&mut self, station: &StationId) -> usize {
        let removed = self.overlay.clear_station(station);
        self.publish_overlays();
        removed
    }

    /// Forget lapsed suppression entries.
    pub fn prune(&mut self) -> usize {
        self.suppression.prune_expired()
    }

    // ── Helpers ──────────────────────────────────────────────────────

    /// Clone-patch-store a station. Returns `false` if it is unknown.
    fn patch_station<F: FnOnce(&mut Station)>(&self, id: &StationId, patch: F) -> bool {
        let Some(current) = self.store.station(id) else {
            warn!(station = %id, "patch for unknown station ignored");
            return false;
        };
        let mut next = (*current).clone();
        patch(&mut next);
        if next != *current {
            self.store.put_station(next);
        }
        true
    }

    fn sweep(&mut self, id: &StationId) {
        if let Some(station) = self.store.station(id) {
            let settled = self.overlay.sweep(&station);
            if !settled.is_empty() {
                debug!(station = %id, count = settled.len(), "overlays settled by store state");
            }
        }
    }

    fn publish_overlays(&self) {
        self.store.publish_overlays(self.overlay.markers());
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }
}

fn notice_for(dispatch: &Dispatch, notice: Notice) -> Notice {
    let notice = notice.with_action(dispatch.action.as_tag());
    let station = dispatch
        .confirmation
        .as_ref()
        .and_then(Confirmation::station)
        .cloned()
        .or_else(|| dispatch.station.clone());
    match station {
        Some(station) => notice.with_station(station),
        None => notice,
    }
}

/// Diff a full snapshot against the current keys. Returns the batch to
/// apply and the keys it removes.
fn plan_changes<T: PartialEq>(
    incoming: BTreeMap<String, T>,
    undecodable: &HashSet<String>,
    existing: impl Iterator<Item = String>,
    current: impl Fn(&str) -> Option<Arc<T>>,
    suppressed: impl Fn(&str) -> bool,
    report: &mut SnapshotReport,
) -> (Vec<Change<T>>, Vec<String>) {
    let mut changes = Vec::new();
    let mut removed = Vec::new();

    for key in existing {
        if incoming.contains_key(&key) || undecodable.contains(&key) {
            continue;
        }
        if suppressed(&key) {
            report.suppressed += 1;
            continue;
        }
        report.removed += 1;
        removed.push(key.clone());
        changes.push(Change::Remove(key));
    }

    for (key, value) in incoming {
        if suppressed(&key) {
            report.suppressed += 1;
        } else if current(&key).is_some_and(|c| *c == value) {
            report.unchanged += 1;
        } else {
            report.updated += 1;
            changes.push(Change::Upsert(key, value));
        }
    }

    (changes, removed)
}
