// ── Fleet facade ──
//
// Owns the lifecycle: spawns the command channel, subscribes the document
// store collections, and runs the reconciler on one task. Every snapshot,
// confirmation, and submission is one step of that task, so the
// reconciler itself needs no locks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetsync_api::{
    ChannelEvent, ChannelState, CommandChannel, Document, HttpCollectionListener, PushListener,
    Subscription, Transport, WebSocketTransport,
};

use crate::clock::{Clock, SystemClock};
use crate::command::Command;
use crate::config::FleetConfig;
use crate::error::CoreError;
use crate::model::{Rental, Station, StationId};
use crate::notice::Notice;
use crate::overlay::OverlayMarker;
use crate::reconciler::{NOTICE_CHANNEL_CAPACITY, Reconciler};
use crate::store::EntityStore;
use crate::stream::EntityStream;

const REQUEST_CHANNEL_SIZE: usize = 64;
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Work handed to the engine task.
enum Request {
    Submit {
        command: Command,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    BeginEdit(StationId),
    EndEdit(StationId),
    ClearOverlays {
        station: StationId,
        reply: oneshot::Sender<usize>,
    },
}

/// Pushed by the listener callbacks.
enum ListenerEvent {
    Stations(Vec<Document>),
    Rentals(Vec<Document>),
    Error {
        collection: String,
        error: fleetsync_api::Error,
    },
}

/// The main entry point for consumers. Cheaply cloneable.
#[derive(Clone)]
pub struct Fleet {
    inner: Arc<FleetInner>,
}

struct FleetInner {
    config: FleetConfig,
    clock: Arc<dyn Clock>,
    store: Arc<EntityStore>,
    notices: broadcast::Sender<Notice>,
    connection_state: watch::Sender<ChannelState>,
    request_tx: mpsc::Sender<Request>,
    request_rx: Mutex<Option<mpsc::Receiver<Request>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Fleet {
    /// Create a fleet handle. Does NOT connect; call [`start()`](Self::start).
    pub fn new(config: FleetConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit suppression clock.
    pub fn with_clock(config: FleetConfig, clock: Arc<dyn Clock>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let (connection_state, _) = watch::channel(ChannelState::Disconnected);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);

        Self {
            inner: Arc::new(FleetInner {
                config,
                clock,
                store: Arc::new(EntityStore::new()),
                notices,
                connection_state,
                request_tx,
                request_rx: Mutex::new(Some(request_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect with the production WebSocket and HTTP transports.
    pub async fn start(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        let transport = WebSocketTransport::new(config.channel_url.clone());
        let listener = HttpCollectionListener::with_timeout(
            config.store_url.clone(),
            Some(config.token.clone()),
            config.poll_interval,
            config.timeout,
        )?;
        self.start_with(transport, listener).await
    }

    /// Connect with caller-supplied transports.
    pub async fn start_with<T, L>(&self, transport: T, listener: L) -> Result<(), CoreError>
    where
        T: Transport,
        L: PushListener,
    {
        let requests = self
            .inner
            .request_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::Internal("fleet already started".into()))?;

        let config = &self.inner.config;
        info!(
            channel = %config.channel_url,
            store = %config.store_url,
            admin = config.admin_channel,
            "starting fleet"
        );

        let channel = CommandChannel::spawn(
            transport,
            config.reconnect(),
            config.token.clone(),
            &self.inner.cancel,
        );

        let (listener_tx, listener_rx) = mpsc::unbounded_channel();
        let subscriptions = vec![
            subscribe_collection(&listener, &config.stations_collection, &listener_tx, ListenerEvent::Stations),
            subscribe_collection(&listener, &config.rentals_collection, &listener_tx, ListenerEvent::Rentals),
        ];

        let events = channel.subscribe();
        let state_rx = channel.watch_state();
        let reconciler = Reconciler::new(
            channel,
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.clock),
            config.ttls,
            self.inner.notices.clone(),
        );

        let engine = Engine {
            reconciler,
            requests,
            listener_rx,
            events,
            state_rx,
            connection_state: self.inner.connection_state.clone(),
            cancel: self.inner.cancel.clone(),
            _subscriptions: subscriptions,
        };
        let handle = tokio::spawn(engine.run());
        self.inner.task_handles.lock().await.push(handle);
        Ok(())
    }

    /// Stop every background task and close the channel intentionally.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.inner.connection_state.send_replace(ChannelState::Disconnected);
        debug!("fleet shut down");
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Submit a command. Resolves once it has been sent (not confirmed);
    /// fails without side effects if the channel is down.
    pub async fn submit(&self, command: Command) -> Result<(), CoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Submit { command, reply }).await?;
        rx.await
            .map_err(|_| CoreError::Internal("fleet engine stopped".into()))?
    }

    pub async fn begin_edit(&self, station: StationId) -> Result<(), CoreError> {
        self.request(Request::BeginEdit(station)).await
    }

    pub async fn end_edit(&self, station: StationId) -> Result<(), CoreError> {
        self.request(Request::EndEdit(station)).await
    }

    pub async fn clear_overlays(&self, station: StationId) -> Result<usize, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::ClearOverlays { station, reply }).await?;
        rx.await
            .map_err(|_| CoreError::Internal("fleet engine stopped".into()))
    }

    async fn request(&self, request: Request) -> Result<(), CoreError> {
        self.inner
            .request_tx
            .send(request)
            .await
            .map_err(|_| CoreError::Internal("fleet engine stopped".into()))
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn stations(&self) -> Arc<Vec<Arc<Station>>> {
        self.inner.store.stations_snapshot()
    }

    pub fn station(&self, id: &StationId) -> Option<Arc<Station>> {
        self.inner.store.station(id)
    }

    pub fn rentals(&self) -> Arc<Vec<Arc<Rental>>> {
        self.inner.store.rentals_snapshot()
    }

    pub fn subscribe_stations(&self) -> EntityStream<Station> {
        self.inner.store.subscribe_stations()
    }

    pub fn subscribe_overlays(&self) -> EntityStream<OverlayMarker> {
        self.inner.store.subscribe_overlays()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.connection_state.subscribe()
    }

    /// Wait until the command channel is connected.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.connection_state();
        tokio::time::timeout(timeout, rx.wait_for(|s| s.is_connected()))
            .await
            .map_err(|_| CoreError::ChannelUnavailable {
                reason: format!("not connected after {}s", timeout.as_secs()),
            })?
            .map_err(|_| CoreError::Internal("fleet engine stopped".into()))?;
        Ok(())
    }

    /// Wait until the first stations snapshot has been processed.
    pub async fn wait_for_stations(&self, timeout: Duration) -> Result<(), CoreError> {
        wait_for_snapshot(self.inner.store.watch_station_snapshots(), "station", timeout).await
    }

    /// Wait until the first rentals snapshot has been processed.
    pub async fn wait_for_rentals(&self, timeout: Duration) -> Result<(), CoreError> {
        wait_for_snapshot(self.inner.store.watch_rental_snapshots(), "rental", timeout).await
    }
}

async fn wait_for_snapshot(
    mut rx: watch::Receiver<Option<DateTime<Utc>>>,
    what: &str,
    timeout: Duration,
) -> Result<(), CoreError> {
    tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
        .await
        .map_err(|_| CoreError::Connectivity {
            message: format!("no {what} snapshot after {}s", timeout.as_secs()),
        })?
        .map_err(|_| CoreError::Internal("fleet engine stopped".into()))?;
    Ok(())
}

fn subscribe_collection<L: PushListener>(
    listener: &L,
    collection: &str,
    tx: &mpsc::UnboundedSender<ListenerEvent>,
    wrap: fn(Vec<Document>) -> ListenerEvent,
) -> Subscription {
    let snapshot_tx = tx.clone();
    let error_tx = tx.clone();
    let name = collection.to_owned();
    listener.subscribe(
        collection,
        move |docs| {
            let _ = snapshot_tx.send(wrap(docs));
        },
        move |error| {
            let _ = error_tx.send(ListenerEvent::Error {
                collection: name.clone(),
                error,
            });
        },
    )
}

// ── Engine task ──────────────────────────────────────────────────────

struct Engine {
    reconciler: Reconciler<CommandChannel>,
    requests: mpsc::Receiver<Request>,
    listener_rx: mpsc::UnboundedReceiver<ListenerEvent>,
    events: broadcast::Receiver<ChannelEvent>,
    state_rx: watch::Receiver<ChannelState>,
    connection_state: watch::Sender<ChannelState>,
    cancel: CancellationToken,
    /// Held so the listener keeps polling; dropped on exit.
    _subscriptions: Vec<Subscription>,
}

impl Engine {
    async fn run(mut self) {
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // The channel task may already have moved before this task first ran.
        self.sync_channel_state();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(request) = self.requests.recv() => self.handle_request(request),
                Some(event) = self.listener_rx.recv() => self.handle_listener(event),
                event = self.events.recv() => match event {
                    Ok(event) => self.reconciler.on_channel_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "channel event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.sync_channel_state();
                }
                _ = prune.tick() => {
                    let pruned = self.reconciler.prune();
                    if pruned > 0 {
                        debug!(pruned, "expired suppressions pruned");
                    }
                }
            }
        }

        self.reconciler.sink().close();
        debug!("fleet engine exiting");
    }

    fn sync_channel_state(&mut self) {
        let state = *self.state_rx.borrow_and_update();
        self.reconciler.on_channel_state(state);
        self.connection_state.send_replace(state);
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Submit { command, reply } => {
                let _ = reply.send(self.reconciler.submit(&command));
            }
            Request::BeginEdit(station) => self.reconciler.begin_edit(&station),
            Request::EndEdit(station) => self.reconciler.end_edit(&station),
            Request::ClearOverlays { station, reply } => {
                let _ = reply.send(self.reconciler.clear_overlays(&station));
            }
        }
    }

    fn handle_listener(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Stations(docs) => {
                self.reconciler.apply_station_snapshot(&docs);
            }
            ListenerEvent::Rentals(docs) => {
                self.reconciler.apply_rental_snapshot(&docs);
            }
            ListenerEvent::Error { collection, error } => {
                self.reconciler
                    .on_listener_error(&collection, &CoreError::from(error));
            }
        }
    }
}
