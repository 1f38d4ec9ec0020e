// Provider orchestration: wires a shared document and an awareness store to
// a connection session, with reconnection and event fan-out.
//
// All mutable state lives in one task looping over a select; the public
// handle only sends commands and reads snapshots. Remote updates are merged
// inside a transaction tagged with this provider's origin, and the document
// observer skips notifications carrying that origin, which is what keeps a
// merged remote update from being broadcast right back to the remote.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use syncline_protocol::awareness::{AwarenessChange, AwarenessStore};
use syncline_protocol::types::{DocumentId, ParticipantId};
use syncline_protocol::wire::{AwarenessDelta, ParticipantEntry};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use yrs::{Doc, Origin, Subscription};

use crate::config::ProviderConfig;
use crate::doc;
use crate::error::ProviderError;
use crate::reconnect::ReconnectScheduler;
use crate::session::{ConnectionSession, SessionEvent};
use crate::transport::{Transport, WsTransport};

const EVENT_BUFFER_SIZE: usize = 256;

/// Connectivity as seen by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Connecting,
    Connected,
    Synced,
    Reconnecting,
    Disconnected,
}

/// Notifications delivered to `subscribe`rs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Status(SyncStatus),
    /// A remote update was merged into the local document.
    DocumentUpdated,
    /// The awareness store changed, locally or remotely.
    AwarenessChanged(AwarenessChange),
}

enum Command {
    Connect,
    Disconnect,
    SetLocalState(Value),
    ClearLocalState,
    Destroy,
}

enum LoopEvent {
    Command(Command),
    TimerFired,
    LocalUpdate(Vec<u8>),
    Session(SessionEvent),
}

fn lock_store(store: &Mutex<AwarenessStore>) -> MutexGuard<'_, AwarenessStore> {
    store.lock().expect("awareness store lock poisoned")
}

/// Handle to one running provider.
///
/// Cheap to keep around: every method is a command send or a snapshot read.
/// Dropping the handle stops the event loop; `destroy` does the same but
/// waits for it.
pub struct SyncProvider {
    doc: Doc,
    document_id: DocumentId,
    participant_id: ParticipantId,
    awareness: Arc<Mutex<AwarenessStore>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ProviderEvent>,
    status_rx: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl SyncProvider {
    /// Create a provider over the production WebSocket transport.
    ///
    /// The document stays owned by the caller; pass a clone (clones share
    /// the same underlying store). Nothing touches the network until
    /// `connect` is called.
    pub fn new(config: ProviderConfig, doc: Doc) -> Result<Self, ProviderError> {
        Self::with_transport(config, doc, WsTransport::new())
    }

    /// Create a provider over a custom transport.
    pub fn with_transport<T>(
        config: ProviderConfig,
        doc: Doc,
        transport: T,
    ) -> Result<Self, ProviderError>
    where
        T: Transport + Send + 'static,
    {
        let participant_id = doc.client_id();
        let document_id = config.document_id.clone();
        let awareness = Arc::new(Mutex::new(AwarenessStore::new(participant_id)));
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let (status_tx, status_rx) = watch::channel(SyncStatus::Idle);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let core = ProviderCore::new(
            config,
            doc.clone(),
            transport,
            events.clone(),
            status_tx,
            Arc::clone(&awareness),
        )?;
        let task = tokio::spawn(core.run(cmd_rx));

        Ok(Self {
            doc,
            document_id,
            participant_id,
            awareness,
            cmd_tx,
            events,
            status_rx,
            task,
        })
    }

    /// Start connecting and keep reconnecting until `disconnect`.
    pub fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect);
    }

    /// Stop the connection and any scheduled reconnect. Idempotent; a later
    /// `connect` starts over from a fresh session.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Disconnect, detach from the document, and stop the event loop.
    pub async fn destroy(self) {
        let _ = self.cmd_tx.send(Command::Destroy);
        let _ = self.task.await;
    }

    /// Replace this participant's presence state and broadcast it.
    pub fn set_local_state(&self, state: Value) {
        let _ = self.cmd_tx.send(Command::SetLocalState(state));
    }

    /// Withdraw this participant's presence and tell peers to drop it.
    pub fn clear_local_state(&self) {
        let _ = self.cmd_tx.send(Command::ClearLocalState);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    /// Current presence entries, ordered by participant id.
    pub fn awareness_states(&self) -> Vec<ParticipantEntry> {
        lock_store(&self.awareness).snapshot()
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }
}

struct ProviderCore<T> {
    document_id: DocumentId,
    url: url::Url,
    doc: Doc,
    origin: Origin,
    awareness: Arc<Mutex<AwarenessStore>>,
    session: ConnectionSession<T>,
    scheduler: ReconnectScheduler,
    update_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    events: broadcast::Sender<ProviderEvent>,
    status_tx: watch::Sender<SyncStatus>,
    reconnect_at: Option<Instant>,
    _update_sub: Subscription,
}

impl<T: Transport> ProviderCore<T> {
    fn new(
        config: ProviderConfig,
        doc: Doc,
        transport: T,
        events: broadcast::Sender<ProviderEvent>,
        status_tx: watch::Sender<SyncStatus>,
        awareness: Arc<Mutex<AwarenessStore>>,
    ) -> Result<Self, ProviderError> {
        let url = config.connect_url()?;

        // Unique per provider instance, not per participant: two providers
        // bridging the same document must still forward each other's merges.
        let label = format!("syncline/{}", Uuid::new_v4());
        let origin = Origin::from(label.as_str());

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let observer_origin = origin.clone();
        let update_sub = doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&observer_origin) {
                    return;
                }
                let _ = update_tx.send(event.update.clone());
            })
            .map_err(|error| ProviderError::Observer {
                detail: error.to_string(),
            })?;

        Ok(Self {
            document_id: config.document_id.clone(),
            url,
            doc,
            origin,
            awareness,
            session: ConnectionSession::new(config.document_id, transport),
            scheduler: ReconnectScheduler::new(config.reconnect_delay),
            update_rx,
            events,
            status_tx,
            reconnect_at: None,
            _update_sub: update_sub,
        })
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let active = self.session.is_active();
            let event = tokio::select! {
                biased;

                command = cmd_rx.recv() => {
                    LoopEvent::Command(command.unwrap_or(Command::Destroy))
                }

                _ = wait_until(self.reconnect_at), if self.reconnect_at.is_some() => {
                    LoopEvent::TimerFired
                }

                update = self.update_rx.recv() => match update {
                    Some(update) => LoopEvent::LocalUpdate(update),
                    None => continue,
                },

                event = self.session.recv_event(), if active => LoopEvent::Session(event),
            };
            if self.handle(event).await {
                break;
            }
        }
    }

    /// Dispatch one loop event. Returns true when the loop should stop.
    async fn handle(&mut self, event: LoopEvent) -> bool {
        match event {
            LoopEvent::Command(command) => return self.handle_command(command).await,
            LoopEvent::TimerFired => self.handle_timer().await,
            LoopEvent::LocalUpdate(update) => self.forward_local_update(update).await,
            LoopEvent::Session(event) => self.handle_session_event(event).await,
        }
        false
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => self.start_connecting().await,
            Command::Disconnect => self.shutdown_connection("disconnect requested").await,
            Command::SetLocalState(state) => {
                let (change, delta) = {
                    let mut store = lock_store(&self.awareness);
                    let change = store.set_local_state(state);
                    let delta = store.delta_for(&change);
                    (change, delta)
                };
                self.publish_awareness(change, delta).await;
            }
            Command::ClearLocalState => {
                let (change, delta) = {
                    let mut store = lock_store(&self.awareness);
                    let change = store.clear_local_state();
                    let delta = store.delta_for(&change);
                    (change, delta)
                };
                self.publish_awareness(change, delta).await;
            }
            Command::Destroy => {
                self.shutdown_connection("provider destroyed").await;
                return true;
            }
        }
        false
    }

    async fn start_connecting(&mut self) {
        self.scheduler.request_connect();
        if self.scheduler.cancel_pending() {
            self.reconnect_at = None;
        }
        if self.session.is_active() {
            debug!(doc = %self.document_id, "connect requested while already connected");
            return;
        }
        self.attempt_connect().await;
    }

    async fn attempt_connect(&mut self) {
        self.set_status(SyncStatus::Connecting);
        let state_vector = doc::encode_state_vector(&self.doc);
        let presence = lock_store(&self.awareness).local_delta();
        match self.session.open(&self.url, &state_vector, &presence).await {
            Ok(()) => self.set_status(SyncStatus::Connected),
            Err(error) => {
                warn!(doc = %self.document_id, error = %error, "connection attempt failed");
                self.on_session_lost(error.to_string()).await;
            }
        }
    }

    async fn handle_timer(&mut self) {
        self.reconnect_at = None;
        if self.scheduler.on_timer_fired() {
            self.attempt_connect().await;
        }
    }

    async fn forward_local_update(&mut self, update: Vec<u8>) {
        if let Err(error) = self.session.send_update(update).await {
            self.on_session_lost(error.to_string()).await;
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Update(update) => self.merge_remote_update(&update),
            SessionEvent::Awareness(delta) => self.apply_remote_awareness(&delta).await,
            SessionEvent::Closed { reason } => self.on_session_lost(reason).await,
        }
    }

    fn merge_remote_update(&mut self, update: &[u8]) {
        match doc::apply_update(&self.doc, &self.origin, update) {
            Ok(()) => {
                if self.session.mark_synced() {
                    self.set_status(SyncStatus::Synced);
                }
                self.emit(ProviderEvent::DocumentUpdated);
            }
            Err(error) => {
                warn!(doc = %self.document_id, error = %error, "failed to apply remote update");
            }
        }
    }

    async fn apply_remote_awareness(&mut self, delta: &AwarenessDelta) {
        let (change, outbound) = {
            let mut store = lock_store(&self.awareness);
            let change = store.apply(delta);
            let outbound = store.delta_for(&change);
            (change, outbound)
        };
        self.publish_awareness(change, outbound).await;
    }

    /// Report a store change to subscribers and forward it to the remote.
    /// Re-applied deltas produce empty changes, which is what terminates
    /// awareness echo between peers.
    async fn publish_awareness(&mut self, change: AwarenessChange, delta: AwarenessDelta) {
        if change.is_empty() {
            return;
        }
        self.emit(ProviderEvent::AwarenessChanged(change));
        if let Err(error) = self.session.send_awareness(&delta).await {
            self.on_session_lost(error.to_string()).await;
        }
    }

    async fn on_session_lost(&mut self, reason: String) {
        self.session.close().await;
        let change = lock_store(&self.awareness).prune_remote();
        if !change.is_empty() {
            self.emit(ProviderEvent::AwarenessChanged(change));
        }
        match self.scheduler.on_session_closed() {
            Some(delay) => {
                info!(
                    doc = %self.document_id,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "scheduling reconnect"
                );
                self.reconnect_at = Some(Instant::now() + delay);
                self.set_status(SyncStatus::Reconnecting);
            }
            None if self.scheduler.stay_connected() => {}
            None => self.set_status(SyncStatus::Disconnected),
        }
    }

    async fn shutdown_connection(&mut self, reason: &str) {
        if self.scheduler.shutdown() {
            debug!(doc = %self.document_id, "cancelled pending reconnect");
        }
        self.reconnect_at = None;
        if self.session.is_active() {
            info!(doc = %self.document_id, reason, "disconnecting");
            self.session.close().await;
            let change = lock_store(&self.awareness).prune_remote();
            if !change.is_empty() {
                self.emit(ProviderEvent::AwarenessChanged(change));
            }
        }
        self.set_status(SyncStatus::Disconnected);
    }

    fn set_status(&mut self, status: SyncStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            self.emit(ProviderEvent::Status(status));
        }
    }

    fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
