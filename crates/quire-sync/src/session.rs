//! The per-document reactor.
//!
//! One [`DocumentSession`] runs as a tokio task per open document. It owns the
//! status machine, the change emitter, the cursor tracker and the offline
//! reconciler, and is the only thing that ever touches them. Everything else
//! talks to it through [`SessionInput`] messages and hears back through
//! [`SessionEvent`]s and a status watch channel.
//!
//! The loop waits on three things at once: the input channel, the in-flight
//! save (at most one), and the earliest pending deadline (emit debounce, echo,
//! save debounce, cursor coalescing, reconcile retry).

use std::future::pending;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use quire_common::storage::LocalStorage;
use quire_common::transport::{CollabMessage, ReceivedMessage};
use quire_common::{ClientId, Config, DocumentId, SyncConfig};
use quire_editor_core::{Command, CommandBus, CursorTracker, DocumentSnapshot, TrackedCursor};
use smol_str::SmolStr;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::backend::{ConnectivityProbe, Persistence, RemoteSink, Transport};
use crate::document::{DocumentUpdate, EditableState, FlushOverride};
use crate::emitter::ChangeEmitter;
use crate::error::SyncError;
use crate::flush::{FlushOutcome, FlushRegistration, FlushRegistry};
use crate::offline::{OfflineReconciler, ReconcileOutcome};
use crate::status::{SyncStatus, SyncStatusMachine};

/// Connectivity signal from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Messages into a session.
#[derive(Debug)]
pub enum SessionInput {
    /// The editing surface produced a new text.
    LocalEdit(DocumentSnapshot),
    /// Title and/or tags changed.
    MetadataEdit {
        title: Option<SmolStr>,
        tags: Option<Vec<SmolStr>>,
    },
    /// The local caret moved.
    LocalCursor(usize),
    /// An encoded room message, delivered by the transport.
    Remote(Vec<u8>),
    Connectivity(Connectivity),
    /// Save now. The outcome goes to `reply` if given.
    Flush {
        overrides: Option<FlushOverride>,
        reply: Option<oneshot::Sender<FlushOutcome>>,
    },
    Unmount,
}

/// Messages out of a session, for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(SyncStatus),
    /// Replace the editor text. Sent for normalization echoes and remote content.
    ApplyContent(String),
    /// Replace title, text and tags.
    ReplaceState(EditableState),
    /// The offline edits were saved as a new document.
    Forked {
        document_id: DocumentId,
        title: SmolStr,
    },
    /// Remote cursors, adjusted to the current text.
    Cursors(Vec<TrackedCursor>),
}

/// The backends a session runs against.
pub struct Collaborators<T, P, C> {
    pub transport: Arc<T>,
    pub persistence: Arc<P>,
    pub connectivity: Arc<C>,
    pub storage: Arc<dyn LocalStorage>,
}

/// Per-session settings and the shared UI plumbing it registers with.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Name broadcast with this client's cursor.
    pub username: SmolStr,
    pub config: SyncConfig,
    pub flush_registry: FlushRegistry,
    pub commands: CommandBus,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            username: config.username.clone(),
            config: config.sync.clone(),
            ..Default::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            username: SmolStr::new_static("anonymous"),
            config: SyncConfig::default(),
            flush_registry: FlushRegistry::new(),
            commands: CommandBus::new(),
        }
    }
}

type SaveFuture = BoxFuture<'static, Result<(), SyncError>>;

struct SaveInFlight {
    payload: EditableState,
    waiters: Vec<oneshot::Sender<FlushOutcome>>,
}

struct QueuedFlush {
    overrides: Option<FlushOverride>,
    waiters: Vec<oneshot::Sender<FlushOutcome>>,
}

enum Wake {
    Input(SessionInput),
    SaveDone(Result<(), SyncError>),
    Timer,
    Closed,
}

/// Reactor state for one open document.
pub struct DocumentSession<T, P, C> {
    id: DocumentId,
    client_id: ClientId,
    username: SmolStr,
    config: SyncConfig,

    transport: Arc<T>,
    persistence: Arc<P>,
    connectivity: Arc<C>,
    reconciler: OfflineReconciler,

    flush_registry: FlushRegistry,
    registration: Option<FlushRegistration>,
    commands: CommandBus,

    inputs: mpsc::UnboundedReceiver<SessionInput>,
    inputs_weak: mpsc::WeakUnboundedSender<SessionInput>,
    events: mpsc::UnboundedSender<SessionEvent>,
    status_tx: watch::Sender<SyncStatus>,

    status: SyncStatusMachine,
    published: SyncStatus,
    current: EditableState,
    last_saved: EditableState,
    emitter: ChangeEmitter,
    tracker: CursorTracker,
    offline: bool,

    saving: Option<SaveFuture>,
    in_flight: Option<SaveInFlight>,
    queued_flush: Option<QueuedFlush>,

    save_deadline: Option<Instant>,
    cursor_deadline: Option<Instant>,
    reconcile_deadline: Option<Instant>,
}

impl<T, P, C> DocumentSession<T, P, C>
where
    T: Transport,
    P: Persistence,
    C: ConnectivityProbe,
{
    /// Mount a session for `id`, starting from `initial` as the saved state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        id: impl Into<DocumentId>,
        initial: EditableState,
        collaborators: Collaborators<T, P, C>,
        options: SessionOptions,
    ) -> SessionHandle {
        let id = id.into();
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::Synchronized);

        let Collaborators {
            transport,
            persistence,
            connectivity,
            storage,
        } = collaborators;

        let session = Self {
            id: id.clone(),
            client_id: transport.client_id(),
            username: options.username,
            reconciler: OfflineReconciler::new(storage, options.config.fork_title_suffix.clone()),
            emitter: ChangeEmitter::new(options.config.timing, &initial.content),
            config: options.config,
            transport,
            persistence,
            connectivity,
            flush_registry: options.flush_registry,
            registration: None,
            commands: options.commands,
            inputs,
            inputs_weak: inputs_tx.downgrade(),
            events: events_tx,
            status_tx,
            status: SyncStatusMachine::new(),
            published: SyncStatus::Synchronized,
            last_saved: initial.clone(),
            current: initial,
            tracker: CursorTracker::new(),
            offline: false,
            saving: None,
            in_flight: None,
            queued_flush: None,
            save_deadline: None,
            cursor_deadline: None,
            reconcile_deadline: None,
        };

        let task = tokio::spawn(session.run());
        SessionHandle {
            id,
            inputs: inputs_tx,
            events,
            status: status_rx,
            task,
        }
    }

    async fn run(mut self) {
        self.mount().await;
        self.publish_status();

        loop {
            let deadline = self.next_deadline();
            let wake = tokio::select! {
                biased;

                input = self.inputs.recv() => match input {
                    Some(SessionInput::Unmount) | None => Wake::Closed,
                    Some(input) => Wake::Input(input),
                },
                result = wait_for_save(&mut self.saving) => Wake::SaveDone(result),
                _ = sleep_until_opt(deadline) => Wake::Timer,
            };

            match wake {
                Wake::Input(input) => self.handle_input(input).await,
                Wake::SaveDone(result) => self.on_save_done(result),
                Wake::Timer => self.on_timer().await,
                Wake::Closed => break,
            }
            self.publish_status();
        }

        self.unmount().await;
    }

    async fn mount(&mut self) {
        let sink = RemoteSink::new(self.inputs_weak.clone());
        if let Err(e) = self.transport.join(&self.id, sink).await {
            tracing::warn!(document = %self.id, error = %e, "failed to join room");
        }

        let inputs = self.inputs_weak.clone();
        self.registration = Some(self.flush_registry.register(move |overrides| {
            let inputs = inputs.upgrade();
            async move {
                match inputs {
                    Some(inputs) => request_flush(&inputs, overrides).await,
                    None => FlushOutcome::Unregistered,
                }
            }
        }));

        let inputs = self.inputs_weak.clone();
        self.commands.register(Command::Save, move |_| {
            if let Some(inputs) = inputs.upgrade() {
                let _ = inputs.send(SessionInput::Flush {
                    overrides: None,
                    reply: None,
                });
            }
        });

        self.recover_offline_edits();
        tracing::debug!(document = %self.id, client_id = %self.client_id, "session mounted");
    }

    /// Pick up a baseline left behind by a session that ended while offline.
    fn recover_offline_edits(&mut self) {
        match self.reconciler.baseline(&self.id) {
            Ok(Some(baseline)) => {
                tracing::info!(
                    document = %self.id,
                    captured_at = baseline.captured_at,
                    "found offline edits from an earlier session"
                );
                match self.reconciler.cached(&self.id) {
                    Ok(Some(cached)) if cached.state() != self.current => {
                        self.replace_state(cached.state(), Instant::now());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(document = %self.id, error = %e, "unreadable cache entry")
                    }
                }
                self.offline = true;
                let dirty = self.is_dirty();
                self.status.settle(dirty);
                self.reconcile_deadline = Some(Instant::now());
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(document = %self.id, error = %e, "unreadable offline baseline")
            }
        }
    }

    async fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::LocalEdit(snapshot) => {
                tracing::trace!(timestamp = snapshot.timestamp, "local edit");
                self.on_local_edit(snapshot.text);
            }
            SessionInput::MetadataEdit { title, tags } => self.on_metadata_edit(title, tags),
            SessionInput::LocalCursor(offset) => self.on_local_cursor(offset).await,
            SessionInput::Remote(bytes) => self.on_remote(&bytes),
            SessionInput::Connectivity(Connectivity::Offline) => self.go_offline(),
            SessionInput::Connectivity(Connectivity::Online) => self.come_online().await,
            SessionInput::Flush { overrides, reply } => self.request_flush(overrides, reply),
            // Handled by the loop.
            SessionInput::Unmount => {}
        }
    }

    fn on_local_edit(&mut self, text: String) {
        if text == self.current.content {
            return;
        }
        let now = Instant::now();
        self.current.content = text.clone();
        self.emitter.record_edit(text, now);
        self.schedule_cursor_observe(now);
        self.mark_dirty(now);
        // A reload before the emit debounce fires must still find the edit.
        if self.offline {
            self.write_cache();
        }
    }

    fn on_metadata_edit(&mut self, title: Option<SmolStr>, tags: Option<Vec<SmolStr>>) {
        let mut changed = false;
        if let Some(title) = title {
            if title != self.current.title {
                self.current.title = title;
                changed = true;
            }
        }
        if let Some(tags) = tags {
            if tags != self.current.tags {
                self.current.tags = tags;
                changed = true;
            }
        }
        if changed {
            self.mark_dirty(Instant::now());
            if self.offline {
                self.write_cache();
            }
        }
    }

    fn mark_dirty(&mut self, now: Instant) {
        self.status.local_edit();
        // Offline edits stay local until reconciliation.
        if !self.offline {
            self.save_deadline = Some(now + self.config.timing.save_debounce_window);
        }
    }

    async fn on_local_cursor(&mut self, offset: usize) {
        let offset = offset.min(self.current.content.chars().count());
        self.tracker.set_local_offset(offset);
        if self.offline || !self.transport.is_connected() {
            return;
        }
        if let Err(e) = self.transport.broadcast_cursor(offset, &self.username).await {
            tracing::debug!(error = %e, "failed to broadcast cursor");
        }
    }

    fn on_remote(&mut self, bytes: &[u8]) {
        let ReceivedMessage { from, message, .. } = match CollabMessage::decode(bytes) {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(
                    document = %self.id,
                    error = %e,
                    len = bytes.len(),
                    "ignoring malformed payload"
                );
                metrics::counter!("quire_sync_malformed_payloads_total").increment(1);
                return;
            }
        };
        if from == self.client_id {
            return;
        }

        match message {
            CollabMessage::Content { text } => self.on_remote_content(text, &from),
            CollabMessage::Cursor { .. } | CollabMessage::Join { .. } | CollabMessage::Leave => {
                self.schedule_cursor_observe(Instant::now());
            }
        }
    }

    /// Remote content wins over local state and counts as saved by its sender.
    fn on_remote_content(&mut self, text: String, from: &ClientId) {
        if self.offline {
            tracing::debug!(%from, "offline, ignoring remote content");
            return;
        }
        if text == self.emitter.last_emitted() || text == self.current.content {
            tracing::trace!(%from, "remote content matches ours");
            return;
        }

        tracing::debug!(document = %self.id, %from, len = text.len(), "adopting remote content");
        let now = Instant::now();
        let old = std::mem::replace(&mut self.current.content, text.clone());
        self.last_saved.content = text.clone();
        self.emitter.adopt(&text);
        self.tracker.remap_local(&old, &text);

        let dirty = self.is_dirty();
        self.status.settle(dirty);
        if !dirty {
            self.save_deadline = None;
        }
        self.send_event(SessionEvent::ApplyContent(text));
        self.schedule_cursor_observe(now);
    }

    fn go_offline(&mut self) {
        if self.offline {
            return;
        }
        tracing::info!(document = %self.id, "going offline");
        self.offline = true;
        self.save_deadline = None;
        self.reconcile_deadline = None;

        if let Err(e) = self.reconciler.go_offline(&self.id, &self.current) {
            tracing::warn!(document = %self.id, error = %e, "failed to store offline baseline");
        }
        if let Some(queued) = self.queued_flush.take() {
            reply_all(queued.waiters, FlushOutcome::Deferred);
        }
        let dirty = self.is_dirty();
        self.status.settle(dirty);
    }

    async fn come_online(&mut self) {
        if !self.offline {
            tracing::debug!(document = %self.id, "online signal while online");
            return;
        }
        self.try_reconcile().await;
    }

    async fn try_reconcile(&mut self) {
        let retry_at = Instant::now() + self.config.timing.reconcile_retry_window;
        self.reconcile_deadline = None;

        if self.saving.is_some() {
            self.reconcile_deadline = Some(retry_at);
            return;
        }
        if !self.connectivity.check().await {
            tracing::debug!(document = %self.id, "connectivity probe failed, staying offline");
            self.reconcile_deadline = Some(retry_at);
            return;
        }

        let payload = self.current.normalized();
        match self
            .reconciler
            .reconcile(self.persistence.as_ref(), &self.id, &payload)
            .await
        {
            Ok(outcome) => {
                self.offline = false;
                self.apply_reconcile(outcome, payload).await;
            }
            Err(e) => {
                tracing::warn!(document = %self.id, error = %e, "reconciliation failed, will retry");
                metrics::counter!("quire_sync_reconcile_failures_total").increment(1);
                self.reconcile_deadline = Some(retry_at);
            }
        }
    }

    async fn apply_reconcile(&mut self, outcome: ReconcileOutcome, pushed: EditableState) {
        let now = Instant::now();
        match outcome {
            ReconcileOutcome::NoBaseline => {
                if self.is_dirty() {
                    self.status.local_edit();
                    self.save_deadline = Some(now);
                }
            }
            ReconcileOutcome::Pushed => {
                tracing::info!(document = %self.id, "offline edits pushed");
                self.last_saved = pushed;
                let dirty = self.is_dirty();
                self.status.settle(dirty);
                if self.transport.is_connected() {
                    if let Err(e) = self.transport.emit_change(&self.last_saved.content).await {
                        tracing::debug!(error = %e, "failed to broadcast reconciled text");
                    }
                }
            }
            ReconcileOutcome::Forked {
                document_id,
                title,
                remote,
            } => {
                metrics::counter!("quire_sync_forks_total").increment(1);
                self.replace_state(remote.clone(), now);
                self.last_saved = remote;
                self.status.settle(false);
                self.write_cache();
                self.send_event(SessionEvent::Forked { document_id, title });
            }
        }
    }

    async fn on_timer(&mut self) {
        let now = Instant::now();

        if let Some(text) = self.emitter.take_due_emit(now) {
            self.emit(text, now).await;
        }
        if let Some(text) = self.emitter.take_due_echo(now) {
            self.apply_local_text(text, now);
        }
        if is_due(self.save_deadline, now) {
            self.save_deadline = None;
            // An edit during a save is picked up when that save finishes.
            if self.saving.is_none() {
                self.start_flush(None, Vec::new());
            }
        }
        if is_due(self.cursor_deadline, now) {
            self.cursor_deadline = None;
            self.observe_cursors();
        }
        if is_due(self.reconcile_deadline, now) && self.offline {
            self.try_reconcile().await;
        }
    }

    async fn emit(&mut self, text: String, now: Instant) {
        let connected = !self.offline && self.transport.is_connected();
        if connected {
            match self.transport.emit_change(&text).await {
                Ok(()) => metrics::counter!("quire_sync_emits_total").increment(1),
                Err(e) => tracing::warn!(document = %self.id, error = %e, "failed to broadcast change"),
            }
        }
        if let Some(text) = self.emitter.schedule_echo(text, now, connected) {
            self.apply_local_text(text, now);
        }
        self.write_cache();
    }

    /// Apply a text the session produced itself (normalization echo).
    fn apply_local_text(&mut self, text: String, now: Instant) {
        if text == self.current.content {
            return;
        }
        let old = std::mem::replace(&mut self.current.content, text.clone());
        self.tracker.remap_local(&old, &text);
        self.send_event(SessionEvent::ApplyContent(text));
        self.schedule_cursor_observe(now);
    }

    fn replace_state(&mut self, state: EditableState, now: Instant) {
        let old = std::mem::replace(&mut self.current, state.clone());
        self.emitter.adopt(&state.content);
        self.tracker.remap_local(&old.content, &state.content);
        self.send_event(SessionEvent::ReplaceState(state));
        self.schedule_cursor_observe(now);
    }

    fn request_flush(
        &mut self,
        overrides: Option<FlushOverride>,
        reply: Option<oneshot::Sender<FlushOutcome>>,
    ) {
        if self.saving.is_none() {
            self.start_flush(overrides, reply.into_iter().collect());
            return;
        }

        tracing::debug!(document = %self.id, "flush queued behind in-flight save");
        let queued = self.queued_flush.get_or_insert_with(|| QueuedFlush {
            overrides: None,
            waiters: Vec::new(),
        });
        // A later override supersedes an earlier one; a later plain request
        // doesn't discard it.
        if overrides.is_some() {
            queued.overrides = overrides;
        }
        queued.waiters.extend(reply);
    }

    fn start_flush(
        &mut self,
        overrides: Option<FlushOverride>,
        waiters: Vec<oneshot::Sender<FlushOutcome>>,
    ) {
        let now = Instant::now();
        if let Some(overrides) = overrides {
            let updated = overrides.apply(self.current.clone());
            if updated.content != self.current.content {
                self.emitter.record_edit(updated.content.clone(), now);
                self.schedule_cursor_observe(now);
            }
            self.current = updated;
        }
        self.save_deadline = None;

        if self.offline {
            tracing::debug!(document = %self.id, "offline, deferring flush");
            let dirty = self.is_dirty();
            self.status.settle(dirty);
            reply_all(waiters, FlushOutcome::Deferred);
            return;
        }

        let payload = self.current.normalized();
        if !payload.differs_from(&self.last_saved) {
            self.status.settle(false);
            reply_all(waiters, FlushOutcome::NoChanges);
            return;
        }
        if !self.status.begin_flush() {
            tracing::warn!(document = %self.id, "save already running");
            reply_all(waiters, FlushOutcome::Deferred);
            return;
        }

        tracing::debug!(document = %self.id, len = payload.content.len(), "saving");
        let persistence = self.persistence.clone();
        let connectivity = self.connectivity.clone();
        let id = self.id.clone();
        let update = DocumentUpdate::from(payload.clone());
        let save: SaveFuture = Box::pin(async move {
            if !connectivity.check().await {
                return Err(SyncError::Offline);
            }
            persistence.save_document(&id, update).await
        });
        self.saving = Some(save);
        self.in_flight = Some(SaveInFlight { payload, waiters });
    }

    fn on_save_done(&mut self, result: Result<(), SyncError>) {
        self.saving = None;
        let Some(SaveInFlight { payload, waiters }) = self.in_flight.take() else {
            return;
        };

        let outcome = match result {
            Ok(()) => {
                self.last_saved = payload;
                FlushOutcome::Saved
            }
            Err(SyncError::Offline) => {
                tracing::info!(document = %self.id, "connectivity lost before save");
                FlushOutcome::Deferred
            }
            Err(e) => {
                tracing::warn!(document = %self.id, error = %e, "save failed");
                FlushOutcome::Failed(e.to_string().into())
            }
        };
        metrics::counter!("quire_sync_saves_total", "outcome" => outcome_label(&outcome))
            .increment(1);

        let ok = outcome == FlushOutcome::Saved;
        let queued_edit = self.status.finish_flush(ok);
        let deferred = outcome == FlushOutcome::Deferred;
        reply_all(waiters, outcome);
        if deferred {
            self.go_offline();
        }

        let dirty = self.is_dirty();
        if let Some(queued) = self.queued_flush.take() {
            self.start_flush(queued.overrides, queued.waiters);
        } else if dirty && (ok || queued_edit) && !self.offline {
            // Exactly one follow-up flush for whatever changed meanwhile.
            self.status.local_edit();
            self.save_deadline = Some(Instant::now());
        } else {
            self.status.settle(dirty);
        }
    }

    fn observe_cursors(&mut self) {
        let remote = self.transport.remote_cursors();
        let cursors = self.tracker.observe(&self.current.content, &remote);
        self.send_event(SessionEvent::Cursors(cursors));
    }

    fn schedule_cursor_observe(&mut self, now: Instant) {
        if self.cursor_deadline.is_none() {
            self.cursor_deadline = Some(now + self.config.timing.mutation_coalesce_window);
        }
    }

    fn is_dirty(&self) -> bool {
        self.current.differs_from(&self.last_saved)
    }

    fn write_cache(&self) {
        if let Err(e) = self.reconciler.cache(&self.id, &self.current) {
            tracing::warn!(document = %self.id, error = %e, "failed to cache document");
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.emitter.next_deadline(),
            self.save_deadline,
            self.cursor_deadline,
            self.reconcile_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn publish_status(&mut self) {
        let status = self.status.status();
        if status != self.published {
            self.published = status;
            self.status_tx.send_replace(status);
            self.send_event(SessionEvent::Status(status));
        }
    }

    fn send_event(&self, event: SessionEvent) {
        // The UI may have stopped listening; the session keeps going regardless.
        let _ = self.events.send(event);
    }

    async fn unmount(mut self) {
        tracing::debug!(document = %self.id, "unmounting");
        self.save_deadline = None;
        self.cursor_deadline = None;
        self.reconcile_deadline = None;
        if self.emitter.has_pending() {
            tracing::debug!(document = %self.id, "dropping unsent edit broadcast");
        }
        self.emitter.clear();
        if self.offline || self.is_dirty() {
            self.write_cache();
        }

        if let Some(saving) = self.saving.take() {
            let result = saving.await;
            if let Some(in_flight) = self.in_flight.take() {
                let outcome = match result {
                    Ok(()) => FlushOutcome::Saved,
                    Err(SyncError::Offline) => FlushOutcome::Deferred,
                    Err(e) => FlushOutcome::Failed(e.to_string().into()),
                };
                reply_all(in_flight.waiters, outcome);
            }
        }

        // Both were registered together; a newer session that took over the
        // flush slot owns the save command as well.
        let released = self
            .registration
            .take()
            .is_some_and(|registration| self.flush_registry.release(registration));
        if released {
            self.commands.unregister(Command::Save);
        }

        if let Err(e) = self.transport.leave().await {
            tracing::debug!(error = %e, "failed to leave room");
        }

        if self.status.status() == SyncStatus::Synchronized && !self.offline {
            if let Err(e) = self.reconciler.clear_cache(&self.id) {
                tracing::warn!(document = %self.id, error = %e, "failed to clear cache entry");
            }
        }
    }
}

/// Handle to a running session, held by the UI.
///
/// Dropping the handle unmounts the session, same as [`unmount`](Self::unmount)
/// without waiting for it.
pub struct SessionHandle {
    id: DocumentId,
    inputs: mpsc::UnboundedSender<SessionInput>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    status: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn send(&self, input: SessionInput) -> Result<(), SyncError> {
        self.inputs.send(input).map_err(|_| SyncError::SessionClosed)
    }

    /// Report a new editor text.
    pub fn edit(&self, text: impl Into<String>) -> Result<(), SyncError> {
        self.send(SessionInput::LocalEdit(DocumentSnapshot::new(text)))
    }

    pub fn set_title(&self, title: impl Into<SmolStr>) -> Result<(), SyncError> {
        self.send(SessionInput::MetadataEdit {
            title: Some(title.into()),
            tags: None,
        })
    }

    pub fn set_tags(&self, tags: Vec<SmolStr>) -> Result<(), SyncError> {
        self.send(SessionInput::MetadataEdit {
            title: None,
            tags: Some(tags),
        })
    }

    pub fn move_cursor(&self, offset: usize) -> Result<(), SyncError> {
        self.send(SessionInput::LocalCursor(offset))
    }

    pub fn set_online(&self, online: bool) -> Result<(), SyncError> {
        self.send(SessionInput::Connectivity(if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }))
    }

    /// Save now and wait for the outcome.
    pub async fn flush(&self, overrides: Option<FlushOverride>) -> FlushOutcome {
        request_flush(&self.inputs, overrides).await
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// All events received so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop the session and wait until it has cleaned up.
    pub async fn unmount(self) {
        let _ = self.inputs.send(SessionInput::Unmount);
        if let Err(e) = self.task.await {
            tracing::error!(document = %self.id, error = %e, "session task panicked");
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

async fn request_flush(
    inputs: &mpsc::UnboundedSender<SessionInput>,
    overrides: Option<FlushOverride>,
) -> FlushOutcome {
    let (reply, outcome) = oneshot::channel();
    let sent = inputs.send(SessionInput::Flush {
        overrides,
        reply: Some(reply),
    });
    if sent.is_err() {
        return FlushOutcome::Unregistered;
    }
    outcome.await.unwrap_or(FlushOutcome::Unregistered)
}

fn reply_all(waiters: Vec<oneshot::Sender<FlushOutcome>>, outcome: FlushOutcome) {
    for waiter in waiters {
        let _ = waiter.send(outcome.clone());
    }
}

fn outcome_label(outcome: &FlushOutcome) -> &'static str {
    match outcome {
        FlushOutcome::Saved => "saved",
        FlushOutcome::NoChanges => "no_changes",
        FlushOutcome::Deferred => "deferred",
        FlushOutcome::Failed(_) => "failed",
        FlushOutcome::Unregistered => "unregistered",
    }
}

fn is_due(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|deadline| deadline <= now)
}

async fn wait_for_save(saving: &mut Option<SaveFuture>) -> Result<(), SyncError> {
    match saving.as_mut() {
        Some(save) => save.await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
