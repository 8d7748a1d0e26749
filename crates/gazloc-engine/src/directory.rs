//! The directory session: one event loop that owns the reconciler, the
//! current position and the listeners.
//!
//! Change events, refresh results and location fixes arrive on an inbound
//! channel; consumer requests arrive on a command channel. Both are drained
//! by a single task, so reconciliation steps never interleave. Teardown
//! cancels one [`CancellationToken`] shared with the change feed and the
//! tracker; every delivery path checks it, so nothing is reported after
//! [`DirectoryHandle::shutdown`] returns.

use std::sync::{Arc, Mutex, PoisonError};

use gazloc_cache::CacheStore;
use gazloc_core::{AppConfig, ChangeEvent, Position, VendorId, VendorSet};
use gazloc_remote::{RemoteDirectory, RemoteError, Subscription};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DirectoryError, LocationError};
use crate::location::{Fix, LocationTracker, PositionSource, TrackerHandle, WatchOptions};
use crate::ranking::{Filters, RankedVendor};
use crate::reconciler::{Reconciler, SnapshotOrigin, Transition};
use crate::search::{ranked_view, FuzzyMatcher};

type VendorSetListener = Box<dyn Fn(&VendorSet) + Send + Sync>;
type PositionListener = Box<dyn Fn(Position) + Send + Sync>;
type ErrorListener = Box<dyn Fn(&DirectoryError) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    vendor_set: Vec<VendorSetListener>,
    position: Vec<PositionListener>,
    error: Vec<ErrorListener>,
}

impl Listeners {
    fn vendor_set_changed(&self, token: &CancellationToken, vendors: &VendorSet) {
        for listener in &self.vendor_set {
            if token.is_cancelled() {
                return;
            }
            listener(vendors);
        }
    }

    fn position_changed(&self, token: &CancellationToken, position: Position) {
        for listener in &self.position {
            if token.is_cancelled() {
                return;
            }
            listener(position);
        }
    }

    fn error(&self, token: &CancellationToken, error: &DirectoryError) {
        for listener in &self.error {
            if token.is_cancelled() {
                return;
            }
            listener(error);
        }
    }
}

/// State of location tracking for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStatus {
    /// No source was supplied.
    Disabled,
    Tracking,
    /// Permission refused; ranking stays in natural order.
    Denied,
    Unavailable,
    /// The source stopped delivering.
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryStatus {
    pub warm: bool,
    pub origin: SnapshotOrigin,
    pub vendors: usize,
    pub location: LocationStatus,
    pub position: Option<Position>,
    pub selected: Option<VendorId>,
}

enum Inbound {
    Change(ChangeEvent),
    FeedFailed(RemoteError),
    Refreshed(Result<VendorSet, RemoteError>),
    Fix(Fix),
}

enum Command {
    Ranked {
        query: String,
        filters: Filters,
        reply: oneshot::Sender<Vec<RankedVendor>>,
    },
    Select {
        id: VendorId,
        reply: oneshot::Sender<Option<RankedVendor>>,
    },
    Position {
        reply: oneshot::Sender<Option<Position>>,
    },
    Status {
        reply: oneshot::Sender<DirectoryStatus>,
    },
    OnVendorSetChanged(VendorSetListener),
    OnPositionChanged(PositionListener),
    OnError(ErrorListener),
}

/// Configures and starts a directory session.
pub struct DirectoryBuilder {
    matcher: FuzzyMatcher,
    watch_options: WatchOptions,
    listeners: Listeners,
}

impl Default for DirectoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DirectoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryBuilder")
            .field("matcher", &self.matcher)
            .field("watch_options", &self.watch_options)
            .finish_non_exhaustive()
    }
}

impl DirectoryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            matcher: FuzzyMatcher::default(),
            watch_options: WatchOptions::default(),
            listeners: Listeners::default(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new()
            .with_fuzzy_threshold(config.fuzzy_threshold)
            .with_watch_options(WatchOptions::from_app_config(config))
    }

    #[must_use]
    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.matcher = FuzzyMatcher::new(threshold);
        self
    }

    #[must_use]
    pub fn with_watch_options(mut self, options: WatchOptions) -> Self {
        self.watch_options = options;
        self
    }

    #[must_use]
    pub fn on_vendor_set_changed(mut self, f: impl Fn(&VendorSet) + Send + Sync + 'static) -> Self {
        self.listeners.vendor_set.push(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_position_changed(mut self, f: impl Fn(Position) + Send + Sync + 'static) -> Self {
        self.listeners.position.push(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&DirectoryError) + Send + Sync + 'static) -> Self {
        self.listeners.error.push(Box::new(f));
        self
    }

    /// Bootstraps and starts the session.
    ///
    /// A cached snapshot is adopted before anything touches the network, so
    /// ranking is usable right away; the remote listing then refreshes it in
    /// the background. Without a cache the listing is awaited here. The
    /// change feed is opened once, and location tracking starts when a
    /// source is given. Failures along the way go to the error listeners and
    /// never prevent the session from starting.
    pub async fn start<S, R, P>(self, store: S, remote: R, source: Option<P>) -> DirectoryHandle
    where
        S: CacheStore,
        R: RemoteDirectory,
        P: PositionSource,
    {
        let token = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let remote = Arc::new(remote);
        let mut reconciler = Reconciler::new(store);

        let warm = match reconciler.adopt_cache().await {
            Ok(adopted) => adopted,
            Err(e) => {
                tracing::warn!(error = %e, "cached vendor set unreadable, starting cold");
                self.listeners.error(&token, &DirectoryError::Storage(e));
                false
            }
        };
        if warm {
            self.listeners
                .vendor_set_changed(&token, reconciler.vendors());
        }

        let subscription = open_feed(remote.as_ref(), &inbound_tx, &token);

        if warm {
            spawn_refresh(Arc::clone(&remote), inbound_tx.clone(), token.clone());
        } else {
            match remote.fetch_all().await {
                Ok(fetched) => {
                    let transition = reconciler.reconcile_snapshot(fetched).await;
                    report(&self.listeners, &token, &reconciler, transition);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "initial vendor fetch failed, waiting for change events");
                    self.listeners.error(&token, &DirectoryError::Network(e));
                }
            }
        }

        let (tracker, location) = match source {
            None => (None, LocationStatus::Disabled),
            Some(source) => {
                let fixes = inbound_tx.clone();
                let started = LocationTracker::start(
                    source,
                    self.watch_options,
                    token.child_token(),
                    move |fix| {
                        let _ = fixes.send(Inbound::Fix(fix));
                    },
                )
                .await;
                match started {
                    Ok(handle) => (Some(handle), LocationStatus::Tracking),
                    Err(e) => {
                        let status = if e == LocationError::PermissionDenied {
                            LocationStatus::Denied
                        } else {
                            LocationStatus::Unavailable
                        };
                        self.listeners.error(&token, &DirectoryError::Location(e));
                        (None, status)
                    }
                }
            }
        };
        drop(inbound_tx);

        tracing::info!(
            vendors = reconciler.vendors().len(),
            origin = ?reconciler.origin(),
            location = ?location,
            "directory session started"
        );

        let session = Session {
            reconciler,
            matcher: self.matcher,
            listeners: self.listeners,
            position: None,
            selected: None,
            location,
            subscription: Some(subscription),
            tracker,
            token: token.clone(),
        };
        let task = tokio::spawn(session.run(command_rx, inbound_rx));

        DirectoryHandle {
            commands: command_tx,
            token,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

fn open_feed<R: RemoteDirectory>(
    remote: &R,
    inbound: &mpsc::UnboundedSender<Inbound>,
    token: &CancellationToken,
) -> Subscription {
    let events = inbound.clone();
    let event_token = token.clone();
    let failures = inbound.clone();
    let failure_token = token.clone();
    remote.subscribe(
        move |event| {
            if !event_token.is_cancelled() {
                let _ = events.send(Inbound::Change(event));
            }
        },
        move |err| {
            if !failure_token.is_cancelled() {
                let _ = failures.send(Inbound::FeedFailed(err));
            }
        },
    )
}

fn spawn_refresh<R: RemoteDirectory>(
    remote: Arc<R>,
    inbound: mpsc::UnboundedSender<Inbound>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            result = remote.fetch_all() => {
                if !token.is_cancelled() {
                    let _ = inbound.send(Inbound::Refreshed(result));
                }
            }
        }
    });
}

fn report<S: CacheStore>(
    listeners: &Listeners,
    token: &CancellationToken,
    reconciler: &Reconciler<S>,
    transition: Transition,
) {
    if let Some(e) = transition.storage_error {
        listeners.error(token, &DirectoryError::Storage(e));
    }
    if transition.changed {
        listeners.vendor_set_changed(token, reconciler.vendors());
    }
}

struct Session<S> {
    reconciler: Reconciler<S>,
    matcher: FuzzyMatcher,
    listeners: Listeners,
    position: Option<Position>,
    selected: Option<VendorId>,
    location: LocationStatus,
    subscription: Option<Subscription>,
    tracker: Option<TrackerHandle>,
    token: CancellationToken,
}

impl<S: CacheStore> Session<S> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
    ) {
        loop {
            tokio::select! {
                biased;

                () = self.token.cancelled() => break,

                message = inbound.recv() => match message {
                    Some(message) => self.handle_inbound(message).await,
                    None => {
                        // Feed, tracker and refresh are all gone; keep serving
                        // commands from what we have.
                        self.serve_commands(&mut commands).await;
                        break;
                    }
                },

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("all directory handles dropped");
                        break;
                    }
                },
            }
        }
        self.teardown().await;
    }

    async fn serve_commands(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => return,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => return,
                },
            }
        }
    }

    async fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Change(event) => {
                let transition = self.reconciler.apply_event(event).await;
                report(&self.listeners, &self.token, &self.reconciler, transition);
            }
            Inbound::FeedFailed(e) => {
                self.listeners
                    .error(&self.token, &DirectoryError::Network(e));
            }
            Inbound::Refreshed(Ok(fetched)) => {
                let transition = self.reconciler.reconcile_snapshot(fetched).await;
                report(&self.listeners, &self.token, &self.reconciler, transition);
            }
            Inbound::Refreshed(Err(e)) => {
                tracing::warn!(error = %e, "background refresh failed, keeping cached vendor set");
                self.listeners
                    .error(&self.token, &DirectoryError::Network(e));
            }
            Inbound::Fix(fix) => {
                self.position = Some(fix.position);
                self.listeners
                    .position_changed(&self.token, fix.position);
            }
        }
        if self.location == LocationStatus::Tracking
            && self.tracker.as_ref().is_some_and(TrackerHandle::is_stopped)
        {
            self.location = LocationStatus::Ended;
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Ranked {
                query,
                filters,
                reply,
            } => {
                let view = ranked_view(
                    self.reconciler.vendors(),
                    self.position,
                    &query,
                    &filters,
                    &self.matcher,
                );
                let _ = reply.send(view);
            }
            Command::Select { id, reply } => {
                let selected = ranked_view(
                    self.reconciler.vendors(),
                    self.position,
                    "",
                    &Filters::any(),
                    &self.matcher,
                )
                .into_iter()
                .find(|r| r.record.id == id);
                if selected.is_some() {
                    tracing::debug!(vendor = %id, "vendor selected");
                    self.selected = Some(id);
                }
                let _ = reply.send(selected);
            }
            Command::Position { reply } => {
                let _ = reply.send(self.position);
            }
            Command::Status { reply } => {
                let _ = reply.send(DirectoryStatus {
                    warm: self.reconciler.is_warm(),
                    origin: self.reconciler.origin(),
                    vendors: self.reconciler.vendors().len(),
                    location: self.location,
                    position: self.position,
                    selected: self.selected.clone(),
                });
            }
            Command::OnVendorSetChanged(f) => self.listeners.vendor_set.push(f),
            Command::OnPositionChanged(f) => self.listeners.position.push(f),
            Command::OnError(f) => self.listeners.error.push(f),
        }
    }

    async fn teardown(&mut self) {
        self.token.cancel();
        if let Some(tracker) = self.tracker.take() {
            tracker.stop();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.shutdown().await;
        }
        tracing::info!("directory session stopped");
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct DirectoryHandle {
    commands: mpsc::UnboundedSender<Command>,
    token: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DirectoryHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DirectoryError> {
        if self.token.is_cancelled() {
            return Err(DirectoryError::Closed);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| DirectoryError::Closed)?;
        response.await.map_err(|_| DirectoryError::Closed)
    }

    /// Current view: `query` narrows, `filters` select, distance orders.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::Closed`] after shutdown.
    pub async fn ranked_vendors(
        &self,
        query: &str,
        filters: &Filters,
    ) -> Result<Vec<RankedVendor>, DirectoryError> {
        let query = query.to_owned();
        let filters = filters.clone();
        self.request(|reply| Command::Ranked {
            query,
            filters,
            reply,
        })
        .await
    }

    /// Marks `id` as the selected vendor and returns it with its distance.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownVendor`] if no such vendor is known,
    /// [`DirectoryError::Closed`] after shutdown.
    pub async fn select_vendor(&self, id: &VendorId) -> Result<RankedVendor, DirectoryError> {
        let key = id.clone();
        self.request(|reply| Command::Select { id: key, reply })
            .await?
            .ok_or_else(|| DirectoryError::UnknownVendor(id.clone()))
    }

    /// # Errors
    ///
    /// [`DirectoryError::Closed`] after shutdown.
    pub async fn position(&self) -> Result<Option<Position>, DirectoryError> {
        self.request(|reply| Command::Position { reply }).await
    }

    /// # Errors
    ///
    /// [`DirectoryError::Closed`] after shutdown.
    pub async fn status(&self) -> Result<DirectoryStatus, DirectoryError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// # Errors
    ///
    /// [`DirectoryError::Closed`] after shutdown.
    pub fn on_vendor_set_changed(
        &self,
        f: impl Fn(&VendorSet) + Send + Sync + 'static,
    ) -> Result<(), DirectoryError> {
        self.register(Command::OnVendorSetChanged(Box::new(f)))
    }

    /// # Errors
    ///
    /// [`DirectoryError::Closed`] after shutdown.
    pub fn on_position_changed(
        &self,
        f: impl Fn(Position) + Send + Sync + 'static,
    ) -> Result<(), DirectoryError> {
        self.register(Command::OnPositionChanged(Box::new(f)))
    }

    /// # Errors
    ///
    /// [`DirectoryError::Closed`] after shutdown.
    pub fn on_error(
        &self,
        f: impl Fn(&DirectoryError) + Send + Sync + 'static,
    ) -> Result<(), DirectoryError> {
        self.register(Command::OnError(Box::new(f)))
    }

    fn register(&self, command: Command) -> Result<(), DirectoryError> {
        if self.token.is_cancelled() {
            return Err(DirectoryError::Closed);
        }
        self.commands
            .send(command)
            .map_err(|_| DirectoryError::Closed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the session and waits for the change feed and tracker to wind
    /// down. Idempotent.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "directory session task ended abnormally");
            }
        }
    }
}
