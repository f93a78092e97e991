// Share lifecycle: create a session, upload samples while it lives, stop it.
//
// All session state is owned by a single actor task. Callers talk to it through
// `SharingManager`, a cloneable handle; observers read the published status.

use crate::domain::{
    Clock, ConfigurationError, CreateShare, CreatedShare, EndMessage, EndReason, LocationSample,
    LocationSource, NotificationSink, SampleHandler, SettingsStore, Share, ShareServer,
    ShareSnapshot, SharingError, SharingPhase, SharingStatus, SubscriptionId, SurfaceVisibility,
};
use crate::use_cases::end_message::EndMessageSlot;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Collaborators injected into the sharing actor.
pub struct SharingDeps {
    pub server: Arc<dyn ShareServer>,
    pub location: Arc<dyn LocationSource>,
    pub settings: Arc<dyn SettingsStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub visibility: Arc<dyn SurfaceVisibility>,
    pub clock: Arc<dyn Clock>,
}

/// Runtime limits for the sharing actor.
#[derive(Debug, Clone)]
pub struct SharingTuning {
    /// Capacity for caller commands waiting on the actor.
    pub command_channel_capacity: usize,
    /// Upper bound on uploads running at the same time.
    pub max_inflight_uploads: usize,
    /// How long the end message stays visible.
    pub end_message_ttl: Duration,
    /// Time allowed for the best-effort stop call.
    pub stop_timeout: Duration,
}

// About 30 years; used when a deadline cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

type StartReply = oneshot::Sender<Result<ShareSnapshot, SharingError>>;

enum Command {
    Start {
        duration: Duration,
        reply: StartReply,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    DismissError,
}

// Completions and samples fed back into the actor. `generation` ties each
// event to the session that produced it so stale ones can be dropped.
enum Event {
    Created {
        generation: u64,
        base_url: Url,
        result: Result<CreatedShare, SharingError>,
    },
    Sample {
        generation: u64,
        sample: LocationSample,
    },
    Uploaded {
        generation: u64,
        result: Result<(), SharingError>,
    },
}

/// Handle to the sharing actor. Dropping every clone shuts the actor down.
#[derive(Clone)]
pub struct SharingManager {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SharingStatus>,
}

impl SharingManager {
    /// Spawns the actor on the current runtime and returns its handle.
    pub fn spawn(deps: SharingDeps, tuning: SharingTuning) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(tuning.command_channel_capacity);
        let (status_tx, status_rx) = watch::channel(SharingStatus::default());

        let actor = SharingActor::new(deps, tuning, status_tx);
        tokio::spawn(actor.run(commands_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Creates a share lasting `duration` and resolves once it is live.
    ///
    /// A later call supersedes this one while it is still in flight; the
    /// superseded call resolves with [`SharingError::Cancelled`].
    pub async fn start_sharing(&self, duration: Duration) -> Result<ShareSnapshot, SharingError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start { duration, reply })
            .await
            .map_err(|_| SharingError::Cancelled)?;
        rx.await.unwrap_or(Err(SharingError::Cancelled))
    }

    /// Ends the current share, if any. Resolves after local teardown and the
    /// best-effort server stop.
    pub async fn stop_sharing(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn dismiss_error(&self) {
        let _ = self.commands.send(Command::DismissError).await;
    }

    pub fn status(&self) -> SharingStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SharingStatus> {
        self.status.clone()
    }
}

// Caller waiting on an in-flight create.
struct PendingStart {
    generation: u64,
    cancel: CancellationToken,
    reply: StartReply,
}

struct SharingActor {
    deps: SharingDeps,
    tuning: SharingTuning,
    status_tx: watch::Sender<SharingStatus>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    phase: SharingPhase,
    share: Option<Share>,
    last_error: Option<SharingError>,
    end_message: EndMessageSlot,
    generation: u64,
    pending: Option<PendingStart>,
    subscription: Option<SubscriptionId>,
    // Parent of every upload token for the live session.
    session_cancel: CancellationToken,
    uploads: JoinSet<()>,
    upload_permits: Arc<Semaphore>,
    expiry_deadline: Option<Instant>,
}

impl SharingActor {
    fn new(
        deps: SharingDeps,
        tuning: SharingTuning,
        status_tx: watch::Sender<SharingStatus>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            end_message: EndMessageSlot::new(tuning.end_message_ttl),
            upload_permits: Arc::new(Semaphore::new(tuning.max_inflight_uploads.max(1))),
            deps,
            tuning,
            status_tx,
            events_tx,
            events_rx,
            phase: SharingPhase::Idle,
            share: None,
            last_error: None,
            generation: 0,
            pending: None,
            subscription: None,
            session_cancel: CancellationToken::new(),
            uploads: JoinSet::new(),
            expiry_deadline: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                _ = wait_until(self.expiry_deadline) => {
                    tracing::info!("share reached its expiry time");
                    self.end_session(EndReason::Expired).await;
                }
                _ = wait_until(self.end_message.deadline()) => {
                    if self.end_message.expire(Instant::now()) {
                        self.publish();
                    }
                }
                Some(joined) = self.uploads.join_next(), if !self.uploads.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            tracing::error!(error = %err, "upload task panicked");
                        }
                    }
                }
            }
        }

        // Every handle is gone: release the session without announcing it.
        self.teardown().await;
        tracing::debug!("sharing actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { duration, reply } => self.start(duration, reply).await,
            Command::Stop { reply } => {
                self.end_session(EndReason::Stopped).await;
                let _ = reply.send(());
            }
            Command::DismissError => {
                self.last_error = None;
                self.publish();
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Created {
                generation,
                base_url,
                result,
            } => self.on_created(generation, base_url, result),
            Event::Sample { generation, sample } => self.on_sample(generation, sample),
            Event::Uploaded { generation, result } => {
                if generation == self.generation {
                    self.on_uploaded(result).await;
                }
            }
        }
    }

    async fn start(&mut self, duration: Duration, reply: StartReply) {
        // A rejected request leaves any running share untouched.
        let (base_url, create, expiry) = match self.prepare(duration) {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(error = %err, "cannot start sharing");
                self.last_error = Some(err.clone());
                self.publish();
                let _ = reply.send(Err(err));
                return;
            }
        };

        // Supersede an in-flight attempt, or renew a live share.
        self.teardown().await;
        self.last_error = None;

        let share = Share::new(Uuid::new_v4().to_string(), base_url.clone(), expiry);
        tracing::info!(
            share_id = %share.id,
            duration_secs = create.duration_secs,
            "creating share"
        );
        self.share = Some(share);
        self.phase = SharingPhase::Initializing;
        self.publish();

        let generation = self.generation;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let server = Arc::clone(&self.deps.server);
        let events = self.events_tx.clone();
        let grace = self.tuning.stop_timeout;
        tokio::spawn(async move {
            let request = server.create(&base_url, &create);
            tokio::pin!(request);
            let result = tokio::select! {
                result = &mut request => result,
                _ = token.cancelled() => {
                    // The server may already have accepted it; give the reply a short
                    // window so the abandoned session can be stopped.
                    if let Ok(Ok(created)) = tokio::time::timeout(grace, request).await {
                        stop_orphan(server.as_ref(), &base_url, &created.session_token, grace)
                            .await;
                    }
                    return;
                }
            };
            let _ = events.send(Event::Created {
                generation,
                base_url: base_url.clone(),
                result,
            });
        });

        self.pending = Some(PendingStart {
            generation,
            cancel,
            reply,
        });
    }

    fn prepare(
        &self,
        duration: Duration,
    ) -> Result<(Url, CreateShare, SystemTime), SharingError> {
        if duration < Duration::from_secs(1) {
            return Err(SharingError::InvalidDuration);
        }
        let expiry = self
            .deps
            .clock
            .now()
            .checked_add(duration)
            .ok_or(SharingError::InvalidDuration)?;

        let settings = self.deps.settings.settings();
        let base_url = parse_server_url(settings.server_url.as_deref())?;

        if self.deps.location.authorization().is_refused() {
            return Err(SharingError::LocationUnauthorized);
        }

        Ok((
            base_url,
            CreateShare {
                duration_secs: duration.as_secs(),
                update_interval: settings.update_interval(),
                link_id: settings.link_id,
                username: settings.username,
                password: settings.password,
            },
            expiry,
        ))
    }

    fn on_created(
        &mut self,
        generation: u64,
        base_url: Url,
        result: Result<CreatedShare, SharingError>,
    ) {
        let Some(pending) = self.pending.take_if(|pending| pending.generation == generation)
        else {
            // The attempt was superseded after the server already accepted it.
            if let Ok(created) = result {
                self.spawn_orphan_stop(base_url, created.session_token);
            }
            return;
        };

        let created = match result {
            Ok(created) => created,
            Err(err) => {
                tracing::warn!(error = %err, "share creation failed");
                self.share = None;
                self.phase = SharingPhase::Idle;
                if err.is_surfaced() {
                    self.last_error = Some(err.clone());
                }
                self.publish();
                let _ = pending.reply.send(Err(err));
                return;
            }
        };

        let Some(share) = self.share.as_mut() else {
            let _ = pending.reply.send(Err(SharingError::Cancelled));
            return;
        };
        share.activate(created);
        let snapshot = share.snapshot();
        let remaining = share
            .expiry
            .duration_since(self.deps.clock.now())
            .unwrap_or(Duration::ZERO);

        self.phase = SharingPhase::Active;
        self.session_cancel = CancellationToken::new();
        self.expiry_deadline = Some(deadline_after(remaining));

        let events = self.events_tx.clone();
        let handler: SampleHandler = Arc::new(move |sample: LocationSample| {
            let _ = events.send(Event::Sample { generation, sample });
        });
        self.subscription = Some(self.deps.location.subscribe(handler));

        tracing::info!(
            share_id = %snapshot.id,
            share_url = %snapshot.share_url,
            "share is live"
        );
        self.publish();
        let _ = pending.reply.send(Ok(snapshot));
    }

    fn on_sample(&mut self, generation: u64, sample: LocationSample) {
        if generation != self.generation || self.phase != SharingPhase::Active {
            return;
        }
        let Some(share) = self.share.as_mut() else {
            return;
        };
        let Some(session_token) = share.session_token.clone() else {
            return;
        };
        let base_url = share.base_url.clone();
        share.record(sample.clone());

        // Uploads are independent: no ordering between them, bounded by permits.
        let server = Arc::clone(&self.deps.server);
        let permits = Arc::clone(&self.upload_permits);
        let cancel = self.session_cancel.child_token();
        let events = self.events_tx.clone();
        self.uploads.spawn(async move {
            let upload = async {
                let Ok(_permit) = permits.acquire().await else {
                    return Err(SharingError::Cancelled);
                };
                server.post(&base_url, &sample, &session_token).await
            };
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = upload => result,
            };
            let _ = events.send(Event::Uploaded { generation, result });
        });

        self.publish();
    }

    async fn on_uploaded(&mut self, result: Result<(), SharingError>) {
        match result {
            Ok(()) => tracing::trace!("location uploaded"),
            Err(SharingError::SessionExpired) => {
                tracing::info!("server reports the share has expired");
                self.end_session(EndReason::Expired).await;
            }
            Err(SharingError::Cancelled) => {}
            Err(err) => {
                tracing::warn!(error = %err, "location upload failed");
                self.last_error = Some(err);
                self.publish();
            }
        }
    }

    async fn end_session(&mut self, reason: EndReason) {
        let had_share = self.share.is_some();
        self.teardown().await;
        if had_share {
            self.announce(reason);
        }
        self.publish();
    }

    // Release everything held for the current share. The location
    // subscription goes first, before any network call.
    async fn teardown(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.deps.location.unsubscribe(id);
        }
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
            let _ = pending.reply.send(Err(SharingError::Cancelled));
        }
        self.session_cancel.cancel();
        self.uploads.abort_all();
        self.expiry_deadline = None;
        self.generation += 1;

        let stop_target = self.share.as_ref().and_then(|share| {
            share
                .session_token
                .clone()
                .map(|token| (share.id.clone(), share.base_url.clone(), token))
        });
        if let Some((share_id, base_url, token)) = stop_target {
            self.phase = SharingPhase::Stopping;
            self.publish();
            let stop = self.deps.server.stop(&base_url, &token);
            match tokio::time::timeout(self.tuning.stop_timeout, stop).await {
                Ok(Ok(())) => tracing::info!(%share_id, "share stopped on server"),
                Ok(Err(err)) => {
                    tracing::warn!(%share_id, error = %err, "failed to stop share on server")
                }
                Err(_) => tracing::warn!(%share_id, "timed out stopping share on server"),
            }
        }

        self.share = None;
        self.phase = SharingPhase::Idle;
    }

    fn spawn_orphan_stop(&self, base_url: Url, session_token: String) {
        let server = Arc::clone(&self.deps.server);
        let timeout = self.tuning.stop_timeout;
        tokio::spawn(async move {
            stop_orphan(server.as_ref(), &base_url, &session_token, timeout).await;
        });
    }

    fn announce(&mut self, reason: EndReason) {
        let message = EndMessage::for_reason(reason);
        if !self.deps.visibility.is_visible() {
            self.deps
                .notifications
                .deliver(&message.title, &message.body);
        }
        self.end_message.set(message, Instant::now());
    }

    fn publish(&self) {
        self.status_tx.send_replace(SharingStatus {
            phase: self.phase,
            current_share: self.share.as_ref().map(Share::snapshot),
            last_error: self.last_error.clone(),
            end_message: self.end_message.current().cloned(),
        });
    }
}

// Best-effort stop for a session nobody is waiting on anymore.
async fn stop_orphan(
    server: &dyn ShareServer,
    base_url: &Url,
    session_token: &str,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, server.stop(base_url, session_token)).await {
        Ok(Ok(())) => tracing::info!("stopped superseded share"),
        _ => tracing::warn!("failed to stop superseded share"),
    }
}

// Saturates to a far-future instant when `after` is too large to represent.
fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Validates the configured server root: present, parseable and http(s).
pub fn parse_server_url(raw: Option<&str>) -> Result<Url, SharingError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(SharingError::Configuration(
            ConfigurationError::MissingServerUrl,
        ))?;

    let url = Url::parse(raw).map_err(|err| {
        SharingError::Configuration(ConfigurationError::InvalidServerUrl(err.to_string()))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SharingError::Configuration(
            ConfigurationError::InvalidServerUrl(format!("unsupported scheme {scheme:?}")),
        )),
    }
}
