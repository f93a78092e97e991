use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Notify;
use url::Url;

use crate::domain::{
    Authorization, Clock, CreateShare, CreatedShare, LocationSample, LocationSource,
    NotificationSink, SampleHandler, ShareServer, ShareSettings, SharingError,
    SharingStatus, SubscriptionId, SurfaceVisibility,
};
use crate::interface_adapters::settings::StaticSettings;
use crate::use_cases::sharing::{SharingDeps, SharingManager, SharingTuning};

const WAIT: Duration = Duration::from_secs(5);

// Shared fixed time source so expiry assertions are deterministic.
pub(crate) struct FixedClock(pub(crate) SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

pub(crate) struct FlagVisibility(AtomicBool);

impl SurfaceVisibility for FlagVisibility {
    fn is_visible(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    delivered: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn deliver(&self, title: &str, body: &str) {
        let mut guard = self.delivered.lock().expect("notifier mutex poisoned");
        guard.push((title.to_string(), body.to_string()));
    }
}

// Location source driven by the test through emit().
pub(crate) struct ManualLocationSource {
    handlers: Mutex<HashMap<SubscriptionId, SampleHandler>>,
    authorization: Mutex<Authorization>,
    next_id: AtomicU64,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
}

impl ManualLocationSource {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            authorization: Mutex::new(Authorization::Always),
            next_id: AtomicU64::new(1),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn emit(&self, sample: LocationSample) {
        let handlers: Vec<SampleHandler> = self
            .handlers
            .lock()
            .expect("handlers mutex poisoned")
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler(sample.clone());
        }
    }

    pub(crate) fn set_authorization(&self, authorization: Authorization) {
        *self.authorization.lock().expect("authorization mutex poisoned") = authorization;
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl LocationSource for ManualLocationSource {
    fn subscribe(&self, handler: SampleHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.handlers.lock().expect("handlers mutex poisoned");
        guard.insert(id, handler);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.handlers.lock().expect("handlers mutex poisoned");
        guard.remove(&id);
    }

    fn authorization(&self) -> Authorization {
        *self.authorization.lock().expect("authorization mutex poisoned")
    }
}

pub(crate) enum CreateScript {
    Ok(CreatedShare),
    Err(SharingError),
    // Never answers; only cancellation ends the call.
    Hang,
    // Answers once the test opens the gate.
    Gated(Arc<Notify>, CreatedShare),
}

// Server fake: scripted create/post outcomes, records every call.
pub(crate) struct ScriptedServer {
    creates: Mutex<VecDeque<CreateScript>>,
    posts: Mutex<VecDeque<Result<(), SharingError>>>,
    stop_result: Mutex<Result<(), SharingError>>,
    create_calls: Mutex<Vec<(Url, CreateShare)>>,
    post_calls: Mutex<Vec<(LocationSample, String)>>,
    stop_calls: Mutex<Vec<String>>,
}

impl ScriptedServer {
    pub(crate) fn new() -> Self {
        Self {
            creates: Mutex::new(VecDeque::new()),
            posts: Mutex::new(VecDeque::new()),
            stop_result: Mutex::new(Ok(())),
            create_calls: Mutex::new(Vec::new()),
            post_calls: Mutex::new(Vec::new()),
            stop_calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script_create(&self, script: CreateScript) {
        self.creates
            .lock()
            .expect("creates mutex poisoned")
            .push_back(script);
    }

    pub(crate) fn script_post(&self, result: Result<(), SharingError>) {
        self.posts
            .lock()
            .expect("posts mutex poisoned")
            .push_back(result);
    }

    pub(crate) fn fail_stop(&self, err: SharingError) {
        *self.stop_result.lock().expect("stop mutex poisoned") = Err(err);
    }

    pub(crate) fn create_calls(&self) -> Vec<(Url, CreateShare)> {
        self.create_calls
            .lock()
            .expect("create calls mutex poisoned")
            .clone()
    }

    pub(crate) fn post_calls(&self) -> Vec<(LocationSample, String)> {
        self.post_calls
            .lock()
            .expect("post calls mutex poisoned")
            .clone()
    }

    pub(crate) fn stop_calls(&self) -> Vec<String> {
        self.stop_calls
            .lock()
            .expect("stop calls mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl ShareServer for ScriptedServer {
    async fn create(
        &self,
        base_url: &Url,
        req: &CreateShare,
    ) -> Result<CreatedShare, SharingError> {
        self.create_calls
            .lock()
            .expect("create calls mutex poisoned")
            .push((base_url.clone(), req.clone()));
        let script = self
            .creates
            .lock()
            .expect("creates mutex poisoned")
            .pop_front();
        match script {
            Some(CreateScript::Ok(created)) => Ok(created),
            Some(CreateScript::Err(err)) => Err(err),
            Some(CreateScript::Hang) => std::future::pending().await,
            Some(CreateScript::Gated(gate, created)) => {
                gate.notified().await;
                Ok(created)
            }
            None => Ok(default_created()),
        }
    }

    async fn post(
        &self,
        _base_url: &Url,
        sample: &LocationSample,
        session_token: &str,
    ) -> Result<(), SharingError> {
        self.post_calls
            .lock()
            .expect("post calls mutex poisoned")
            .push((sample.clone(), session_token.to_string()));
        self.posts
            .lock()
            .expect("posts mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn stop(&self, _base_url: &Url, session_token: &str) -> Result<(), SharingError> {
        self.stop_calls
            .lock()
            .expect("stop calls mutex poisoned")
            .push(session_token.to_string());
        self.stop_result.lock().expect("stop mutex poisoned").clone()
    }
}

pub(crate) fn created(token: &str, share_url: &str, viewer_id: &str) -> CreatedShare {
    CreatedShare {
        session_token: token.to_string(),
        share_url: Url::parse(share_url).expect("valid share url"),
        viewer_id: viewer_id.to_string(),
    }
}

fn default_created() -> CreatedShare {
    created("TOK123", "https://h.example/s/abc", "V9")
}

pub(crate) fn sample(latitude: f64, longitude: f64) -> LocationSample {
    LocationSample {
        latitude,
        longitude,
        accuracy: 5.0,
        speed: 1.0,
        timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    }
}

pub(crate) fn tuning() -> SharingTuning {
    SharingTuning {
        command_channel_capacity: 8,
        max_inflight_uploads: 4,
        end_message_ttl: Duration::from_secs(3),
        stop_timeout: Duration::from_secs(1),
    }
}

// A manager wired to fakes the test can inspect.
pub(crate) struct Harness {
    pub manager: SharingManager,
    pub server: Arc<ScriptedServer>,
    pub location: Arc<ManualLocationSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub visibility: Arc<FlagVisibility>,
    pub now: SystemTime,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_settings(ShareSettings {
            server_url: Some("https://h.example/".to_string()),
            ..ShareSettings::default()
        })
    }

    pub(crate) fn with_settings(settings: ShareSettings) -> Self {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let server = Arc::new(ScriptedServer::new());
        let location = Arc::new(ManualLocationSource::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let visibility = Arc::new(FlagVisibility(AtomicBool::new(true)));

        let manager = SharingManager::spawn(
            SharingDeps {
                server: server.clone(),
                location: location.clone(),
                settings: Arc::new(StaticSettings::new(settings)),
                notifications: notifier.clone(),
                visibility: visibility.clone(),
                clock: Arc::new(FixedClock(now)),
            },
            tuning(),
        );

        Self {
            manager,
            server,
            location,
            notifier,
            visibility,
            now,
        }
    }

    // Pretend the observing surface is off screen.
    pub(crate) fn hidden(self) -> Self {
        self.visibility.0.store(false, Ordering::SeqCst);
        self
    }
}

// Poll until `condition` holds, failing the test after a generous timeout.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub(crate) async fn wait_for_status(
    manager: &SharingManager,
    mut predicate: impl FnMut(&SharingStatus) -> bool,
) -> SharingStatus {
    let mut status = manager.subscribe();
    tokio::time::timeout(WAIT, async {
        status
            .wait_for(|current| predicate(current))
            .await
            .map(|current| current.clone())
    })
    .await
    .expect("status not reached in time")
    .expect("sharing actor stopped")
}
