use crate::domain::entities::{
    Authorization, CreateShare, CreatedShare, LocationSample, ShareSettings,
};
use crate::domain::errors::SharingError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;
use url::Url;

// The sharing use case depends on these traits, not on concrete adapters.
// Dependencies point inwards to the domain layer.

// Port for the three protocol operations of a share server.
#[async_trait]
pub trait ShareServer: Send + Sync {
    async fn create(&self, base_url: &Url, req: &CreateShare)
    -> Result<CreatedShare, SharingError>;
    async fn post(
        &self,
        base_url: &Url,
        sample: &LocationSample,
        session_token: &str,
    ) -> Result<(), SharingError>;
    async fn stop(&self, base_url: &Url, session_token: &str) -> Result<(), SharingError>;
}

// Callback invoked for every sample; must return quickly.
pub type SampleHandler = Arc<dyn Fn(LocationSample) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

// Push-style producer of location samples.
pub trait LocationSource: Send + Sync {
    fn subscribe(&self, handler: SampleHandler) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
    fn authorization(&self) -> Authorization;
}

// Read-only access to persisted configuration.
pub trait SettingsStore: Send + Sync {
    fn settings(&self) -> ShareSettings;
}

// Best-effort local notification channel; may silently do nothing.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, title: &str, body: &str);
}

// Whether the observing surface is currently on screen.
pub trait SurfaceVisibility: Send + Sync {
    fn is_visible(&self) -> bool;
}

// Port for retrieving the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
