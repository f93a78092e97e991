use crate::domain::errors::SharingError;
use serde::Deserialize;
use std::time::SystemTime;
use url::Url;

// A single position fix as delivered by the location source.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    // Horizontal accuracy in metres.
    pub accuracy: f64,
    // Speed in m/s; negative means the source could not tell.
    pub speed: f64,
    pub timestamp: SystemTime,
}

// Authorization state reported by the location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    NotDetermined,
    Denied,
    Restricted,
    WhenInUse,
    Always,
}

impl Authorization {
    pub fn is_refused(self) -> bool {
        matches!(self, Authorization::Denied | Authorization::Restricted)
    }
}

// User configuration consumed when a share is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShareSettings {
    pub server_url: Option<String>,
    pub username: String,
    pub password: String,
    pub link_id: String,
    pub update_interval: u32,
}

impl ShareSettings {
    pub const MIN_UPDATE_INTERVAL: u32 = 1;
    pub const MAX_UPDATE_INTERVAL: u32 = 60;

    pub fn update_interval(&self) -> u32 {
        self.update_interval
            .clamp(Self::MIN_UPDATE_INTERVAL, Self::MAX_UPDATE_INTERVAL)
    }
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            username: String::new(),
            password: String::new(),
            link_id: String::new(),
            update_interval: 1,
        }
    }
}

// Parameters of the create call, derived from settings plus the requested duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateShare {
    pub duration_secs: u64,
    pub link_id: String,
    pub username: String,
    pub password: String,
    pub update_interval: u32,
}

// What the server hands back from a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedShare {
    pub session_token: String,
    pub share_url: Url,
    pub viewer_id: String,
}

/// The single share owned by the sharing actor.
///
/// `share_url` starts out equal to `base_url` and is replaced exactly once,
/// when the create call succeeds.
#[derive(Debug, Clone)]
pub struct Share {
    pub id: String,
    pub base_url: Url,
    pub share_url: Url,
    pub session_token: Option<String>,
    pub viewer_id: Option<String>,
    pub expiry: SystemTime,
    // Samples handed to the upload path so far, and the latest of them.
    pub samples_received: usize,
    pub last_sample: Option<LocationSample>,
}

impl Share {
    pub fn new(id: String, base_url: Url, expiry: SystemTime) -> Self {
        Self {
            id,
            share_url: base_url.clone(),
            base_url,
            session_token: None,
            viewer_id: None,
            expiry,
            samples_received: 0,
            last_sample: None,
        }
    }

    pub fn activate(&mut self, created: CreatedShare) {
        self.share_url = created.share_url;
        self.session_token = Some(created.session_token);
        self.viewer_id = Some(created.viewer_id);
    }

    pub fn is_live(&self) -> bool {
        self.share_url != self.base_url
    }

    pub fn record(&mut self, sample: LocationSample) {
        self.samples_received += 1;
        self.last_sample = Some(sample);
    }

    pub fn snapshot(&self) -> ShareSnapshot {
        ShareSnapshot {
            id: self.id.clone(),
            base_url: self.base_url.clone(),
            share_url: self.share_url.clone(),
            viewer_id: self.viewer_id.clone(),
            expiry: self.expiry,
            samples_received: self.samples_received,
            last_update: self.last_sample.as_ref().map(|sample| sample.timestamp),
        }
    }
}

// Read-only view of the current share for observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareSnapshot {
    pub id: String,
    pub base_url: Url,
    pub share_url: Url,
    pub viewer_id: Option<String>,
    pub expiry: SystemTime,
    pub samples_received: usize,
    pub last_update: Option<SystemTime>,
}

impl ShareSnapshot {
    pub fn is_live(&self) -> bool {
        self.share_url != self.base_url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPhase {
    Idle,
    Initializing,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Stopped,
    Expired,
}

// Transient message shown after a share ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndMessage {
    pub reason: EndReason,
    pub title: String,
    pub body: String,
}

impl EndMessage {
    pub fn for_reason(reason: EndReason) -> Self {
        let (title, body) = match reason {
            EndReason::Stopped => (
                "Location sharing stopped",
                "Your share link is no longer being updated.",
            ),
            EndReason::Expired => (
                "Location sharing expired",
                "The share reached its end time and was closed.",
            ),
        };
        Self {
            reason,
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

// Everything an observer can see about the sharing actor.
#[derive(Debug, Clone, PartialEq)]
pub struct SharingStatus {
    pub phase: SharingPhase,
    pub current_share: Option<ShareSnapshot>,
    pub last_error: Option<SharingError>,
    pub end_message: Option<EndMessage>,
}

impl SharingStatus {
    pub fn is_sharing(&self) -> bool {
        self.phase == SharingPhase::Active
    }
}

impl Default for SharingStatus {
    fn default() -> Self {
        Self {
            phase: SharingPhase::Idle,
            current_share: None,
            last_error: None,
            end_message: None,
        }
    }
}
