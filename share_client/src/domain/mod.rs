pub mod entities;
pub mod errors;
pub mod ports;

// Re-export the domain boundary types and ports.
pub use entities::{
    Authorization, CreateShare, CreatedShare, EndMessage, EndReason, LocationSample, Share,
    ShareSettings, ShareSnapshot, SharingPhase, SharingStatus,
};
pub use errors::{ConfigurationError, SharingError};
pub use ports::{
    Clock, LocationSource, NotificationSink, SampleHandler, SettingsStore, ShareServer,
    SubscriptionId, SurfaceVisibility, SystemClock,
};
