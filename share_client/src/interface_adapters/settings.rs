use crate::domain::{SettingsStore, ShareSettings};

// Settings resolved once at startup and served read-only afterwards.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    settings: ShareSettings,
}

impl StaticSettings {
    pub fn new(settings: ShareSettings) -> Self {
        Self { settings }
    }
}

impl SettingsStore for StaticSettings {
    fn settings(&self) -> ShareSettings {
        self.settings.clone()
    }
}
