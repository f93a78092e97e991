use crate::domain::{NotificationSink, SurfaceVisibility};
use std::io::IsTerminal;

// Notification sink for headless runs: the notification becomes a log line.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn deliver(&self, title: &str, body: &str) {
        tracing::info!(%title, %body, "notification");
    }
}

// The terminal counts as visible while stdout is attached to one.
pub struct TerminalSurface;

impl SurfaceVisibility for TerminalSurface {
    fn is_visible(&self) -> bool {
        std::io::stdout().is_terminal()
    }
}
