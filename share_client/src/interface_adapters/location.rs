// Location source that replays a recorded track (or a single fixed point) on a timer.

use crate::domain::{Authorization, LocationSample, LocationSource, SampleHandler, SubscriptionId};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

// One line of a JSON-lines track file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: f64,
    // Missing speed is reported as unknown.
    #[serde(default = "unknown_speed")]
    pub speed: f64,
}

fn unknown_speed() -> f64 {
    -1.0
}

#[derive(Debug)]
pub enum TrackError {
    Io(std::io::Error),
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    Empty,
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::Io(err) => write!(f, "failed to read track: {err}"),
            TrackError::Parse { line, source } => {
                write!(f, "invalid track point on line {line}: {source}")
            }
            TrackError::Empty => write!(f, "track contains no points"),
        }
    }
}

impl std::error::Error for TrackError {}

pub struct TrackLocationSource {
    points: Arc<[TrackPoint]>,
    interval: Duration,
    next_id: AtomicU64,
    // Each live subscription owns a replay task stopped through its token.
    subscriptions: Mutex<HashMap<SubscriptionId, CancellationToken>>,
}

impl TrackLocationSource {
    pub fn new(points: Vec<TrackPoint>, interval: Duration) -> Result<Self, TrackError> {
        if points.is_empty() {
            return Err(TrackError::Empty);
        }
        Ok(Self {
            points: points.into(),
            interval,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    pub fn stationary(point: TrackPoint, interval: Duration) -> Self {
        Self {
            points: vec![point].into(),
            interval,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_path(path: &Path, interval: Duration) -> Result<Self, TrackError> {
        let text = std::fs::read_to_string(path).map_err(TrackError::Io)?;
        Self::new(parse_track(&text)?, interval)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock_subscriptions().len()
    }

    fn lock_subscriptions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, CancellationToken>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// Parse JSON lines, skipping blank lines and `#` comments.
pub fn parse_track(text: &str) -> Result<Vec<TrackPoint>, TrackError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| TrackError::Parse {
                line: index + 1,
                source,
            })
        })
        .collect()
}

impl LocationSource for TrackLocationSource {
    fn subscribe(&self, handler: SampleHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        self.lock_subscriptions().insert(id, token.clone());

        let points = Arc::clone(&self.points);
        // `interval` panics on a zero period.
        let interval = self.interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            // Every subscription replays from the start of the track.
            let mut ticker = tokio::time::interval(interval);
            for point in points.iter().cycle() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                handler(LocationSample {
                    latitude: point.latitude,
                    longitude: point.longitude,
                    accuracy: point.accuracy,
                    speed: point.speed,
                    timestamp: SystemTime::now(),
                });
            }
            tracing::debug!(subscription = id.0, "track replay stopped");
        });

        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(token) = self.lock_subscriptions().remove(&id) {
            token.cancel();
        }
    }

    fn authorization(&self) -> Authorization {
        Authorization::Always
    }
}

impl Drop for TrackLocationSource {
    fn drop(&mut self) {
        for (_, token) in self.lock_subscriptions().drain() {
            token.cancel();
        }
    }
}
