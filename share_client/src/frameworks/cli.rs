use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

const MIN_DURATION: f64 = 1.0;
const MAX_DURATION: f64 = 999_999.0;

#[derive(Debug, Parser)]
#[command(
    name = "share_client",
    about = "Share your live location through a Hauk server",
    group(ArgGroup::new("position").required(true).args(["track", "latitude"]))
)]
pub struct Args {
    /// How long to share, in `--unit`s.
    #[arg(short, long, default_value_t = 1.0)]
    pub duration: f64,

    #[arg(short, long, value_enum, default_value_t = TimeUnit::Hours)]
    pub unit: TimeUnit,

    /// Settings file (defaults to $HAUK_CONFIG or ./hauk.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON-lines track to replay, one point per update interval.
    #[arg(long)]
    pub track: Option<PathBuf>,

    /// Fixed latitude to report instead of a track.
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    pub latitude: Option<f64>,

    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    pub longitude: Option<f64>,

    /// Accuracy in metres reported with a fixed position.
    #[arg(long, default_value_t = 10.0)]
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86_400.0,
        }
    }
}

impl Args {
    // Same bounds the duration picker enforces: 1 to 999999 units.
    pub fn share_duration(&self) -> Duration {
        let amount = if self.duration.is_finite() {
            self.duration.clamp(MIN_DURATION, MAX_DURATION)
        } else {
            MIN_DURATION
        };
        Duration::from_secs_f64(amount * self.unit.seconds())
    }
}
