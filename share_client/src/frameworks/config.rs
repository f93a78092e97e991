use crate::domain::ShareSettings;
use std::path::{Path, PathBuf};
use std::{env, fmt, io, time::Duration};

// Runtime constants (not user settings).
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;
pub const MAX_INFLIGHT_UPLOADS: usize = 8;
pub const END_MESSAGE_TTL: Duration = Duration::from_secs(3);

const DEFAULT_CONFIG_PATH: &str = "hauk.toml";

pub fn http_timeout() -> Duration {
    millis_from_env("HAUK_HTTP_TIMEOUT_MS", 10_000)
}

pub fn stop_timeout() -> Duration {
    millis_from_env("HAUK_STOP_TIMEOUT_MS", 5_000)
}

fn millis_from_env(key: &str, default: u64) -> Duration {
    let millis = env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_millis(millis)
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        key: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid settings in {}: {source}", path.display())
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// Settings come from the TOML file first, then environment overrides.
// An explicit path (flag or HAUK_CONFIG) must exist; the default one may not.
pub fn load_settings(explicit: Option<&Path>) -> Result<ShareSettings, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match env::var("HAUK_CONFIG") {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        },
    };

    let settings = read_settings_file(&path, required)?;
    tracing::debug!(path = %path.display(), "settings loaded");
    apply_env_overrides(settings, |key| env::var(key).ok())
}

pub fn read_settings_file(path: &Path, required: bool) -> Result<ShareSettings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(err) if !required && err.kind() == io::ErrorKind::NotFound => {
            Ok(ShareSettings::default())
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn apply_env_overrides(
    mut settings: ShareSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ShareSettings, ConfigError> {
    if let Some(value) = lookup("HAUK_SERVER_URL") {
        settings.server_url = Some(value);
    }
    if let Some(value) = lookup("HAUK_USERNAME") {
        settings.username = value;
    }
    if let Some(value) = lookup("HAUK_PASSWORD") {
        settings.password = value;
    }
    if let Some(value) = lookup("HAUK_LINK_ID") {
        settings.link_id = value;
    }
    if let Some(value) = lookup("HAUK_UPDATE_INTERVAL") {
        settings.update_interval = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "HAUK_UPDATE_INTERVAL",
            value,
        })?;
    }
    Ok(settings)
}
