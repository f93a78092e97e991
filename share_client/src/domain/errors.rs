use std::fmt;

// Why a server URL could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    MissingServerUrl,
    InvalidServerUrl(String),
}

// Domain-level errors for the sharing workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingError {
    Configuration(ConfigurationError),
    InvalidDuration,
    LocationUnauthorized,
    Server(String),
    // Distinguished signal: the server closed the session on its side.
    SessionExpired,
    // The operation was superseded; never shown to observers.
    Cancelled,
}

impl SharingError {
    // Configuration problems should send the user to the settings screen.
    pub fn routes_to_settings(&self) -> bool {
        matches!(self, SharingError::Configuration(_))
    }

    // Errors that belong in the observer's error slot.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, SharingError::Cancelled | SharingError::SessionExpired)
    }
}

impl fmt::Display for SharingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharingError::Configuration(ConfigurationError::MissingServerUrl) => write!(
                f,
                "No server URL configured. Please set a server URL in Settings."
            ),
            SharingError::Configuration(ConfigurationError::InvalidServerUrl(detail)) => {
                write!(f, "The configured server URL is invalid: {detail}")
            }
            SharingError::InvalidDuration => write!(f, "The share duration must be positive."),
            SharingError::LocationUnauthorized => write!(
                f,
                "Location access not authorized. Please enable location access in Settings."
            ),
            SharingError::Server(detail) => write!(
                f,
                "Failed to communicate with the server. Please try again. ({detail})"
            ),
            SharingError::SessionExpired => write!(f, "The share has expired on the server."),
            SharingError::Cancelled => {
                write!(f, "Operation cancelled. This is normal during rapid updates.")
            }
        }
    }
}

impl std::error::Error for SharingError {}
