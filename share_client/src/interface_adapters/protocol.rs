// Wire format of the Hauk share protocol: form-encoded requests, newline-delimited replies.

use crate::domain::{CreateShare, CreatedShare, LocationSample};
use std::fmt;
use std::time::UNIX_EPOCH;
use url::Url;

pub const CREATE_PATH: &str = "api/create";
pub const POST_PATH: &str = "api/post";
pub const STOP_PATH: &str = "api/stop";

// Body fragment the server returns once a session is gone.
pub const EXPIRED_MARKER: &str = "Session expired!";
// Body fragment the server returns when a required field is absent.
pub const MISSING_DATA_MARKER: &str = "Missing data!";

const OK: &str = "OK";

pub type Form = Vec<(&'static str, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    // Fewer than the four required lines, or the first line is not "OK".
    MalformedCreate(String),
    InvalidShareUrl(String),
    // Body did not start with "OK" (or carried the missing-data marker).
    Rejected(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedCreate(body) => {
                write!(f, "malformed create response: {body:?}")
            }
            ProtocolError::InvalidShareUrl(url) => write!(f, "invalid share url: {url:?}"),
            ProtocolError::Rejected(body) => write!(f, "server rejected request: {body:?}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// Result of interpreting a post response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Accepted,
    SessionExpired,
    Rejected(ProtocolError),
}

// Resolve an endpoint relative to the server root, treating the root as a directory.
pub fn endpoint(base_url: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
}

pub fn create_form(req: &CreateShare) -> Form {
    vec![
        ("dur", req.duration_secs.to_string()),
        ("mod", "0".to_string()),
        ("lid", req.link_id.clone()),
        ("e2e", "0".to_string()),
        ("usr", req.username.clone()),
        ("pwd", req.password.clone()),
        ("ado", "0".to_string()),
        ("int", req.update_interval.to_string()),
    ]
}

pub fn post_form(sample: &LocationSample, session_token: &str) -> Form {
    vec![
        ("acc", format!("{:.5}", sample.accuracy)),
        ("prv", "0".to_string()),
        ("spd", format!("{:.1}", clamp_speed(sample.speed))),
        ("lon", format!("{:.8}", sample.longitude)),
        ("time", unix_seconds(sample).to_string()),
        ("lat", format!("{:.8}", sample.latitude)),
        ("sid", session_token.to_string()),
    ]
}

pub fn stop_form(session_token: &str) -> Form {
    vec![("sid", session_token.to_string())]
}

// Unknown (negative or NaN) speeds go out as zero; this also folds -0.0 into 0.0.
fn clamp_speed(speed: f64) -> f64 {
    if speed > 0.0 { speed } else { 0.0 }
}

fn unix_seconds(sample: &LocationSample) -> u64 {
    sample
        .timestamp
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

// Parse "OK\n<token>\n<share url>\n<viewer id>" into the created share.
pub fn parse_create_response(body: &str) -> Result<CreatedShare, ProtocolError> {
    let parts: Vec<&str> = body
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .collect();

    if parts.len() < 4 || parts[0] != OK {
        return Err(ProtocolError::MalformedCreate(body.to_string()));
    }

    let share_url =
        Url::parse(parts[2]).map_err(|_| ProtocolError::InvalidShareUrl(parts[2].to_string()))?;

    Ok(CreatedShare {
        session_token: parts[1].to_string(),
        share_url,
        viewer_id: parts[3].to_string(),
    })
}

pub fn classify_post_response(body: &str) -> PostOutcome {
    if body.contains(EXPIRED_MARKER) {
        return PostOutcome::SessionExpired;
    }
    if body.contains(MISSING_DATA_MARKER) || !body.starts_with(OK) {
        return PostOutcome::Rejected(ProtocolError::Rejected(body.to_string()));
    }
    PostOutcome::Accepted
}
