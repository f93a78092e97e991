use crate::domain::{CreateShare, CreatedShare, LocationSample, ShareServer, SharingError};
use crate::interface_adapters::protocol::{
    self, CREATE_PATH, Form, MISSING_DATA_MARKER, POST_PATH, PostOutcome, ProtocolError,
    STOP_PATH,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use url::Url;

// Thin wrapper around reqwest for the Hauk share endpoints.
#[derive(Clone)]
pub struct HaukClient {
    http: Client,
}

#[derive(Debug)]
pub enum HaukClientError {
    Endpoint(url::ParseError),
    Transport(reqwest::Error),
    Upstream { status: StatusCode },
    // Body could not be read or was not UTF-8 text.
    Decode(String),
    Protocol(ProtocolError),
}

impl fmt::Display for HaukClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaukClientError::Endpoint(err) => write!(f, "invalid endpoint url: {err}"),
            HaukClientError::Transport(err) => write!(f, "transport error: {err}"),
            HaukClientError::Upstream { status } => write!(f, "upstream error {status}"),
            HaukClientError::Decode(detail) => write!(f, "response decode error: {detail}"),
            HaukClientError::Protocol(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HaukClientError {}

impl From<HaukClientError> for SharingError {
    fn from(err: HaukClientError) -> Self {
        SharingError::Server(err.to_string())
    }
}

impl HaukClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    // POST a form and return the body as text, failing on non-2xx.
    async fn submit(
        &self,
        base_url: &Url,
        path: &str,
        form: &Form,
    ) -> Result<String, HaukClientError> {
        let url = protocol::endpoint(base_url, path).map_err(HaukClientError::Endpoint)?;
        let res = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(HaukClientError::Transport)?;
        let status = res.status();

        if !status.is_success() {
            return Err(HaukClientError::Upstream { status });
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|err| HaukClientError::Decode(err.to_string()))?;
        String::from_utf8(bytes.to_vec()).map_err(|err| HaukClientError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ShareServer for HaukClient {
    #[tracing::instrument(name = "hauk_create", skip_all, fields(duration_secs = req.duration_secs))]
    async fn create(
        &self,
        base_url: &Url,
        req: &CreateShare,
    ) -> Result<CreatedShare, SharingError> {
        let form = protocol::create_form(req);
        let body = self.submit(base_url, CREATE_PATH, &form).await?;

        protocol::parse_create_response(&body).map_err(|err| {
            if body.contains(MISSING_DATA_MARKER) {
                // Field names only; values carry credentials.
                let sent: Vec<&str> = form.iter().map(|(key, _)| *key).collect();
                tracing::warn!(?sent, "server reported missing create data");
            }
            SharingError::from(HaukClientError::Protocol(err))
        })
    }

    #[tracing::instrument(name = "hauk_post", skip_all)]
    async fn post(
        &self,
        base_url: &Url,
        sample: &LocationSample,
        session_token: &str,
    ) -> Result<(), SharingError> {
        let form = protocol::post_form(sample, session_token);
        let body = self.submit(base_url, POST_PATH, &form).await?;

        match protocol::classify_post_response(&body) {
            PostOutcome::Accepted => Ok(()),
            PostOutcome::SessionExpired => Err(SharingError::SessionExpired),
            PostOutcome::Rejected(err) => Err(HaukClientError::Protocol(err).into()),
        }
    }

    #[tracing::instrument(name = "hauk_stop", skip_all)]
    async fn stop(&self, base_url: &Url, session_token: &str) -> Result<(), SharingError> {
        self.submit(base_url, STOP_PATH, &protocol::stop_form(session_token))
            .await?;
        Ok(())
    }
}
