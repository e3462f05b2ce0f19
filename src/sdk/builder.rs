use crate::config::{Credentials, DEFAULT_WS_URL};
use crate::protocol::models::{AudioParams, ControlRequest, RecognitionOptions, UserInfo};
use crate::{Error, Result};

use super::session::{RecognitionSession, RecognitionStream, SessionSettings, WsTransport};
use std::time::Duration;
use uuid::Uuid;

/// Configured entry point for streaming recognition.
#[derive(Debug, Clone)]
pub struct Recognizer {
    credentials: Credentials,
    url: String,
    settings: SessionSettings,
}

impl Recognizer {
    #[must_use]
    pub fn builder() -> RecognizerBuilder {
        RecognizerBuilder::new()
    }

    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a socket for a new session. No frame is sent yet.
    ///
    /// # Errors
    /// Returns an error if the handshake fails. Nothing is retried.
    pub async fn connect(&self) -> Result<RecognitionSession> {
        let session_id = Uuid::new_v4();
        let client = crate::SaucClient::connect(&self.url, &self.credentials, &session_id.to_string())
            .await
            .inspect_err(|err| tracing::error!(%session_id, error = %err, "Connect failed"))?;
        let transport = Box::new(WsTransport { client });
        Ok(RecognitionSession::from_transport(transport, session_id, self.settings.clone()))
    }

    /// Connect and stream `audio` through a new session.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be opened. Later failures
    /// arrive as the stream's last item.
    pub async fn recognize(&self, audio: Vec<u8>) -> Result<RecognitionStream> {
        Ok(self.connect().await?.recognize(audio))
    }
}

pub struct RecognizerBuilder {
    credentials: Option<Credentials>,
    url: String,
    request: ControlRequest,
    chunk_size: usize,
    response_timeout: Duration,
    max_trailing_reads: usize,
}

impl RecognizerBuilder {
    #[must_use]
    pub fn new() -> Self {
        let defaults = SessionSettings::default();
        Self {
            credentials: None,
            url: DEFAULT_WS_URL.to_string(),
            request: defaults.request,
            chunk_size: defaults.chunk_size,
            response_timeout: defaults.response_timeout,
            max_trailing_reads: defaults.max_trailing_reads,
        }
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Read credentials from the environment.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing.
    #[allow(clippy::result_large_err)]
    pub fn credentials_from_env(mut self) -> Result<Self> {
        self.credentials = Some(Credentials::from_env()?);
        Ok(self)
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.request.user = UserInfo { uid: uid.into() };
        self
    }

    #[must_use]
    pub const fn audio(mut self, audio: AudioParams) -> Self {
        self.request.audio = audio;
        self
    }

    #[must_use]
    pub fn options(mut self, options: RecognitionOptions) -> Self {
        self.request.request = options;
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.request.request.model_name = model.into();
        self
    }

    #[must_use]
    pub const fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    #[must_use]
    pub const fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn max_trailing_reads(mut self, reads: usize) -> Self {
        self.max_trailing_reads = reads;
        self
    }

    /// # Errors
    /// Returns an error if credentials are missing or a setting is unusable.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<Recognizer> {
        let credentials = self
            .credentials
            .ok_or_else(|| Error::InvalidConfig("credentials required".to_string()))?;
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if self.response_timeout.is_zero() {
            return Err(Error::InvalidConfig("response_timeout must be positive".to_string()));
        }
        url::Url::parse(&self.url)?;
        self.request.validate()?;

        Ok(Recognizer {
            credentials,
            url: self.url,
            settings: SessionSettings {
                request: self.request,
                chunk_size: self.chunk_size,
                response_timeout: self.response_timeout,
                max_trailing_reads: self.max_trailing_reads,
            },
        })
    }
}

impl Default for RecognizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
