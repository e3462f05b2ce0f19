use crate::config::{Credentials, FILE_RESOURCE_ID};
use crate::error::{Error, Result};
use crate::protocol::models::{AudioCodec, ContainerFormat, RecognitionOptions, UserInfo};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const BASE_URL: &str = "https://openspeech.bytedance.com/api/v3/auc/bigmodel";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const STATUS_HEADER: &str = "x-api-status-code";
const MESSAGE_HEADER: &str = "x-api-message";
const LOG_ID_HEADER: &str = "x-tt-logid";
const SEQUENCE_HEADER: &str = "x-api-sequence";

const STATUS_SUCCESS: &str = "20000000";
const STATUS_PROCESSING: &str = "20000001";
const STATUS_QUEUED: &str = "20000002";

/// Recognition job for audio hosted at a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFileRequest {
    pub user: UserInfo,
    pub audio: RemoteAudio,
    pub request: RecognitionOptions,
}

impl AudioFileRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, format: ContainerFormat) -> Self {
        Self {
            user: UserInfo::default(),
            audio: RemoteAudio {
                url: url.into(),
                format,
                codec: AudioCodec::Raw,
                rate: 16_000,
                bits: 16,
                channel: 1,
            },
            request: RecognitionOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteAudio {
    pub url: String,
    pub format: ContainerFormat,
    pub codec: AudioCodec,
    pub rate: u32,
    pub bits: u16,
    pub channel: u16,
}

/// Identifies a submitted job for later queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_id: String,
    pub log_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Pending,
    Done(Value),
}

/// Submit/query adapter for whole-file recognition.
#[derive(Clone, Debug)]
pub struct FileRecognitionAdapter {
    client: Client,
    credentials: Credentials,
    base_url: String,
}

impl FileRecognitionAdapter {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::new_with_timeouts(credentials, DEFAULT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new_with_timeouts(
        credentials: Credentials,
        timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .build()?;

        Ok(Self {
            client,
            credentials,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the adapter at a different submit/query root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[allow(clippy::result_large_err)]
    fn headers(&self, task_id: &str) -> Result<HeaderMap> {
        let credentials = if self.credentials.resource_id == crate::config::DEFAULT_RESOURCE_ID {
            self.credentials.clone().resource_id(FILE_RESOURCE_ID)
        } else {
            self.credentials.clone()
        };
        credentials.headers(task_id)
    }

    /// Submit a job and return its handle.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server does not accept the task.
    pub async fn submit(&self, request: &AudioFileRequest) -> Result<TaskHandle> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let mut headers = self.headers(&task_id)?;
        headers.insert(SEQUENCE_HEADER, HeaderValue::from_static("-1"));

        let res = self
            .client
            .post(format!("{}/submit", self.base_url))
            .headers(headers)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        let (code, message) = status_of(res.headers());
        if code != STATUS_SUCCESS {
            tracing::warn!(%task_id, %code, %message, "Task submission rejected");
            return Err(Error::TaskFailed { code, message });
        }

        let log_id = header_str(res.headers(), LOG_ID_HEADER);
        tracing::info!(%task_id, %log_id, "Submitted recognition task");
        Ok(TaskHandle { task_id, log_id })
    }

    /// Query a job once.
    ///
    /// # Errors
    /// Returns an error if the request fails or the task has failed.
    pub async fn query(&self, task: &TaskHandle) -> Result<QueryOutcome> {
        let mut headers = self.headers(&task.task_id)?;
        headers.insert(LOG_ID_HEADER, HeaderValue::from_str(&task.log_id)?);

        let res = self
            .client
            .post(format!("{}/query", self.base_url))
            .headers(headers)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;

        let (code, message) = status_of(res.headers());
        match code.as_str() {
            STATUS_SUCCESS => Ok(QueryOutcome::Done(res.json().await?)),
            STATUS_PROCESSING | STATUS_QUEUED => {
                tracing::debug!(task_id = %task.task_id, %code, "Task still running");
                Ok(QueryOutcome::Pending)
            }
            _ => Err(Error::TaskFailed { code, message }),
        }
    }

    /// Poll a job until it finishes, at most `max_polls` times.
    ///
    /// # Errors
    /// Returns an error if a query fails, or [`Error::Timeout`] if the job is
    /// still pending after the last poll.
    pub async fn wait(
        &self,
        task: &TaskHandle,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<Value> {
        for attempt in 0..max_polls {
            if let QueryOutcome::Done(result) = self.query(task).await? {
                return Ok(result);
            }
            if attempt + 1 < max_polls {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Err(Error::Timeout(poll_interval * max_polls))
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn status_of(headers: &HeaderMap) -> (String, String) {
    (header_str(headers, STATUS_HEADER), header_str(headers, MESSAGE_HEADER))
}
