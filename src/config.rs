use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub const DEFAULT_WS_URL: &str = "wss://openspeech.bytedance.com/api/v3/sauc/bigmodel";
pub const DEFAULT_RESOURCE_ID: &str = "volc.bigasr.sauc.duration";
pub const FILE_RESOURCE_ID: &str = "volc.bigasr.auc";

pub const ENV_APP_KEY: &str = "SAUC_APP_KEY";
pub const ENV_ACCESS_KEY: &str = "SAUC_ACCESS_KEY";
pub const ENV_RESOURCE_ID: &str = "SAUC_RESOURCE_ID";

pub(crate) const HEADER_APP_KEY: HeaderName = HeaderName::from_static("x-api-app-key");
pub(crate) const HEADER_ACCESS_KEY: HeaderName = HeaderName::from_static("x-api-access-key");
pub(crate) const HEADER_RESOURCE_ID: HeaderName = HeaderName::from_static("x-api-resource-id");
pub(crate) const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-api-request-id");
pub(crate) const HEADER_CONNECT_ID: HeaderName = HeaderName::from_static("x-api-connect-id");

/// Provider credentials sent as request headers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_key: String,
    pub access_key: String,
    pub resource_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("access_key", &"<redacted>")
            .field("resource_id", &self.resource_id)
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn new(app_key: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            access_key: access_key.into(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
        }
    }

    #[must_use]
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Load credentials from `SAUC_APP_KEY`, `SAUC_ACCESS_KEY` and the
    /// optional `SAUC_RESOURCE_ID`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if a required variable is unset or empty.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[allow(clippy::result_large_err)]
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::InvalidConfig(format!("{key} is not set")))
        };
        let credentials = Self::new(required(ENV_APP_KEY)?, required(ENV_ACCESS_KEY)?);
        Ok(match lookup(ENV_RESOURCE_ID).filter(|value| !value.is_empty()) {
            Some(resource_id) => credentials.resource_id(resource_id),
            None => credentials,
        })
    }

    /// Auth headers for one request, correlated by `request_id`.
    ///
    /// # Errors
    /// Returns an error if a credential contains bytes not allowed in a header.
    #[allow(clippy::result_large_err)]
    pub fn headers(&self, request_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_APP_KEY, HeaderValue::from_str(&self.app_key)?);
        let mut access_key = HeaderValue::from_str(&self.access_key)?;
        access_key.set_sensitive(true);
        headers.insert(HEADER_ACCESS_KEY, access_key);
        headers.insert(HEADER_RESOURCE_ID, HeaderValue::from_str(&self.resource_id)?);
        headers.insert(HEADER_REQUEST_ID, HeaderValue::from_str(request_id)?);
        Ok(headers)
    }
}
