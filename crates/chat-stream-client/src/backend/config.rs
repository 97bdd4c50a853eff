use std::time::Duration;

use crate::errors::ChatError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the HTTP chat backend.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API origin plus base path, for example `https://analyst.example.com/api`.
    pub base_url: String,
    /// Bearer token sent with every request, when set.
    pub api_token: Option<String>,
    /// Connect timeout. Streaming requests have no total timeout.
    pub connect_timeout: Duration,
    /// Total timeout for transcript fetches.
    pub fetch_timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with default timeouts and no token.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Builds a config from `CHAT_API_*` environment variables.
    ///
    /// - `CHAT_API_BASE_URL` (required)
    /// - `CHAT_API_TOKEN`
    /// - `CHAT_API_CONNECT_TIMEOUT_SECS`
    /// - `CHAT_API_FETCH_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ChatError> {
        let base_url = lookup("CHAT_API_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(ChatError::config("missing CHAT_API_BASE_URL"));
        }
        let mut config = Self::new(base_url.trim());
        if let Some(token) = lookup("CHAT_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            config = config.api_token(token.trim());
        }
        if let Some(secs) = parse_secs(&lookup, "CHAT_API_CONNECT_TIMEOUT_SECS")? {
            config = config.connect_timeout(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "CHAT_API_FETCH_TIMEOUT_SECS")? {
            config = config.fetch_timeout(secs);
        }
        Ok(config)
    }

    /// Sets the bearer token.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the transcript fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub(crate) fn parsed_base_url(&self) -> Result<reqwest::Url, ChatError> {
        let url = reqwest::Url::parse(self.base_url.trim())
            .map_err(|e| ChatError::config(format!("invalid base url {:?}: {e}", self.base_url)))?;
        if url.cannot_be_a_base() {
            return Err(ChatError::config(format!(
                "base url {:?} cannot carry a path",
                self.base_url
            )));
        }
        Ok(url)
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ChatError> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ChatError::config(format!("{key} must be a whole number of seconds"))),
        None => Ok(None),
    }
}
