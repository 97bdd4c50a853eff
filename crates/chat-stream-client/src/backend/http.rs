use futures::StreamExt as _;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::errors::{ChatError, TransportError};
use crate::model::{SessionId, TranscriptEntry};

use super::config::ClientConfig;
use super::{ChatBackend, ChunkStream};

/// `ChatBackend` over the chat REST API.
///
/// - `POST {base}/sessions/{id}/chat` opens a turn stream.
/// - `GET {base}/sessions/{id}/messages` returns the persisted transcript.
pub struct HttpChatBackend {
    client: reqwest::Client,
    config: ClientConfig,
    base: reqwest::Url,
}

impl HttpChatBackend {
    /// Creates a backend from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ChatError> {
        let base = config.parsed_base_url()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            base,
        })
    }

    /// Creates a backend from `CHAT_API_*` environment variables.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub(crate) fn endpoint(
        &self,
        session: &SessionId,
        leaf: &str,
    ) -> Result<reqwest::Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::network(format!("base url {} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(["sessions", session.as_str(), leaf]);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpChatBackend {
    async fn open_turn(
        &self,
        session: &SessionId,
        prompt: &str,
    ) -> Result<ChunkStream, TransportError> {
        let url = self.endpoint(session, "chat")?;
        debug!(session = %session, url = %url, "opening chat stream");
        let body = serde_json::json!({ "message": prompt });

        let response = self
            .authorize(self.client.post(url))
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::network(format!("chat request failed: {e}")))?;
        let response = ensure_success(response).await?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| TransportError::network(format!("chat stream read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }

    async fn fetch_messages(
        &self,
        session: &SessionId,
    ) -> Result<Vec<TranscriptEntry>, TransportError> {
        let url = self.endpoint(session, "messages")?;
        debug!(session = %session, url = %url, "fetching transcript");

        let response = self
            .authorize(self.client.get(url))
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(|e| TransportError::network(format!("messages request failed: {e}")))?;
        let response = ensure_success(response).await?;

        let body: MessagesBody = response
            .json()
            .await
            .map_err(|e| TransportError::invalid_response(format!("invalid messages body: {e}")))?;
        Ok(body.into_entries())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(TransportError::status(status.as_u16(), body))
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum MessagesBody {
    List(Vec<TranscriptEntry>),
    Wrapped { messages: Vec<TranscriptEntry> },
}

impl MessagesBody {
    fn into_entries(self) -> Vec<TranscriptEntry> {
        match self {
            Self::List(entries) | Self::Wrapped { messages: entries } => entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn backend(base: &str) -> HttpChatBackend {
        HttpChatBackend::new(ClientConfig::new(base)).expect("backend")
    }

    #[test]
    fn endpoints_append_session_segments() {
        let b = backend("https://analyst.example.com/api/");
        let url = b.endpoint(&SessionId::new("s-1"), "chat").expect("url");
        assert_eq!(url.as_str(), "https://analyst.example.com/api/sessions/s-1/chat");

        let b = backend("http://localhost:8000");
        let url = b.endpoint(&SessionId::new("s-1"), "messages").expect("url");
        assert_eq!(url.as_str(), "http://localhost:8000/sessions/s-1/messages");
    }

    #[test]
    fn session_ids_are_percent_encoded() {
        let b = backend("http://localhost:8000/api");
        let url = b.endpoint(&SessionId::new("a/b c"), "chat").expect("url");
        assert_eq!(url.as_str(), "http://localhost:8000/api/sessions/a%2Fb%20c/chat");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        assert!(matches!(
            HttpChatBackend::new(ClientConfig::new("::nope::")),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn messages_body_accepts_bare_and_wrapped_lists() {
        let entry = serde_json::json!({
            "id": "m1", "role": "user", "content": "hi", "created_at": "2026-03-01T10:00:00Z"
        });
        let bare: MessagesBody =
            serde_json::from_value(serde_json::json!([entry.clone()])).expect("bare");
        let wrapped: MessagesBody =
            serde_json::from_value(serde_json::json!({ "messages": [entry] })).expect("wrapped");
        let bare = bare.into_entries();
        assert_eq!(bare, wrapped.into_entries());
        assert_eq!(bare[0].role, Role::Human);
    }

    #[tokio::test]
    async fn env_gated_smoke_fetch_messages_if_backend_configured() {
        if std::env::var("CHAT_API_BASE_URL").is_err() {
            eprintln!("skipping chat backend smoke test (CHAT_API_BASE_URL missing)");
            return;
        }
        let Ok(session) = std::env::var("CHAT_API_SMOKE_SESSION") else {
            eprintln!("skipping chat backend smoke test (CHAT_API_SMOKE_SESSION missing)");
            return;
        };
        let backend = match HttpChatBackend::from_env() {
            Ok(backend) => backend,
            Err(err) => {
                eprintln!("skipping chat backend smoke test ({err})");
                return;
            }
        };
        let result = backend.fetch_messages(&SessionId::new(session)).await;
        assert!(result.is_ok(), "messages fetch failed: {result:?}");
    }
}
