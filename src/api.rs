use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::config::Config;
use crate::error::{ChatError, ChatResult};
use crate::events::{ChatModel, ChatOutcome, ConversationEntry, ConversationRole, PlaceholderLabel};

/// Body of `POST /api/chat`, derived fresh for every send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    pub model: ChatModel,
    pub system_prompt: String,
    pub temperature: f32,
}

/// Response of `POST /api/chat`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub assistant_reply: Option<String>,
    #[serde(default)]
    pub intent: Option<ReplyIntent>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Server-side intent classification of a reply. Values may be booleans or
/// richer objects depending on the backend; any present, non-false value counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyIntent {
    #[serde(default)]
    pub internet_search: Option<serde_json::Value>,
    #[serde(default)]
    pub image_generation: Option<serde_json::Value>,
    #[serde(default)]
    pub code_intent: Option<serde_json::Value>,
}

fn is_set(value: &Option<serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => false,
        Some(_) => true,
    }
}

impl ReplyIntent {
    /// Placeholder label matching this intent, if any flag is set
    pub fn label(&self) -> Option<PlaceholderLabel> {
        if is_set(&self.image_generation) {
            Some(PlaceholderLabel::CreatingImage)
        } else if is_set(&self.internet_search) {
            Some(PlaceholderLabel::Searching)
        } else if is_set(&self.code_intent) {
            Some(PlaceholderLabel::WritingCode)
        } else {
            None
        }
    }
}

impl ChatOutcome {
    /// Collapse a backend result into the three settle branches
    pub fn from_result(result: ChatResult<ChatResponse>) -> Self {
        match result {
            Ok(ChatResponse { error: Some(message), .. }) => ChatOutcome::ApiError(message),
            Ok(response) => ChatOutcome::Reply(response.assistant_reply),
            Err(e) => ChatOutcome::Transport(e.to_string()),
        }
    }
}

/// Conversation ids are opaque; the server may send strings or numbers
fn id_to_string(id: serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Accept any scalar for display-only fields; `null` reads as empty
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(|value| match value {
        serde_json::Value::Null => String::new(),
        other => id_to_string(other),
    })
}

/// Entry of `GET /api/conversations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(deserialize_with = "deserialize_text")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<ConversationSummary>,
    #[serde(default)]
    error: Option<String>,
}

/// One stored message. Server ids and timestamps are not used locally.
#[derive(Debug, Deserialize)]
struct StoredMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl From<StoredMessage> for ConversationEntry {
    fn from(message: StoredMessage) -> Self {
        let role = match message.role.unwrap_or_default().to_ascii_lowercase().as_str() {
            "user" => ConversationRole::User,
            "system" => ConversationRole::System,
            _ => ConversationRole::Assistant,
        };
        ConversationEntry::new(role, message.content.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct ConversationHistory {
    #[serde(default)]
    conversation_history: Vec<StoredMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedConversation {
    #[serde(default, alias = "conversation_id")]
    id: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// The external chat and conversation services
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, payload: &ChatPayload) -> ChatResult<ChatResponse>;

    async fn list_conversations(&self) -> ChatResult<Vec<ConversationSummary>>;

    async fn fetch_conversation(&self, id: &str) -> ChatResult<Vec<ConversationEntry>>;

    /// Returns the new conversation id when the server reports one
    async fn create_conversation(&self, title: &str) -> ChatResult<Option<String>>;
}

/// HTTP client for the chat service
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &Config) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read a JSON body. A non-OK status is only tolerated when the body still
    /// decodes and `has_error` says it carries an `error` field.
    async fn read_json<T>(response: reqwest::Response, has_error: impl Fn(&T) -> bool) -> ChatResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<T>(&body) {
            Ok(parsed) if status.is_success() || has_error(&parsed) => Ok(parsed),
            Ok(_) => Err(ChatError::Status { status, body }),
            Err(_) if !status.is_success() => Err(ChatError::Status { status, body }),
            Err(e) => Err(ChatError::Decode(e)),
        }
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, payload: &ChatPayload) -> ChatResult<ChatResponse> {
        tracing::debug!(model = payload.model.id(), temperature = payload.temperature, "POST /api/chat");

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(payload)
            .send()
            .await?;

        Self::read_json(response, |r: &ChatResponse| r.error.is_some()).await
    }

    async fn list_conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        let response = self.client.get(self.url("/api/conversations")).send().await?;
        let list: ConversationList = Self::read_json(response, |l: &ConversationList| l.error.is_some()).await?;

        match list.error {
            Some(message) => Err(ChatError::Remote(message)),
            None => Ok(list.conversations),
        }
    }

    async fn fetch_conversation(&self, id: &str) -> ChatResult<Vec<ConversationEntry>> {
        let response = self
            .client
            .get(self.url(&format!("/api/conversations/{}", id)))
            .send()
            .await?;
        let history: ConversationHistory =
            Self::read_json(response, |h: &ConversationHistory| h.error.is_some()).await?;

        match history.error {
            Some(message) => Err(ChatError::Remote(message)),
            None => Ok(history
                .conversation_history
                .into_iter()
                .map(ConversationEntry::from)
                .collect()),
        }
    }

    async fn create_conversation(&self, title: &str) -> ChatResult<Option<String>> {
        let response = self
            .client
            .post(self.url("/api/conversations/new"))
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        let created: CreatedConversation =
            Self::read_json(response, |c: &CreatedConversation| c.error.is_some()).await?;

        if let Some(message) = created.error {
            return Err(ChatError::Remote(message));
        }

        Ok(created.id.map(id_to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_wire_field_names() {
        let payload = ChatPayload {
            message: "Hello".to_string(),
            model: ChatModel::Gpt4o,
            system_prompt: "Be brief.".to_string(),
            temperature: 0.5,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "message": "Hello",
                "model": "gpt-4o",
                "system_prompt": "Be brief.",
                "temperature": 0.5
            })
        );
    }

    #[test]
    fn response_with_error_field_is_an_api_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"error":"No message provided"}"#).unwrap();
        assert_eq!(
            ChatOutcome::from_result(Ok(response)),
            ChatOutcome::ApiError("No message provided".to_string())
        );
    }

    #[test]
    fn reply_without_text_is_still_a_reply() {
        let response: ChatResponse = serde_json::from_str(r#"{"user_message":"hi"}"#).unwrap();
        assert_eq!(ChatOutcome::from_result(Ok(response)), ChatOutcome::Reply(None));
    }

    #[test]
    fn intent_flags_pick_a_label() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"assistant_reply":"x","intent":{"internet_search":true,"image_generation":false}}"#,
        )
        .unwrap();
        assert_eq!(response.intent.unwrap().label(), Some(PlaceholderLabel::Searching));

        let quiet = ReplyIntent {
            code_intent: Some(serde_json::Value::Null),
            ..Default::default()
        };
        assert_eq!(quiet.label(), None);
    }

    #[test]
    fn created_conversation_accepts_numeric_ids() {
        let created: CreatedConversation = serde_json::from_str(r#"{"conversation_id": 42}"#).unwrap();
        assert_eq!(created.id, Some(serde_json::json!(42)));
    }

    #[test]
    fn history_accepts_foreign_ids_and_timestamps() {
        let history: ConversationHistory = serde_json::from_str(
            r#"{"conversation_history":[
                {"id":7,"role":"user","content":"hi","created_at":"2024-05-01 10:00:00"},
                {"id":"msg-8","role":"bot","content":null,"timestamp":1714557600}
            ]}"#,
        )
        .unwrap();

        let entries: Vec<ConversationEntry> =
            history.conversation_history.into_iter().map(ConversationEntry::from).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, ConversationRole::User);
        assert_eq!(entries[0].content, "hi");
        assert_eq!(entries[1].role, ConversationRole::Assistant);
        assert_eq!(entries[1].content, "");
        assert!(entries.iter().all(|e| !e.loading));
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn summaries_accept_numeric_ids() {
        let list: ConversationList = serde_json::from_str(
            r#"{"conversations":[{"id":1,"title":"First","timestamp":null},{"id":"abc"}]}"#,
        )
        .unwrap();

        assert_eq!(list.conversations[0].id, "1");
        assert_eq!(list.conversations[0].title, "First");
        assert_eq!(list.conversations[0].timestamp, "");
        assert_eq!(list.conversations[1].id, "abc");
        assert_eq!(list.conversations[1].title, "");
    }

    mod http {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        fn header_end(request: &[u8]) -> Option<usize> {
            request.windows(4).position(|w| w == b"\r\n\r\n")
        }

        /// Serve one canned HTTP response and return the base URL
        async fn serve_once(status: &'static str, body: &'static str) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if let Some(end) = header_end(&request) {
                        let headers = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                        let length = headers
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|value| value.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if request.len() >= end + 4 + length {
                            break;
                        }
                    }
                }

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            });

            format!("http://{}", addr)
        }

        fn backend(base_url: String) -> HttpBackend {
            HttpBackend {
                base_url,
                client: reqwest::Client::builder().no_proxy().build().unwrap(),
            }
        }

        fn payload() -> ChatPayload {
            ChatPayload {
                message: "Hello".to_string(),
                model: ChatModel::Gpt4o,
                system_prompt: "Be brief.".to_string(),
                temperature: 0.7,
            }
        }

        async fn chat_outcome(status: &'static str, body: &'static str) -> ChatOutcome {
            let backend = backend(serve_once(status, body).await);
            ChatOutcome::from_result(backend.chat(&payload()).await)
        }

        #[tokio::test]
        async fn ok_reply_is_a_reply() {
            let outcome = chat_outcome("200 OK", r#"{"assistant_reply":"Hi there"}"#).await;
            assert_eq!(outcome, ChatOutcome::Reply(Some("Hi there".to_string())));
        }

        #[tokio::test]
        async fn error_body_on_bad_status_is_an_api_error() {
            let outcome = chat_outcome("400 Bad Request", r#"{"error":"No message provided"}"#).await;
            assert_eq!(outcome, ChatOutcome::ApiError("No message provided".to_string()));

            let outcome = chat_outcome("500 Internal Server Error", r#"{"error":"model unavailable"}"#).await;
            assert_eq!(outcome, ChatOutcome::ApiError("model unavailable".to_string()));
        }

        #[tokio::test]
        async fn bad_status_without_error_body_is_a_transport_failure() {
            let backend = backend(serve_once("502 Bad Gateway", "<html>upstream down</html>").await);
            let result = backend.chat(&payload()).await;

            assert!(matches!(
                result,
                Err(ChatError::Status { status, .. }) if status == reqwest::StatusCode::BAD_GATEWAY
            ));
            let outcome = chat_outcome("502 Bad Gateway", "<html>upstream down</html>").await;
            assert!(matches!(outcome, ChatOutcome::Transport(message) if message.contains("502")));
        }

        #[tokio::test]
        async fn undecodable_ok_body_is_a_transport_failure() {
            let backend = backend(serve_once("200 OK", "not json").await);
            assert!(matches!(backend.chat(&payload()).await, Err(ChatError::Decode(_))));
        }

        #[tokio::test]
        async fn conversation_history_with_numeric_ids_loads() {
            let backend = backend(
                serve_once(
                    "200 OK",
                    r#"{"conversation_history":[{"id":7,"role":"user","content":"hi"}]}"#,
                )
                .await,
            );
            let entries = backend.fetch_conversation("7").await.unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].content, "hi");
        }
    }
}
