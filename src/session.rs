//! Conversation session controller.
//!
//! Owns the draft, the per-session chat settings and the ordered list of
//! conversation entries, and drives the optimistic send protocol: a send
//! appends the user entry and a loading placeholder in one step, and the
//! placeholder is later replaced by exactly one terminal entry, matched by id.

use uuid::Uuid;

use crate::api::{ChatBackend, ChatPayload, ConversationSummary};
use crate::config::Config;
use crate::events::{ChatModel, ChatOutcome, ConversationEntry, ConversationRole, PlaceholderLabel};

pub const EMPTY_DRAFT_ERROR: &str = "Please enter a message first.";
pub const GENERIC_ERROR: &str = "Something went wrong. Please try again.";
pub const EMPTY_REPLY: &str = "No response available.";
pub const WELCOME_MESSAGE: &str = "Hello! How can I help you today?";

/// Chat settings read at send time
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model: ChatModel,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: ChatModel::default(),
            temperature: 0.7,
            system_prompt: crate::config::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            model: config.default_model,
            temperature: config.default_temperature,
            system_prompt: config.default_system_prompt.clone(),
        }
    }
}

/// Partial settings edit; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub model: Option<ChatModel>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

/// Handle for a send whose reply is still outstanding
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub placeholder_id: Uuid,
    pub payload: ChatPayload,
}

#[derive(Debug, Clone)]
pub struct SessionController {
    draft: String,
    config: SessionConfig,
    entries: Vec<ConversationEntry>,
    conversations: Vec<ConversationSummary>,
    active_conversation: Option<String>,
    settings_open: bool,
    in_flight: bool,
    error: Option<String>,
    guess_intent: bool,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            draft: String::new(),
            config,
            entries: Vec::new(),
            conversations: Vec::new(),
            active_conversation: None,
            settings_open: false,
            in_flight: false,
            error: None,
            guess_intent: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut session = Self::new(SessionConfig::from(config));
        session.guess_intent = config.guess_intent;
        session
    }

    pub fn with_intent_guessing(mut self, enabled: bool) -> Self {
        self.guess_intent = enabled;
        self
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn settings_open(&self) -> bool {
        self.settings_open
    }

    pub fn toggle_settings(&mut self) {
        self.settings_open = !self.settings_open;
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn update_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn update_config(&mut self, update: ConfigUpdate) {
        if let Some(model) = update.model {
            self.config.model = model;
        }
        if let Some(temperature) = update.temperature {
            self.config.temperature = temperature;
        }
        if let Some(system_prompt) = update.system_prompt {
            self.config.system_prompt = system_prompt;
        }
        tracing::debug!(model = self.config.model.id(), temperature = self.config.temperature, "session config updated");
    }

    /// Start a send from the current draft.
    ///
    /// Returns `None` without touching the conversation when the trimmed draft
    /// is empty (the input error is set) or when a send is already in flight.
    pub fn begin_send(&mut self) -> Option<PendingSend> {
        if self.in_flight {
            tracing::debug!("send ignored while a reply is pending");
            return None;
        }

        let message = self.draft.trim().to_string();
        if message.is_empty() {
            self.error = Some(EMPTY_DRAFT_ERROR.to_string());
            return None;
        }

        let label = if self.guess_intent {
            PlaceholderLabel::guess(&message)
        } else {
            PlaceholderLabel::Typing
        };
        let placeholder = ConversationEntry::placeholder(label);
        let placeholder_id = placeholder.id;

        self.entries.push(ConversationEntry::new(ConversationRole::User, message.clone()));
        self.entries.push(placeholder);
        self.draft.clear();
        self.error = None;
        self.in_flight = true;

        let payload = ChatPayload {
            message,
            model: self.config.model,
            system_prompt: self.config.system_prompt.trim().to_string(),
            temperature: self.config.temperature,
        };

        tracing::info!(%placeholder_id, model = payload.model.id(), "send started");

        Some(PendingSend { placeholder_id, payload })
    }

    /// Swap the label of a still-loading placeholder
    pub fn relabel(&mut self, placeholder_id: Uuid, label: PlaceholderLabel) {
        if let Some(entry) = self.pending_placeholder(placeholder_id) {
            entry.content = label.text().to_string();
        }
    }

    /// Replace the placeholder with its terminal content. The in-flight flag is
    /// cleared whether or not the placeholder still exists.
    pub fn settle(&mut self, placeholder_id: Uuid, outcome: ChatOutcome) {
        self.in_flight = false;

        let content = match &outcome {
            ChatOutcome::Reply(Some(text)) if !text.trim().is_empty() => text.clone(),
            ChatOutcome::Reply(_) => EMPTY_REPLY.to_string(),
            ChatOutcome::ApiError(message) => {
                tracing::warn!(%placeholder_id, error = %message, "chat endpoint reported an error");
                self.error = Some(message.clone());
                format!("Error: {}", message)
            }
            ChatOutcome::Transport(detail) => {
                tracing::error!(%placeholder_id, error = %detail, "chat request failed");
                self.error = Some(GENERIC_ERROR.to_string());
                format!("Error: {}", GENERIC_ERROR)
            }
        };

        match self.pending_placeholder(placeholder_id) {
            Some(entry) => {
                entry.content = content;
                entry.loading = false;
                tracing::info!(%placeholder_id, "send settled");
            }
            None => {
                tracing::debug!(%placeholder_id, "dropping reply for a placeholder that is gone");
            }
        }
    }

    /// Run a complete send against `backend`
    pub async fn send<B: ChatBackend + ?Sized>(&mut self, backend: &B) -> Option<Uuid> {
        let pending = self.begin_send()?;
        let result = backend.chat(&pending.payload).await;

        if let Ok(response) = &result {
            if let Some(label) = response.intent.as_ref().and_then(|intent| intent.label()) {
                self.relabel(pending.placeholder_id, label);
            }
        }

        self.settle(pending.placeholder_id, ChatOutcome::from_result(result));
        Some(pending.placeholder_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append a settled system entry, e.g. command help
    pub fn push_notice(&mut self, content: impl Into<String>) {
        self.entries.push(ConversationEntry::new(ConversationRole::System, content));
    }

    pub fn apply_history(&mut self, conversations: Vec<ConversationSummary>) {
        tracing::info!(count = conversations.len(), "conversation list loaded");
        self.conversations = conversations;
    }

    /// Replace the whole conversation with server history
    pub fn apply_conversation(&mut self, id: String, history: Vec<ConversationEntry>) {
        tracing::info!(conversation = %id, entries = history.len(), "conversation loaded");
        self.entries = history
            .into_iter()
            .map(|entry| ConversationEntry {
                id: Uuid::new_v4(),
                loading: false,
                ..entry
            })
            .collect();
        self.active_conversation = Some(id);
    }

    /// Reset to a fresh conversation with a single welcome entry
    pub fn apply_new_conversation(&mut self, id: Option<String>) {
        self.entries = vec![ConversationEntry::new(ConversationRole::Assistant, WELCOME_MESSAGE)];
        self.active_conversation = id;
    }

    pub async fn load_history<B: ChatBackend + ?Sized>(&mut self, backend: &B) {
        match backend.list_conversations().await {
            Ok(conversations) => self.apply_history(conversations),
            Err(e) => {
                tracing::error!(error = %e, "failed to load conversation list");
                self.error = Some(format!("Could not load conversations: {}", e));
            }
        }
    }

    pub async fn select_conversation<B: ChatBackend + ?Sized>(&mut self, backend: &B, id: &str) {
        match backend.fetch_conversation(id).await {
            Ok(history) => self.apply_conversation(id.to_string(), history),
            Err(e) => {
                tracing::error!(conversation = %id, error = %e, "failed to load conversation");
                self.error = Some(format!("Could not load conversation: {}", e));
            }
        }
    }

    pub async fn start_new_conversation<B: ChatBackend + ?Sized>(&mut self, backend: &B, title: &str) {
        match backend.create_conversation(title).await {
            Ok(id) => self.apply_new_conversation(id),
            Err(e) => {
                tracing::error!(error = %e, "failed to create conversation");
                self.error = Some(format!("Could not start a new conversation: {}", e));
            }
        }
    }

    fn pending_placeholder(&mut self, placeholder_id: Uuid) -> Option<&mut ConversationEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == placeholder_id && entry.loading)
    }
}
