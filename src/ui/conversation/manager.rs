use crate::api::{ChatBackend, ReplyIntent};
use crate::config::Config;
use crate::events::{AppEvent, ChatOutcome};
use crate::session::{ConfigUpdate, PendingSend, SessionController};
use crate::ui::conversation::commands::{get_help_text, ParsedCommand, SlashCommand};
use crate::ui::conversation::composer::{ConversationComposer, ConversationResult};
use crate::ui::conversation::history::ConversationHistory;
use crate::ui::conversation::panels::{resolve_conversation, ConversationListPanel, SettingsPanel};
use crate::ui::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";
const WAIT_FOR_REPLY: &str = "Wait for the current reply first.";

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Manages the conversation flow and UI components
pub struct ConversationManager {
    session: SessionController,
    backend: Arc<dyn ChatBackend>,
    events: mpsc::UnboundedSender<AppEvent>,
    history: ConversationHistory,
    composer: ConversationComposer,
    settings: SettingsPanel,
    conversation_list: ConversationListPanel,
    show_conversations: bool,
    theme: Theme,
    reply_delay: Duration,
    endpoint: String,
}

impl ConversationManager {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ChatBackend>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let theme = Theme::from_name(&config.ui.theme);
        let mut composer = ConversationComposer::new("Ask anything...", theme);
        composer.set_focus(true);

        let mut manager = Self {
            session: SessionController::from_config(config),
            backend,
            events,
            history: ConversationHistory::new(theme, config.ui.show_timestamps),
            composer,
            settings: SettingsPanel::new(theme),
            conversation_list: ConversationListPanel::new(theme),
            show_conversations: false,
            theme,
            reply_delay: Duration::from_millis(config.reply_delay_ms),
            endpoint: config.base_url.clone(),
        };
        manager.sync_view();
        manager
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let action = match key.code {
            KeyCode::Char('c') if ctrl => ConversationAction::Exit,
            KeyCode::Char('l') if ctrl => {
                self.session.clear();
                ConversationAction::None
            }
            KeyCode::F(2) => {
                self.toggle_settings();
                ConversationAction::None
            }
            KeyCode::F(3) => {
                self.toggle_conversations();
                ConversationAction::None
            }
            KeyCode::PageUp => {
                self.history.scroll_up(5);
                ConversationAction::None
            }
            KeyCode::PageDown => {
                self.history.scroll_down(5);
                ConversationAction::None
            }
            KeyCode::Esc if self.session.settings_open() || self.show_conversations => {
                if self.session.settings_open() {
                    self.session.toggle_settings();
                }
                self.show_conversations = false;
                ConversationAction::None
            }
            KeyCode::Esc if self.session.error().is_some() => {
                self.session.dismiss_error();
                ConversationAction::None
            }
            KeyCode::Up | KeyCode::Down | KeyCode::Left | KeyCode::Right | KeyCode::Tab
                if self.session.settings_open() =>
            {
                if let Some(update) = self.settings.handle_key(key) {
                    self.session.update_config(update);
                }
                ConversationAction::None
            }
            // The list only takes Enter while the composer is empty; a typed
            // draft is always sent.
            KeyCode::Up | KeyCode::Down if self.show_conversations && !self.composer.palette_open() => {
                self.conversation_list.handle_key(key);
                ConversationAction::None
            }
            KeyCode::Enter
                if self.show_conversations
                    && !self.session.conversations().is_empty()
                    && self.composer.get_content().trim().is_empty() =>
            {
                if let Some(id) = self.conversation_list.handle_key(key) {
                    self.request_open(id);
                }
                ConversationAction::None
            }
            _ => self.handle_composer_key(key),
        };

        self.sync_view();
        action
    }

    pub fn handle_paste(&mut self, text: &str) {
        let mut content = self.composer.get_content().to_string();
        content.push_str(text);
        self.composer.set_content(&content);
        self.session.update_draft(content);
        self.sync_view();
    }

    fn handle_composer_key(&mut self, key: KeyEvent) -> ConversationAction {
        match self.composer.handle_key(key) {
            ConversationResult::Submitted(text) => {
                self.session.update_draft(text);
                if let Some(pending) = self.session.begin_send() {
                    self.spawn_send(pending);
                }
                self.composer.set_content(self.session.draft());
                ConversationAction::None
            }
            ConversationResult::Command(command) => {
                self.session.update_draft(self.composer.get_content().to_string());
                self.handle_slash_command(command)
            }
            ConversationResult::Edited => {
                self.session.update_draft(self.composer.get_content().to_string());
                ConversationAction::None
            }
            ConversationResult::None => ConversationAction::None,
        }
    }

    /// Apply a result delivered by a background task
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ChatSettled { placeholder_id, outcome } => {
                self.session.settle(placeholder_id, outcome);
            }
            AppEvent::PlaceholderRelabel { placeholder_id, label } => {
                self.session.relabel(placeholder_id, label);
            }
            AppEvent::HistoryLoaded(Ok(conversations)) => {
                self.session.apply_history(conversations);
            }
            AppEvent::HistoryLoaded(Err(e)) => {
                self.session.set_error(format!("Could not load conversations: {}", e));
            }
            AppEvent::ConversationLoaded { id, result: Ok(history) } => {
                self.session.apply_conversation(id, history);
                self.show_conversations = false;
            }
            AppEvent::ConversationLoaded { id, result: Err(e) } => {
                tracing::error!(conversation = %id, error = %e, "failed to load conversation");
                self.session.set_error(format!("Could not load conversation: {}", e));
            }
            AppEvent::ConversationCreated(Ok(id)) => {
                self.session.apply_new_conversation(id);
            }
            AppEvent::ConversationCreated(Err(e)) => {
                self.session.set_error(format!("Could not start a new conversation: {}", e));
            }
        }
        self.sync_view();
    }

    /// Advance animations
    pub fn tick(&mut self) {
        if self.session.is_in_flight() {
            self.history.tick();
            self.history.sync(self.session.entries());
        }
    }

    fn spawn_send(&self, pending: PendingSend) {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        let delay = self.reply_delay;

        tokio::spawn(async move {
            let PendingSend { placeholder_id, payload } = pending;
            let result = backend.chat(&payload).await;

            if let Ok(response) = &result {
                if let Some(label) = response.intent.as_ref().and_then(ReplyIntent::label) {
                    let _ = events.send(AppEvent::PlaceholderRelabel { placeholder_id, label });
                }
                if response.error.is_none() && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let outcome = ChatOutcome::from_result(result);
            if events.send(AppEvent::ChatSettled { placeholder_id, outcome }).is_err() {
                tracing::debug!(%placeholder_id, "event loop closed before reply arrived");
            }
        });
    }

    fn request_history(&self) {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = backend.list_conversations().await.map_err(|e| e.to_string());
            let _ = events.send(AppEvent::HistoryLoaded(result));
        });
    }

    /// Open a conversation unless a reply is still pending
    fn request_open(&mut self, id: String) {
        if self.session.is_in_flight() && !SlashCommand::Open.available_while_waiting() {
            self.session.set_error(WAIT_FOR_REPLY);
            return;
        }
        self.open_conversation(id);
    }

    fn open_conversation(&self, id: String) {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = backend.fetch_conversation(&id).await.map_err(|e| e.to_string());
            let _ = events.send(AppEvent::ConversationLoaded { id, result });
        });
    }

    fn create_conversation(&self, title: String) {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = backend.create_conversation(&title).await.map_err(|e| e.to_string());
            let _ = events.send(AppEvent::ConversationCreated(result));
        });
    }

    fn toggle_settings(&mut self) {
        self.session.toggle_settings();
        if self.session.settings_open() {
            self.show_conversations = false;
        }
    }

    fn toggle_conversations(&mut self) {
        self.show_conversations = !self.show_conversations;
        if self.show_conversations {
            if self.session.settings_open() {
                self.session.toggle_settings();
            }
            if self.session.conversations().is_empty() {
                self.request_history();
            }
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        if self.session.is_in_flight() && !command.command.available_while_waiting() {
            self.session.set_error(WAIT_FOR_REPLY);
            return ConversationAction::None;
        }

        match command.command {
            SlashCommand::Model => match command.model_target() {
                Some(model) => self.session.update_config(ConfigUpdate {
                    model: Some(model),
                    ..Default::default()
                }),
                None => self
                    .session
                    .set_error("Usage: /model <gpt-4o|gpt-4o-mini|o1-mini|o1-preview>"),
            },
            SlashCommand::Temp => match command.temperature_target() {
                Some(temperature) => self.session.update_config(ConfigUpdate {
                    temperature: Some(temperature),
                    ..Default::default()
                }),
                None => self.session.set_error("Usage: /temp <number between 0 and 1>"),
            },
            SlashCommand::System => match command.argument() {
                Some(prompt) => self.session.update_config(ConfigUpdate {
                    system_prompt: Some(prompt.to_string()),
                    ..Default::default()
                }),
                None => self.session.set_error("Usage: /system <prompt text>"),
            },
            SlashCommand::Settings => self.toggle_settings(),
            SlashCommand::Clear => self.session.clear(),
            SlashCommand::History => {
                self.show_conversations = true;
                if self.session.settings_open() {
                    self.session.toggle_settings();
                }
                self.request_history();
            }
            SlashCommand::Open => match command.argument() {
                Some(arg) => {
                    let id = resolve_conversation(self.session.conversations(), arg);
                    self.request_open(id);
                }
                None => self.session.set_error("Usage: /open <id or list number>"),
            },
            SlashCommand::New => {
                let title = command.argument().unwrap_or(DEFAULT_CONVERSATION_TITLE).to_string();
                self.create_conversation(title);
            }
            SlashCommand::Help => self.session.push_notice(get_help_text()),
            SlashCommand::Quit => return ConversationAction::Exit,
        }

        ConversationAction::None
    }

    fn sync_view(&mut self) {
        self.history.sync(self.session.entries());
        self.composer.set_waiting(self.session.is_in_flight());
        self.settings.sync(self.session.config());
        self.conversation_list
            .sync(self.session.conversations(), self.session.active_conversation());
    }

    pub fn render(&self, frame: &mut Frame) {
        let banner_height = if self.session.error().is_some() { 1 } else { 0 };
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),
                Constraint::Length(banner_height),
                Constraint::Length(5),
                Constraint::Length(1),
            ])
            .split(frame.size());

        let panel_open = self.session.settings_open() || self.show_conversations;
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(if panel_open {
                [Constraint::Min(30), Constraint::Length(38)]
            } else {
                [Constraint::Min(30), Constraint::Length(0)]
            })
            .split(rows[0]);

        frame.render_widget(self.history.clone(), columns[0]);
        if self.session.settings_open() {
            frame.render_widget(self.settings.clone(), columns[1]);
        } else if self.show_conversations {
            frame.render_widget(self.conversation_list.clone(), columns[1]);
        }

        if let Some(error) = self.session.error() {
            let banner = Line::from(vec![
                Span::styled(format!(" Error: {} ", error), self.theme.error),
                Span::styled("(Esc to dismiss)", self.theme.meta),
            ]);
            frame.render_widget(Paragraph::new(banner), rows[1]);
        }

        frame.render_widget(self.composer.clone(), rows[2]);

        let config = self.session.config();
        let mut status = vec![
            Span::styled(format!(" {} ", config.model.id()), self.theme.highlight),
            Span::styled(format!(" temp {:.1} ", config.temperature), self.theme.meta),
            Span::styled(format!(" {} ", self.endpoint), self.theme.meta),
        ];
        if let Some(id) = self.session.active_conversation() {
            status.push(Span::styled(format!(" #{} ", id), self.theme.meta));
        }
        if self.session.is_in_flight() {
            status.push(Span::styled(" waiting for reply ", self.theme.loading));
        }
        frame.render_widget(Paragraph::new(Line::from(status)), rows[3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::FakeBackend;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn manager(backend: FakeBackend) -> (ConversationManager, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Config {
            reply_delay_ms: 0,
            guess_intent: false,
            ..Config::default()
        };
        (ConversationManager::new(&config, Arc::new(backend), tx), rx)
    }

    fn type_text(manager: &mut ConversationManager, text: &str) {
        for c in text.chars() {
            manager.handle_key(press(KeyCode::Char(c)));
        }
    }

    #[tokio::test]
    async fn typed_message_round_trips_through_the_event_channel() {
        let (mut manager, mut rx) = manager(FakeBackend::text("Hi there"));
        type_text(&mut manager, "Hello");
        manager.handle_key(press(KeyCode::Enter));

        assert!(manager.session().is_in_flight());
        assert_eq!(manager.session().entries().len(), 2);
        assert_eq!(manager.session().draft(), "");

        let event = rx.recv().await.unwrap();
        manager.handle_event(event);

        let entries = manager.session().entries();
        assert_eq!(entries[0].content, "Hello");
        assert_eq!(entries[1].content, "Hi there");
        assert!(!entries[1].loading);
        assert!(!manager.session().is_in_flight());
    }

    #[tokio::test]
    async fn enter_while_waiting_keeps_the_draft() {
        let (mut manager, _rx) = manager(FakeBackend::text("Hi"));
        type_text(&mut manager, "first");
        manager.handle_key(press(KeyCode::Enter));

        type_text(&mut manager, "second");
        manager.handle_key(press(KeyCode::Enter));

        assert_eq!(manager.session().entries().len(), 2);
        assert_eq!(manager.session().draft(), "second");
    }

    #[tokio::test]
    async fn blank_enter_sets_input_error() {
        let (mut manager, _rx) = manager(FakeBackend::text("unused"));
        manager.handle_key(press(KeyCode::Enter));

        assert!(manager.session().entries().is_empty());
        assert_eq!(manager.session().error(), Some(crate::session::EMPTY_DRAFT_ERROR));

        manager.handle_key(press(KeyCode::Esc));
        assert_eq!(manager.session().error(), None);
    }

    #[tokio::test]
    async fn slash_commands_edit_config() {
        let (mut manager, _rx) = manager(FakeBackend::text("unused"));
        type_text(&mut manager, "/model o1-preview");
        manager.handle_key(press(KeyCode::Enter));
        type_text(&mut manager, "/temp 0.2");
        manager.handle_key(press(KeyCode::Enter));

        let config = manager.session().config();
        assert_eq!(config.model, crate::events::ChatModel::O1Preview);
        assert_eq!(config.temperature, 0.2);
        assert!(manager.session().entries().is_empty());
    }

    #[tokio::test]
    async fn quit_command_exits() {
        let (mut manager, _rx) = manager(FakeBackend::text("unused"));
        type_text(&mut manager, "/quit");
        assert_eq!(manager.handle_key(press(KeyCode::Enter)), ConversationAction::Exit);
    }

    fn summary(id: &str, title: &str) -> crate::api::ConversationSummary {
        crate::api::ConversationSummary {
            id: id.to_string(),
            title: title.to_string(),
            timestamp: String::new(),
        }
    }

    #[tokio::test]
    async fn typed_draft_is_sent_while_conversation_list_is_open() {
        let (mut manager, _rx) = manager(FakeBackend::text("Hi"));
        manager.handle_key(press(KeyCode::F(3)));
        manager.handle_event(AppEvent::HistoryLoaded(Ok(vec![summary("1", "Old chat")])));

        type_text(&mut manager, "Hello");
        manager.handle_key(press(KeyCode::Enter));

        assert_eq!(manager.session().entries().len(), 2);
        assert_eq!(manager.session().entries()[0].content, "Hello");
        assert!(manager.session().is_in_flight());
        assert_eq!(manager.session().active_conversation(), None);
    }

    #[tokio::test]
    async fn typed_draft_is_sent_when_conversation_list_is_empty() {
        let (mut manager, _rx) = manager(FakeBackend::text("Hi"));
        manager.handle_key(press(KeyCode::F(3)));

        type_text(&mut manager, "Hello");
        manager.handle_key(press(KeyCode::Enter));

        assert_eq!(manager.session().entries().len(), 2);
        assert_eq!(manager.session().draft(), "");
    }

    #[tokio::test]
    async fn enter_on_empty_composer_opens_selected_conversation() {
        let (mut manager, mut rx) = manager(FakeBackend::text("Hi"));
        manager.handle_event(AppEvent::HistoryLoaded(Ok(vec![summary("1", "Old chat")])));
        manager.handle_key(press(KeyCode::F(3)));
        manager.handle_key(press(KeyCode::Enter));

        match rx.recv().await.unwrap() {
            AppEvent::ConversationLoaded { id, .. } => assert_eq!(id, "1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn opening_from_the_list_waits_for_pending_reply() {
        let (mut manager, _rx) = manager(FakeBackend::text("Hi"));
        type_text(&mut manager, "Hello");
        manager.handle_key(press(KeyCode::Enter));
        assert!(manager.session().is_in_flight());

        manager.handle_event(AppEvent::HistoryLoaded(Ok(vec![summary("1", "Old chat")])));
        manager.handle_key(press(KeyCode::F(3)));
        manager.handle_key(press(KeyCode::Enter));

        assert_eq!(manager.session().error(), Some(WAIT_FOR_REPLY));
        assert_eq!(manager.session().entries().len(), 2);
    }
}
