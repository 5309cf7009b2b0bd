//! Side panels: chat settings and saved conversations

use crate::api::ConversationSummary;
use crate::events::ChatModel;
use crate::session::{ConfigUpdate, SessionConfig};
use crate::ui::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

const TEMPERATURE_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Model,
    Temperature,
    SystemPrompt,
}

impl SettingsField {
    fn next(self) -> Self {
        match self {
            SettingsField::Model => SettingsField::Temperature,
            SettingsField::Temperature => SettingsField::SystemPrompt,
            SettingsField::SystemPrompt => SettingsField::Model,
        }
    }

    fn prev(self) -> Self {
        match self {
            SettingsField::Model => SettingsField::SystemPrompt,
            SettingsField::Temperature => SettingsField::Model,
            SettingsField::SystemPrompt => SettingsField::Temperature,
        }
    }
}

/// Step a temperature by `delta`, clamped to [0, 1] and rounded to one decimal
pub fn step_temperature(current: f32, delta: f32) -> f32 {
    ((current + delta).clamp(0.0, 1.0) * 10.0).round() / 10.0
}

/// Settings panel. It is the input control for the session config, so range
/// checks on temperature live here.
#[derive(Clone)]
pub struct SettingsPanel {
    selected: SettingsField,
    config: SessionConfig,
    theme: Theme,
}

impl SettingsPanel {
    pub fn new(theme: Theme) -> Self {
        Self {
            selected: SettingsField::Model,
            config: SessionConfig::default(),
            theme,
        }
    }

    pub fn sync(&mut self, config: &SessionConfig) {
        self.config = config.clone();
    }

    pub fn selected(&self) -> SettingsField {
        self.selected
    }

    /// Returns the edit to apply, if the key changed a value
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ConfigUpdate> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Up => {
                self.selected = self.selected.prev();
                None
            }
            KeyCode::Down | KeyCode::Tab => {
                self.selected = self.selected.next();
                None
            }
            KeyCode::Left => self.adjust(-1),
            KeyCode::Right => self.adjust(1),
            _ => None,
        }
    }

    fn adjust(&mut self, direction: i8) -> Option<ConfigUpdate> {
        match self.selected {
            SettingsField::Model => {
                let model: ChatModel = if direction > 0 {
                    self.config.model.next()
                } else {
                    self.config.model.prev()
                };
                self.config.model = model;
                Some(ConfigUpdate {
                    model: Some(model),
                    ..Default::default()
                })
            }
            SettingsField::Temperature => {
                let temperature = step_temperature(self.config.temperature, TEMPERATURE_STEP * direction as f32);
                self.config.temperature = temperature;
                Some(ConfigUpdate {
                    temperature: Some(temperature),
                    ..Default::default()
                })
            }
            // edited through /system
            SettingsField::SystemPrompt => None,
        }
    }
}

impl Widget for SettingsPanel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.focus_border)
            .title(" Settings (F2) ");

        let marker = |field: SettingsField| {
            if self.selected == field {
                self.theme.highlight
            } else {
                self.theme.assistant
            }
        };

        let filled = (self.config.temperature * 10.0).round() as usize;
        let slider = format!("{}{}", "█".repeat(filled), "░".repeat(10usize.saturating_sub(filled)));

        let lines = vec![
            Line::from(Span::styled("Model", marker(SettingsField::Model))),
            Line::from(Span::styled(format!("  ◂ {} ▸", self.config.model.id()), self.theme.user)),
            Line::from(""),
            Line::from(Span::styled("Temperature", marker(SettingsField::Temperature))),
            Line::from(Span::styled(
                format!("  {} {:.1}", slider, self.config.temperature),
                self.theme.user,
            )),
            Line::from(""),
            Line::from(Span::styled("System prompt", marker(SettingsField::SystemPrompt))),
            Line::from(Span::styled(format!("  {}", self.config.system_prompt), self.theme.user)),
            Line::from(""),
            Line::from(Span::styled("↑↓ select · ←→ change · /system <text>", self.theme.meta)),
        ];

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

/// Saved conversations fetched from the server
#[derive(Clone)]
pub struct ConversationListPanel {
    conversations: Vec<ConversationSummary>,
    active: Option<String>,
    selected: usize,
    theme: Theme,
}

impl ConversationListPanel {
    pub fn new(theme: Theme) -> Self {
        Self {
            conversations: Vec::new(),
            active: None,
            selected: 0,
            theme,
        }
    }

    pub fn sync(&mut self, conversations: &[ConversationSummary], active: Option<&str>) {
        self.conversations = conversations.to_vec();
        self.active = active.map(str::to_string);
        self.selected = self.selected.min(self.conversations.len().saturating_sub(1));
    }

    /// Returns the id to open when Enter is pressed on a row
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<String> {
        if key.kind != KeyEventKind::Press || self.conversations.is_empty() {
            return None;
        }

        let len = self.conversations.len();
        match key.code {
            KeyCode::Up => self.selected = (self.selected + len - 1) % len,
            KeyCode::Down => self.selected = (self.selected + 1) % len,
            KeyCode::Enter => return Some(self.conversations[self.selected].id.clone()),
            _ => {}
        }
        None
    }
}

/// Rows of the list that fit in `height` lines with `selected` kept in view.
/// Each conversation takes two lines.
fn visible_rows(selected: usize, len: usize, height: u16) -> std::ops::Range<usize> {
    let per_page = (height as usize / 2).max(1);
    let first = (selected + 1).saturating_sub(per_page);
    first..(first + per_page).min(len)
}

/// Resolve `/open` arguments: a 1-based list number or a raw id
pub fn resolve_conversation(conversations: &[ConversationSummary], arg: &str) -> String {
    arg.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| conversations.get(index))
        .map(|summary| summary.id.clone())
        .unwrap_or_else(|| arg.to_string())
}

/// Server timestamps are free-form; show RFC 3339 ones in local time
fn display_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

impl Widget for ConversationListPanel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.focus_border)
            .title(" Conversations (F3) ");

        let mut lines = Vec::new();
        if self.conversations.is_empty() {
            lines.push(Line::from(Span::styled("No conversations loaded.", self.theme.meta)));
            lines.push(Line::from(Span::styled("Use /history to fetch them.", self.theme.meta)));
        }

        let rows = visible_rows(self.selected, self.conversations.len(), block.inner(area).height);
        for (index, summary) in self.conversations.iter().enumerate().skip(rows.start).take(rows.len()) {
            let title = if summary.title.is_empty() { "(untitled)" } else { summary.title.as_str() };
            let is_active = self.active.as_deref() == Some(summary.id.as_str());
            let style = if index == self.selected {
                self.theme.highlight
            } else if is_active {
                self.theme.user
            } else {
                self.theme.assistant
            };

            lines.push(Line::from(Span::styled(format!("{}. {}", index + 1, title), style)));
            lines.push(Line::from(Span::styled(
                format!("   {}", display_timestamp(&summary.timestamp)),
                self.theme.meta,
            )));
        }

        Paragraph::new(lines).block(block).render(area, buf);
    }
}
