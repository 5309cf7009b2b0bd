//! Conversation history display component

use crate::events::{ConversationEntry, ConversationRole};
use crate::render::{isolate, render_entry, role_style, wrap_lines};
use crate::ui::theme::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Conversation history display component
#[derive(Clone)]
pub struct ConversationHistory {
    entries: Vec<ConversationEntry>,
    theme: Theme,
    show_timestamps: bool,
    /// Lines scrolled up from the bottom
    scroll_offset: usize,
    tick: usize,
}

impl ConversationHistory {
    pub fn new(theme: Theme, show_timestamps: bool) -> Self {
        Self {
            entries: Vec::new(),
            theme,
            show_timestamps,
            scroll_offset: 0,
            tick: 0,
        }
    }

    /// Take a snapshot of the session's entries for the next frame
    pub fn sync(&mut self, entries: &[ConversationEntry]) {
        if entries.len() != self.entries.len() {
            self.scroll_to_bottom();
        }
        self.entries = entries.to_vec();
    }

    /// Advance the loading animation
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    /// All lines for the current entries, wrapped to `width`
    pub fn build_lines(&self, width: u16) -> Vec<Line<'static>> {
        let body_width = width.saturating_sub(2) as usize;
        let mut all_lines = Vec::new();

        for entry in &self.entries {
            all_lines.push(self.header_line(entry));

            let body = isolate(entry.id, &self.theme, || render_entry(entry, &self.theme, self.tick));
            for line in wrap_lines(body, body_width) {
                let mut spans = vec![Span::raw("  ")];
                spans.extend(line.spans);
                all_lines.push(Line::from(spans));
            }

            all_lines.push(Line::default());
        }

        all_lines
    }

    fn header_line(&self, entry: &ConversationEntry) -> Line<'static> {
        let role = match entry.role {
            ConversationRole::User => "You",
            ConversationRole::Assistant => "Assistant",
            ConversationRole::System => "System",
        };

        let mut spans = vec![Span::styled(
            role.to_string(),
            role_style(entry.role, &self.theme).add_modifier(ratatui::style::Modifier::BOLD),
        )];
        if self.show_timestamps {
            let timestamp = entry.created_at.with_timezone(&chrono::Local).format("%H:%M:%S");
            spans.push(Span::styled(format!(" {}", timestamp), self.theme.meta));
        }
        Line::from(spans)
    }
}

impl Widget for ConversationHistory {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.idle_border)
            .title(" Conversation ");

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.entries.is_empty() {
            let welcome_lines = vec![
                Line::from(Span::styled("Welcome to parley!", self.theme.assistant)),
                Line::from(""),
                Line::from(Span::styled("Type a message below and press Enter.", self.theme.meta)),
                Line::from(Span::styled(
                    "F2 settings · F3 conversations · /help for commands",
                    self.theme.meta,
                )),
            ];

            for (i, line) in welcome_lines.iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            return;
        }

        let all_lines = self.build_lines(inner_area.width);

        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_offset = total.saturating_sub(height);
        let offset = self.scroll_offset.min(max_offset);
        let end = total - offset;
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }

        if offset > 0 {
            let marker = Line::from(Span::styled(format!("↓ {} more", offset), self.theme.meta));
            let x = inner_area.x + inner_area.width.saturating_sub(marker.width() as u16);
            buf.set_line(x, inner_area.y + inner_area.height.saturating_sub(1), &marker, inner_area.width);
        }
    }
}
