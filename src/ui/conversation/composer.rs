use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, ParsedCommand};
use crate::ui::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    /// Enter pressed on regular text (possibly blank; the session decides)
    Submitted(String),
    Command(ParsedCommand),
    /// Content changed, nothing submitted
    Edited,
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Byte offset, always on a char boundary
    pub cursor_position: usize,
}

/// Conversation composer for user input
#[derive(Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    waiting: bool,
    theme: Theme,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>, theme: Theme) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: false,
            waiting: false,
            theme,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind != KeyEventKind::Press {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                    return ConversationResult::Edited;
                }
                // a fully typed command runs; a partial one completes first
                let complete = parse_slash_command(&self.state.content).is_some();
                if self.show_command_palette && !complete && self.apply_selected_command() {
                    return ConversationResult::Edited;
                }

                self.close_command_palette();
                if let Some(command) = parse_slash_command(&self.state.content) {
                    self.clear();
                    return ConversationResult::Command(command);
                }
                return ConversationResult::Submitted(self.state.content.clone());
            }
            KeyCode::Up if self.show_command_palette => {
                self.move_command_selection(-1);
            }
            KeyCode::Down if self.show_command_palette => {
                self.move_command_selection(1);
            }
            KeyCode::Esc if self.show_command_palette => {
                self.close_command_palette();
            }
            KeyCode::Tab if self.show_command_palette => {
                if self.apply_selected_command() {
                    return ConversationResult::Edited;
                }
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    return ConversationResult::None;
                }

                self.insert_char(c);

                if self.show_command_palette {
                    if self.state.content.starts_with('/') && !c.is_whitespace() {
                        self.refresh_command_palette();
                    } else {
                        self.close_command_palette();
                    }
                } else if self.state.content == "/" {
                    self.open_command_palette();
                }
                return ConversationResult::Edited;
            }
            KeyCode::Backspace => {
                if self.backspace() {
                    self.sync_palette();
                    return ConversationResult::Edited;
                }
            }
            KeyCode::Delete => {
                if self.delete() {
                    self.sync_palette();
                    return ConversationResult::Edited;
                }
            }
            KeyCode::Left => {
                self.state.cursor_position = self.prev_boundary();
            }
            KeyCode::Right => {
                self.state.cursor_position = self.next_boundary();
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.content.len();
            }
            _ => {}
        }

        ConversationResult::None
    }

    fn prev_boundary(&self) -> usize {
        self.state.content[..self.state.cursor_position]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn next_boundary(&self) -> usize {
        self.state.content[self.state.cursor_position..]
            .chars()
            .next()
            .map(|c| self.state.cursor_position + c.len_utf8())
            .unwrap_or(self.state.cursor_position)
    }

    /// Insert a character at the cursor position
    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor_position, c);
        self.state.cursor_position += c.len_utf8();
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        if self.state.cursor_position == 0 {
            return false;
        }
        let start = self.prev_boundary();
        self.state.content.remove(start);
        self.state.cursor_position = start;
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor_position < self.state.content.len() {
            self.state.content.remove(self.state.cursor_position);
            true
        } else {
            false
        }
    }

    fn sync_palette(&mut self) {
        if self.show_command_palette {
            if self.state.content.starts_with('/') {
                self.refresh_command_palette();
            } else {
                self.close_command_palette();
            }
        }
    }

    fn open_command_palette(&mut self) {
        self.show_command_palette = true;
        self.refresh_command_palette();
        self.selected_command = Some(0);
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        if self.filtered_commands.is_empty() {
            self.selected_command = None;
        } else {
            let index = self.selected_command.unwrap_or(0);
            self.selected_command = Some(index.min(self.filtered_commands.len() - 1));
        }
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let current = self.selected_command.unwrap_or(0) as isize;
        let len = self.filtered_commands.len() as isize;
        let next = (current + delta).rem_euclid(len);
        self.selected_command = Some(next as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index).copied())
        else {
            return false;
        };

        self.state.content = format!("/{} ", entry.keyword);
        self.state.cursor_position = self.state.content.len();
        self.close_command_palette();
        true
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Mark whether a reply is pending; sending is disabled meanwhile
    pub fn set_waiting(&mut self, waiting: bool) {
        self.waiting = waiting;
    }

    pub fn palette_open(&self) -> bool {
        self.show_command_palette
    }

    pub fn get_content(&self) -> &str {
        &self.state.content
    }

    /// Replace content, moving the cursor to the end
    pub fn set_content(&mut self, content: &str) {
        if self.state.content != content {
            self.state.content = content.to_string();
            self.state.cursor_position = self.state.content.len();
        }
    }

    pub fn clear(&mut self) {
        self.state.content.clear();
        self.state.cursor_position = 0;
    }
}

impl Widget for ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = if self.waiting {
            " Waiting for reply... "
        } else {
            " Message (Enter to send) "
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(if self.has_focus && !self.waiting {
                self.theme.focus_border
            } else {
                self.theme.idle_border
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(Span::styled(self.placeholder.as_str(), self.theme.meta));
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let mut content = self.state.content.clone();
            if self.has_focus {
                content.insert(self.state.cursor_position.min(content.len()), '▌');
            }

            let lines: Vec<&str> = content.split('\n').collect();
            let height = inner_area.height as usize;
            let start = lines.len().saturating_sub(height);
            for (i, line_text) in lines[start..].iter().enumerate() {
                let line = Line::from(Span::raw(*line_text));
                buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
            }
        }

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(6) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height < 3 {
                return;
            }

            Clear.render(palette_area, buf);
            let block = Block::default()
                .borders(Borders::ALL)
                .title(" Commands ")
                .border_style(self.theme.focus_border);
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if self.selected_command == Some(index) {
                    self.theme.highlight
                } else {
                    self.theme.assistant
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled(" — ", self.theme.meta),
                    Span::styled(entry.description, self.theme.meta),
                ]);

                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}
