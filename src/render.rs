//! Content classification and rendering of conversation entries into
//! styled terminal lines.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use uuid::Uuid;

use crate::events::{ConversationEntry, ConversationRole};
use crate::session::EMPTY_REPLY;
use crate::ui::theme::Theme;

pub const IMAGE_PREFIX: &str = "![Generated Image](";
pub const INVALID_IMAGE: &str = "Invalid image URL";
pub const RENDER_FAILED: &str = "⚠ Could not render this message";

/// Entries above this size are not rendered
pub const MAX_RENDER_BYTES: usize = 256 * 1024;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("message too large to display ({0} bytes)")]
    TooLarge(usize),
}

/// How an entry is displayed, decided at render time from its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryView<'a> {
    Loading(&'a str),
    Image(&'a str),
    InvalidImage,
    Markdown(&'a str),
    Plain(&'a str),
}

/// Result of matching the generated-image directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef<'a> {
    NotImage,
    Valid(&'a str),
    Invalid,
}

/// Match `![Generated Image](<url>)` by exact prefix/suffix stripping
pub fn parse_generated_image(content: &str) -> ImageRef<'_> {
    let Some(rest) = content.trim().strip_prefix(IMAGE_PREFIX) else {
        return ImageRef::NotImage;
    };

    match rest.strip_suffix(')') {
        Some(url) if !url.is_empty() && !url.chars().any(char::is_whitespace) => ImageRef::Valid(url),
        _ => ImageRef::Invalid,
    }
}

pub fn classify(entry: &ConversationEntry) -> EntryView<'_> {
    if entry.loading {
        return EntryView::Loading(&entry.content);
    }

    if entry.role == ConversationRole::Assistant {
        return match parse_generated_image(&entry.content) {
            ImageRef::Valid(url) => EntryView::Image(url),
            ImageRef::Invalid => EntryView::InvalidImage,
            ImageRef::NotImage => EntryView::Markdown(&entry.content),
        };
    }

    EntryView::Plain(&entry.content)
}

/// Body lines for one entry. `tick` drives the loading animation.
pub fn render_entry(
    entry: &ConversationEntry,
    theme: &Theme,
    tick: usize,
) -> Result<Vec<Line<'static>>, RenderError> {
    if entry.content.len() > MAX_RENDER_BYTES {
        return Err(RenderError::TooLarge(entry.content.len()));
    }

    let lines = match classify(entry) {
        EntryView::Loading(label) => {
            let dots = match tick % 4 {
                0 => ".",
                1 => "..",
                2 => "...",
                _ => "",
            };
            vec![Line::from(vec![
                Span::styled(label.trim_end_matches('.').to_string(), theme.loading),
                Span::styled(dots, theme.loading),
            ])]
        }
        EntryView::Image(url) => vec![Line::from(vec![
            Span::styled("🖼  Generated image ", theme.assistant.add_modifier(Modifier::BOLD)),
            Span::styled(url.to_string(), theme.link),
            Span::styled(" ↗", theme.meta),
        ])],
        EntryView::InvalidImage => vec![Line::from(Span::styled(INVALID_IMAGE, theme.error))],
        EntryView::Markdown(text) => render_markdown(text, theme),
        EntryView::Plain(text) => render_plain(text, role_style(entry.role, theme)),
    };

    Ok(lines)
}

/// Run `render` for one entry and downgrade any fault, returned or panicked,
/// to an inline notice so sibling entries still render.
pub fn isolate<F>(entry_id: Uuid, theme: &Theme, render: F) -> Vec<Line<'static>>
where
    F: FnOnce() -> Result<Vec<Line<'static>>, RenderError>,
{
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(lines)) => lines,
        Ok(Err(e)) => {
            tracing::warn!(entry = %entry_id, error = %e, "failed to render entry");
            vec![Line::from(Span::styled(RENDER_FAILED, theme.error))]
        }
        Err(_) => {
            tracing::error!(entry = %entry_id, "entry renderer panicked");
            vec![Line::from(Span::styled(RENDER_FAILED, theme.error))]
        }
    }
}

pub fn role_style(role: ConversationRole, theme: &Theme) -> Style {
    match role {
        ConversationRole::User => theme.user,
        ConversationRole::Assistant => theme.assistant,
        ConversationRole::System => theme.system,
    }
}

pub fn render_plain(text: &str, style: Style) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return vec![Line::from(Span::styled(EMPTY_REPLY, style))];
    }

    text.lines()
        .map(|line| Line::from(Span::styled(line.to_string(), style)))
        .collect()
}

/// Plain-text form of an entry body, for non-interactive output
pub fn entry_to_text(entry: &ConversationEntry, theme: &Theme) -> String {
    let lines = render_entry(entry, theme, 2).unwrap_or_else(|e| vec![Line::from(e.to_string())]);
    lines
        .iter()
        .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_markdown(text: &str, theme: &Theme) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut renderer = MarkdownRenderer::new(theme);
    for event in Parser::new_ext(text, options) {
        renderer.handle(event);
    }
    renderer.finish()
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    header_rows: usize,
}

struct MarkdownRenderer<'t> {
    theme: &'t Theme,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    links: Vec<String>,
    quote_depth: usize,
    in_code_block: bool,
    table: Option<TableState>,
}

impl<'t> MarkdownRenderer<'t> {
    fn new(theme: &'t Theme) -> Self {
        Self {
            theme,
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![theme.assistant],
            lists: Vec::new(),
            links: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
            table: None,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or(self.theme.assistant)
    }

    fn push_style(&mut self, patch: Style) {
        let next = self.style().patch(patch);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn push_text(&mut self, text: &str, style: Style) {
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(text);
            return;
        }
        if self.current.is_empty() && self.quote_depth > 0 {
            self.current
                .push(Span::styled("│ ".repeat(self.quote_depth), self.theme.quote));
        }
        self.current.push(Span::styled(text.to_string(), style));
    }

    fn flush_line(&mut self) {
        if !self.current.is_empty() {
            let spans = std::mem::take(&mut self.current);
            self.lines.push(Line::from(spans));
        }
    }

    fn blank_line(&mut self) {
        self.flush_line();
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    // code text may arrive in several events; newlines end lines
                    for chunk in text.split_inclusive('\n') {
                        if self.current.is_empty() {
                            self.push_text("  ", self.theme.code);
                        }
                        self.push_text(chunk.trim_end_matches('\n'), self.theme.code);
                        if chunk.ends_with('\n') {
                            self.flush_line();
                        }
                    }
                } else {
                    let style = self.style();
                    self.push_text(&text, style);
                }
            }
            Event::Code(code) => self.push_text(&code, self.theme.code),
            Event::SoftBreak => {
                let style = self.style();
                self.push_text(" ", style);
            }
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.blank_line();
                self.lines.push(Line::from(Span::styled("─".repeat(24), self.theme.meta)));
            }
            Event::TaskListMarker(done) => {
                let marker = if done { "[x] " } else { "[ ] " };
                self.push_text(marker, self.theme.meta);
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let style = self.style();
                self.push_text(&html, style);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { .. } => {
                self.blank_line();
                self.push_style(self.theme.heading);
            }
            Tag::BlockQuote { .. } => {
                self.flush_line();
                self.quote_depth += 1;
                self.push_style(self.theme.quote);
            }
            Tag::CodeBlock(kind) => {
                self.blank_line();
                self.in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.lines.push(Line::from(Span::styled(format!("  ({})", lang), self.theme.meta)));
                    }
                }
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let label = format!("{}{}. ", indent, n);
                        *n += 1;
                        label
                    }
                    _ => format!("{}• ", indent),
                };
                self.push_text(&bullet, self.theme.meta);
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } => {
                self.links.push(dest_url.to_string());
                self.push_style(self.theme.link);
            }
            Tag::Image { dest_url, .. } => {
                self.links.push(dest_url.to_string());
                self.push_text("🖼 ", self.theme.meta);
                self.push_style(self.theme.link);
            }
            Tag::Table(_) => {
                self.blank_line();
                self.table = Some(TableState::default());
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.blank_line(),
            TagEnd::Heading(_) => {
                self.pop_style();
                self.blank_line();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.pop_style();
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link | TagEnd::Image => {
                self.pop_style();
                if let Some(url) = self.links.pop() {
                    self.push_text(&format!(" ({}) ↗", url), self.theme.meta);
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                    table.header_rows = table.rows.len();
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.emit_table(table);
                }
                self.blank_line();
            }
            _ => {}
        }
    }

    fn emit_table(&mut self, table: TableState) {
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &table.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        for (index, row) in table.rows.iter().enumerate() {
            let mut spans = Vec::new();
            for (i, width) in widths.iter().enumerate() {
                if i > 0 {
                    spans.push(Span::styled(" │ ", self.theme.meta));
                }
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                let padded = format!("{:<width$}", cell, width = *width);
                let style = if index < table.header_rows {
                    self.theme.assistant.add_modifier(Modifier::BOLD)
                } else {
                    self.theme.assistant
                };
                spans.push(Span::styled(padded, style));
            }
            self.lines.push(Line::from(spans));

            if index + 1 == table.header_rows {
                let rule = widths
                    .iter()
                    .map(|w| "─".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("─┼─");
                self.lines.push(Line::from(Span::styled(rule, self.theme.meta)));
            }
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush_line();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(Line::from(Span::styled(EMPTY_REPLY, self.theme.assistant)));
        }
        self.lines
    }
}

/// Wrap styled lines to `width` columns on word boundaries. Words wider than
/// `width`, such as long URLs, are split at character boundaries.
pub fn wrap_lines(lines: Vec<Line<'static>>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return lines;
    }

    let mut wrapped = Vec::new();
    for line in lines {
        if line.width() <= width {
            wrapped.push(line);
            continue;
        }

        let mut current: Vec<Span<'static>> = Vec::new();
        let mut current_width = 0;

        for span in line.spans {
            let style = span.style;
            for word in span.content.split_inclusive(' ') {
                let word_width = UnicodeWidthStr::width(word);
                if current_width + word_width > width && current_width > 0 {
                    wrapped.push(Line::from(std::mem::take(&mut current)));
                    current_width = 0;
                }
                if word_width <= width {
                    current.push(Span::styled(word.to_string(), style));
                    current_width += word_width;
                    continue;
                }

                let mut piece = String::new();
                for c in word.chars() {
                    let char_width = c.width().unwrap_or(0);
                    if current_width + char_width > width {
                        if c == ' ' {
                            continue;
                        }
                        if !piece.is_empty() {
                            current.push(Span::styled(std::mem::take(&mut piece), style));
                        }
                        wrapped.push(Line::from(std::mem::take(&mut current)));
                        current_width = 0;
                    }
                    piece.push(c);
                    current_width += char_width;
                }
                if !piece.is_empty() {
                    current.push(Span::styled(piece, style));
                }
            }
        }

        if !current.is_empty() {
            wrapped.push(Line::from(current));
        }
    }

    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(content: &str) -> ConversationEntry {
        ConversationEntry::new(ConversationRole::Assistant, content)
    }

    fn text_of(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn generated_image_url_is_extracted() {
        let entry = assistant("![Generated Image](https://x/y.png)");
        assert_eq!(classify(&entry), EntryView::Image("https://x/y.png"));

        let lines = render_entry(&entry, &Theme::dark(), 0).unwrap();
        let text = text_of(&lines).join("");
        assert!(text.contains("https://x/y.png"));
        assert!(!text.contains("![Generated Image]"));
    }

    #[test]
    fn malformed_image_yields_notice() {
        let entry = assistant("![Generated Image](broken");
        assert_eq!(classify(&entry), EntryView::InvalidImage);

        let lines = render_entry(&entry, &Theme::dark(), 0).unwrap();
        assert_eq!(text_of(&lines), vec![INVALID_IMAGE.to_string()]);

        assert_eq!(parse_generated_image("![Generated Image]()"), ImageRef::Invalid);
        assert_eq!(parse_generated_image("![Generated Image](a b)"), ImageRef::Invalid);
    }

    #[test]
    fn loading_wins_over_everything() {
        let mut entry = assistant("Typing...");
        entry.loading = true;
        assert_eq!(classify(&entry), EntryView::Loading("Typing..."));

        let lines = render_entry(&entry, &Theme::dark(), 2).unwrap();
        assert_eq!(text_of(&lines), vec!["Typing...".to_string()]);
    }

    #[test]
    fn user_content_is_literal() {
        let entry = ConversationEntry::new(ConversationRole::User, "**not bold**");
        assert_eq!(classify(&entry), EntryView::Plain("**not bold**"));

        let lines = render_entry(&entry, &Theme::dark(), 0).unwrap();
        assert_eq!(text_of(&lines), vec!["**not bold**".to_string()]);

        let user_image = ConversationEntry::new(ConversationRole::User, "![Generated Image](https://x/y.png)");
        assert!(matches!(classify(&user_image), EntryView::Plain(_)));
    }

    #[test]
    fn empty_plain_content_uses_fallback() {
        let entry = ConversationEntry::new(ConversationRole::System, "");
        let lines = render_entry(&entry, &Theme::dark(), 0).unwrap();
        assert_eq!(text_of(&lines), vec![EMPTY_REPLY.to_string()]);
    }

    #[test]
    fn markdown_bold_lists_and_links() {
        let lines = render_markdown(
            "Some **bold** text.\n\n- one\n- two\n\n1. first\n2. second\n\nSee [docs](https://docs.rs).",
            &Theme::dark(),
        );
        let text = text_of(&lines);

        assert_eq!(text[0], "Some bold text.");
        let bold = lines[0].spans.iter().find(|s| s.content == "bold").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));

        assert!(text.contains(&"• one".to_string()));
        assert!(text.contains(&"• two".to_string()));
        assert!(text.contains(&"1. first".to_string()));
        assert!(text.contains(&"2. second".to_string()));
        assert!(text.iter().any(|l| l == "See docs (https://docs.rs) ↗."));
    }

    #[test]
    fn markdown_tables_are_aligned() {
        let lines = render_markdown("| a | bb |\n|---|---|\n| ccc | d |", &Theme::dark());
        let text = text_of(&lines);

        assert_eq!(text[0], "a   │ bb");
        assert_eq!(text[1], "────┼───");
        assert_eq!(text[2], "ccc │ d ");
    }

    #[test]
    fn code_blocks_keep_their_lines() {
        let lines = render_markdown("```rust\nfn main() {}\nlet x = 1;\n```", &Theme::dark());
        let text = text_of(&lines);

        assert_eq!(text, vec!["  (rust)", "  fn main() {}", "  let x = 1;"]);
    }

    #[test]
    fn oversized_entry_is_a_render_error() {
        let entry = assistant(&"x".repeat(MAX_RENDER_BYTES + 1));
        assert!(matches!(
            render_entry(&entry, &Theme::dark(), 0),
            Err(RenderError::TooLarge(_))
        ));
    }

    #[test]
    fn isolate_contains_errors_and_panics() {
        let theme = Theme::dark();

        let failed = isolate(Uuid::new_v4(), &theme, || Err(RenderError::TooLarge(1)));
        assert_eq!(text_of(&failed), vec![RENDER_FAILED.to_string()]);

        let panicked = isolate(Uuid::new_v4(), &theme, || panic!("renderer bug"));
        assert_eq!(text_of(&panicked), vec![RENDER_FAILED.to_string()]);

        let fine = isolate(Uuid::new_v4(), &theme, || Ok(vec![Line::from("ok")]));
        assert_eq!(text_of(&fine), vec!["ok".to_string()]);
    }

    #[test]
    fn wrapping_respects_width() {
        let lines = wrap_lines(vec![Line::from("alpha beta gamma delta")], 11);
        let text = text_of(&lines);

        assert_eq!(text, vec!["alpha beta ", "gamma delta"]);
        assert!(lines.iter().all(|l| l.width() <= 11));
    }

    #[test]
    fn long_image_urls_are_split_to_fit() {
        let url = format!("https://images.example.com/{}.png", "a".repeat(170));
        let entry = assistant(&format!("![Generated Image]({})", url));
        let lines = render_entry(&entry, &Theme::dark(), 0).unwrap();
        let wrapped = wrap_lines(lines, 40);

        assert!(wrapped.len() > 2);
        assert!(wrapped.iter().all(|l| l.width() <= 40));
        let joined: String = text_of(&wrapped).concat();
        assert!(joined.contains(&url));
    }

    #[test]
    fn wide_characters_are_split_by_display_width() {
        let lines = wrap_lines(vec![Line::from("漢字漢字漢字")], 5);
        assert!(lines.iter().all(|l| l.width() <= 5));
        assert_eq!(text_of(&lines).concat(), "漢字漢字漢字");
    }
}
