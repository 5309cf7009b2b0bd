use ratatui::style::{Color, Modifier, Style};

/// Styles used by every widget. Built once from the config at startup and
/// handed to the rendering layer by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub user: Style,
    pub assistant: Style,
    pub system: Style,
    pub meta: Style,
    pub loading: Style,
    pub error: Style,
    pub link: Style,
    pub code: Style,
    pub heading: Style,
    pub quote: Style,
    pub focus_border: Style,
    pub idle_border: Style,
    pub highlight: Style,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            user: Style::default().fg(Color::Cyan),
            assistant: Style::default().fg(Color::Green),
            system: Style::default().fg(Color::Yellow),
            meta: Style::default().fg(Color::DarkGray),
            loading: Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
            error: Style::default().fg(Color::Red),
            link: Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
            code: Style::default().fg(Color::Magenta),
            heading: Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            quote: Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            focus_border: Style::default().fg(Color::Green),
            idle_border: Style::default().fg(Color::Gray),
            highlight: Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        }
    }

    pub fn light() -> Self {
        Self {
            user: Style::default().fg(Color::Blue),
            assistant: Style::default().fg(Color::Black),
            system: Style::default().fg(Color::Rgb(0x99, 0x66, 0x00)),
            meta: Style::default().fg(Color::Gray),
            loading: Style::default().fg(Color::Rgb(0xff, 0x40, 0x81)).add_modifier(Modifier::ITALIC),
            error: Style::default().fg(Color::Red),
            link: Style::default().fg(Color::Rgb(0x19, 0x76, 0xd2)).add_modifier(Modifier::UNDERLINED),
            code: Style::default().fg(Color::Magenta),
            heading: Style::default().fg(Color::Black).add_modifier(Modifier::BOLD),
            quote: Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            focus_border: Style::default().fg(Color::Rgb(0x19, 0x76, 0xd2)),
            idle_border: Style::default().fg(Color::Gray),
            highlight: Style::default()
                .fg(Color::White)
                .bg(Color::Rgb(0x19, 0x76, 0xd2))
                .add_modifier(Modifier::BOLD),
        }
    }

    /// Unknown names fall back to the dark theme
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "light" => Self::light(),
            _ => Self::dark(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
