pub mod conversation;
pub mod theme;

pub use theme::Theme;
