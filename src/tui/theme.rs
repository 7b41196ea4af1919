// src/tui/theme.rs — Color scheme and style definitions for the chat screen.

use ratatui::style::{Color, Modifier, Style};

/// Slate-and-amber palette.
pub struct Theme;

impl Theme {
    // ── Palette ──────────────────────────────────────────────────
    pub const AMBER: Color = Color::Rgb(235, 170, 70);
    pub const SLATE_WHITE: Color = Color::Rgb(235, 235, 235);
    pub const SLATE_GRAY: Color = Color::Rgb(125, 130, 145);
    pub const SLATE_DIM: Color = Color::Rgb(75, 80, 95);
    pub const BLUE: Color = Color::Rgb(90, 150, 225);
    pub const GREEN: Color = Color::Rgb(95, 200, 130);
    pub const RED: Color = Color::Rgb(225, 85, 85);
    pub const YELLOW: Color = Color::Rgb(225, 200, 70);

    // ── Semantic styles ──────────────────────────────────────────

    /// Title / header bar.
    pub fn header() -> Style {
        Style::default()
            .fg(Theme::AMBER)
            .add_modifier(Modifier::BOLD)
    }

    /// Block border (normal).
    pub fn border() -> Style {
        Style::default().fg(Theme::SLATE_DIM)
    }

    /// Block border (focused input while streaming is off).
    pub fn border_focus() -> Style {
        Style::default().fg(Theme::AMBER)
    }

    /// Normal body text.
    pub fn text() -> Style {
        Style::default().fg(Theme::SLATE_WHITE)
    }

    /// Dimmed / secondary text.
    pub fn text_dim() -> Style {
        Style::default().fg(Theme::SLATE_GRAY)
    }

    /// The user's side of the transcript.
    pub fn user() -> Style {
        Style::default()
            .fg(Theme::BLUE)
            .add_modifier(Modifier::BOLD)
    }

    /// The assistant's side of the transcript.
    pub fn assistant() -> Style {
        Style::default()
            .fg(Theme::AMBER)
            .add_modifier(Modifier::BOLD)
    }

    /// Message metadata (role + timestamp).
    pub fn meta() -> Style {
        Style::default().fg(Theme::SLATE_DIM)
    }

    /// Success indicator.
    pub fn success() -> Style {
        Style::default().fg(Theme::GREEN)
    }

    /// Warning indicator.
    pub fn warning() -> Style {
        Style::default().fg(Theme::YELLOW)
    }

    /// Error / critical indicator.
    pub fn error() -> Style {
        Style::default().fg(Theme::RED)
    }

    /// Transient notice (toast analog).
    pub fn notice() -> Style {
        Style::default()
            .fg(Theme::YELLOW)
            .add_modifier(Modifier::BOLD)
    }

    /// Key hint in the footer.
    pub fn key_hint() -> Style {
        Style::default().fg(Theme::AMBER)
    }

    /// Description next to key hint.
    pub fn key_desc() -> Style {
        Style::default().fg(Theme::SLATE_GRAY)
    }

    /// Connectivity badge: green when the backend answered the last probe,
    /// red when it didn't, dim before the first probe lands.
    pub fn badge(reachable: Option<bool>) -> Style {
        match reachable {
            Some(true) => Self::success(),
            Some(false) => Self::error(),
            None => Self::text_dim(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_states() {
        assert_eq!(Theme::badge(Some(true)).fg, Some(Theme::GREEN));
        assert_eq!(Theme::badge(Some(false)).fg, Some(Theme::RED));
        assert_eq!(Theme::badge(None).fg, Some(Theme::SLATE_GRAY));
    }

    #[test]
    fn test_header_is_amber_bold() {
        let s = Theme::header();
        assert_eq!(s.fg, Some(Theme::AMBER));
        assert!(s.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_roles_are_distinct() {
        assert_ne!(Theme::user().fg, Theme::assistant().fg);
    }
}
