// src/tui/mod.rs — Interactive chat screen, built with ratatui.
//
// Launch via `ragline chat`.

pub mod app;
pub mod theme;

pub use app::run_chat;
