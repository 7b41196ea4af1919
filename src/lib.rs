// src/lib.rs — Library root for ragline

pub mod backend;
pub mod cli;
pub mod infra;
pub mod session;
pub mod tui;
