//! Terminal chat client for a remote `/api/chat` service.

pub mod api;
pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod render;
pub mod session;
pub mod ui;
