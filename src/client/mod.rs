//! Client module - runnable console shell around the quiz engine
//!
//! This module contains:
//! - Configuration loading
//! - Logging setup
//! - WebSocket transport for the quiz server
//! - Console UI (commands and rendering)
//! - The runner loop

pub mod config;
pub mod console;
pub mod logging;
pub mod runner;
pub mod websocket;

pub use config::{Config, ConfigError};
pub use runner::QuizRunner;
pub use websocket::{TransportError, WebSocketTransport};
