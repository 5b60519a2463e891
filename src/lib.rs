pub mod api;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod health;
pub mod media;
pub mod notifications;
pub mod relay;
pub mod security;
pub mod utils;

pub use commands::{AppState, Message};
pub use config::AppConfig;
pub use errors::{AppError, Result};
