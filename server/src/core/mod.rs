//! Core application infrastructure

pub mod banner;
pub mod cli;
pub mod config;
pub mod constants;
pub mod secret;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands, SqlCommands};
pub use config::{AppConfig, ChartConfig, IamConfig, QueryConfig, ServerConfig};
pub use secret::AppSecret;
pub use shutdown::ShutdownService;
