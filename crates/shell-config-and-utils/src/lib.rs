//! Core types, configuration, and utilities for the Lumen desktop shell.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, APP_ID, APP_NAME, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL, URL_SCHEME,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging_in, parse_level};
pub use paths::Paths;
