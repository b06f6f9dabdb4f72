//! Client-side plumbing shared by the Lastbite crates: where state lives on
//! disk, how configuration is loaded, and how logging is set up.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging_for_service;
pub use paths::Paths;
