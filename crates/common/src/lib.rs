//! Shared types, config, and error definitions for the menu service.

pub mod config;
pub mod error;
pub mod types;

pub use config::ServiceConfig;
pub use error::Error;
pub use types::*;
