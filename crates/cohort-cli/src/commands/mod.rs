//! CLI command implementations.

pub mod config;
pub mod state;
pub mod transition;
pub mod version;
