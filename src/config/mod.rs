//! Configuration Module
//!
//! Handles configuration loading, validation, and file watching.

pub mod manager;
pub mod types;
pub mod watcher;

pub use manager::ConfigManager;
pub use types::*;
pub use watcher::ConfigWatcher;
