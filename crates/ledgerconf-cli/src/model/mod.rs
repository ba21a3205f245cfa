//! Data models module
//!
//! - `config` - Command line arguments and layered settings

pub mod config;

pub use config::{Cli, Command, Configuration};
