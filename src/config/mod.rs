//! Configuration management
//!
//! Node settings layered from defaults, an optional TOML file, environment
//! variables and finally command-line flags.

pub mod settings;

pub use settings::{Config, MAX_DIFFICULTY};
