//! Configuration for a cratestack session.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Every section is `#[serde(default)]`, so older files keep loading
//! when new settings are added.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, NetworkConfig, PhysicsConfig, SceneConfig, SessionConfig,
};
pub use error::ConfigError;
