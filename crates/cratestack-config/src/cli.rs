//! Command-line overrides shared by every cratestack binary.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Common cratestack command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "cratestack", about = "Deterministic shared-physics session")]
pub struct CliArgs {
    /// Session seed (must match on every peer).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fixed physics timestep in seconds.
    #[arg(long)]
    pub timestep: Option<f32>,

    /// Ticks between owner state relays (0 disables relay).
    #[arg(long)]
    pub sync_interval: Option<u32>,

    /// Log filter (error, warn, info, debug, trace, or a full RUST_LOG string).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// Config directory to use: `--config` if given, otherwise the platform default.
    pub fn config_dir(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_dir)
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.session.seed = seed;
        }
        if let Some(dt) = args.timestep {
            self.session.fixed_timestep_s = dt;
        }
        if let Some(interval) = args.sync_interval {
            self.session.state_sync_interval = interval;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from(["cratestack", "--seed", "42", "--log-level", "debug"]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.session.seed, 42);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.session.fixed_timestep_s, 0.01);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_config_dir_prefers_flag() {
        let args = CliArgs::parse_from(["cratestack", "--config", "/tmp/cs"]);
        assert_eq!(args.config_dir(), PathBuf::from("/tmp/cs"));
    }
}
