//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
const CONFIG_FILE: &str = "config.ron";

/// Top-level session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Session-wide protocol settings shared by every peer.
    pub session: SessionConfig,
    /// Physics world and material constants.
    pub physics: PhysicsConfig,
    /// Scene layout: cannons, crates, goal.
    pub scene: SceneConfig,
    /// Wire limits.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Settings every peer in a session must agree on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Seed for the factory variant generator. Exchanged in the handshake.
    pub seed: u64,
    /// Fixed physics timestep in seconds.
    pub fixed_timestep_s: f32,
    /// Owners relay body state every this many ticks (0 disables relay).
    pub state_sync_interval: u32,
    /// Upper bound on fixed steps run for a single frame.
    pub max_catch_up_steps: u32,
}

/// Physics world and material constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// World width in physics units.
    pub width: f32,
    /// World height in physics units.
    pub height: f32,
    /// Vertical gravity (negative is down).
    pub gravity: f32,
    /// Crate density.
    pub crate_density: f32,
    /// Crate friction coefficient.
    pub crate_friction: f32,
    /// Crate restitution.
    pub crate_restitution: f32,
    /// Crate angular damping.
    pub crate_angular_damping: f32,
    /// Friction of walls and other static geometry.
    pub wall_friction: f32,
    /// Restitution of walls and other static geometry.
    pub wall_restitution: f32,
}

/// Scene layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Host cannon position.
    pub host_cannon: [f32; 2],
    /// Client cannon position.
    pub client_cannon: [f32; 2],
    /// Initial host cannon angle in radians.
    pub host_cannon_angle: f32,
    /// Initial client cannon angle in radians.
    pub client_cannon_angle: f32,
    /// Cannon half extents.
    pub cannon_half_extents: [f32; 2],
    /// Radians of turn per unit of input per tick.
    pub turn_rate: f32,
    /// Number of crate visual variants.
    pub crate_variants: u32,
    /// Crate half extents before the spawn size multiplier.
    pub crate_half_extents: [f32; 2],
    /// Drawing scale handed to visual proxies (pixels per physics unit).
    pub draw_scale: f32,
    /// Centre of the goal region.
    pub goal: [f32; 2],
    /// Radius of the goal region.
    pub goal_radius: f32,
    /// Launch speed of a fired crate at full power.
    pub fire_speed: f32,
}

/// Wire limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Largest serialized message accepted, in bytes.
    pub max_message_bytes: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g. "debug", "info,cratestack_multiplayer=trace").
    pub log_level: String,
    /// Directory for JSON log files in debug builds. Empty disables file logs.
    pub log_dir: String,
}

// --- Default implementations ---

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_cafe,
            fixed_timestep_s: 0.01,
            state_sync_interval: 6,
            max_catch_up_steps: 25,
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            width: 32.0,
            height: 18.0,
            gravity: -4.9,
            crate_density: 1.0,
            crate_friction: 0.2,
            crate_restitution: 0.1,
            crate_angular_damping: 1.0,
            wall_friction: 0.1,
            wall_restitution: 0.1,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            host_cannon: [2.0, 9.0],
            client_cannon: [30.0, 9.0],
            host_cannon_angle: -std::f32::consts::FRAC_PI_2,
            client_cannon_angle: std::f32::consts::FRAC_PI_2,
            cannon_half_extents: [0.5, 1.0],
            turn_rate: 0.05,
            crate_variants: 100,
            crate_half_extents: [0.5, 0.5],
            draw_scale: 32.0,
            goal: [6.0, 12.0],
            goal_radius: 1.0,
            fire_speed: 12.0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory, e.g. `~/.config/cratestack` on Linux.
    ///
    /// Falls back to the working directory when the platform has none.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("cratestack"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::Parse)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::Write)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::Write)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let contents =
            std::fs::read_to_string(config_dir.join(CONFIG_FILE)).map_err(ConfigError::Read)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::Parse)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects values that would make a session impossible to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dt = self.session.fixed_timestep_s;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::Invalid {
                field: "session.fixed_timestep_s",
                reason: format!("must be a positive number of seconds, got {dt}"),
            });
        }
        if self.session.max_catch_up_steps == 0 {
            return Err(ConfigError::Invalid {
                field: "session.max_catch_up_steps",
                reason: "must allow at least one step per frame".to_string(),
            });
        }
        if self.scene.crate_variants == 0 {
            return Err(ConfigError::Invalid {
                field: "scene.crate_variants",
                reason: "at least one crate variant is required".to_string(),
            });
        }
        if self.physics.width <= 0.0 || self.physics.height <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "physics.width",
                reason: format!(
                    "world must have a positive area, got {}x{}",
                    self.physics.width, self.physics.height
                ),
            });
        }
        Ok(())
    }
}
