//! Configuration with validation, defaults, and TOML file loading.

use crate::game::curve::MultiplierCurve;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub game: GameConfig,
    pub server: ServerConfig,
}

/// Round engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Multiplier tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Betting countdown window in seconds.
    pub betting_window_secs: u64,
    /// Crash points are drawn uniformly in `[min_crash, max_crash)`.
    pub min_crash: f64,
    pub max_crash: f64,
    pub curve: MultiplierCurve,
    /// Balance seeded for auto-registered users.
    pub starting_balance: f64,
    /// Create unknown users on their first bet instead of rejecting.
    pub auto_register: bool,
    /// Disconnecting forfeits the cashout window for an active bet.
    pub forfeit_on_disconnect: bool,
    /// Engine command queue depth.
    pub command_buffer: usize,
    /// Broadcast feed ring-buffer depth.
    pub feed_buffer: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            betting_window_secs: 7,
            min_crash: 1.0,
            max_crash: 11.0,
            curve: MultiplierCurve::default(),
            starting_balance: 1000.0,
            auto_register: true,
            forfeit_on_disconnect: false,
            command_buffer: 256,
            feed_buffer: 1024,
        }
    }
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn betting_window(&self) -> Duration {
        Duration::from_secs(self.betting_window_secs)
    }
}

/// Socket bridge binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// CORS origins; `*` allows all.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 4000,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

impl CrashConfig {
    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("{}: {}", path.display(), e)))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Profile with short rounds, used by tests that drive full cycles.
    pub fn quick_rounds() -> Self {
        Self {
            game: GameConfig {
                betting_window_secs: 1,
                max_crash: 2.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let game = &self.game;
        if game.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        if game.betting_window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "betting_window_secs must be > 0".to_string(),
            ));
        }
        if game.min_crash < 1.0 {
            return Err(ConfigError::InvalidValue(
                "min_crash must be >= 1.0".to_string(),
            ));
        }
        if game.max_crash <= game.min_crash {
            return Err(ConfigError::InvalidValue(
                "max_crash must be > min_crash".to_string(),
            ));
        }
        if game.curve.base_rate <= 0.0 || game.curve.rate_growth < 0.0 {
            return Err(ConfigError::InvalidValue(
                "curve rates must be positive".to_string(),
            ));
        }
        if game.curve.rate_cap < game.curve.base_rate {
            return Err(ConfigError::InvalidValue(
                "rate_cap must be >= base_rate".to_string(),
            ));
        }
        if game.starting_balance < 0.0 {
            return Err(ConfigError::InvalidValue(
                "starting_balance must be >= 0".to_string(),
            ));
        }
        if game.command_buffer == 0 || game.feed_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "channel buffers must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
