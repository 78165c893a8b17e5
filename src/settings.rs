//! Match configuration
//!
//! Static data consumed by the simulation: arena geometry, tower stats,
//! elixir rates, match clock and AI tuning. Loaded from JSON; every field
//! falls back to the defaults in [`crate::consts`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;

/// Arena geometry on the (x, z) plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub half_width: f32,
    pub half_length: f32,
    pub river_z: f32,
    pub river_width: f32,
    pub bridge_x: Vec<f32>,
    pub bridge_width: f32,
    pub deploy_tolerance: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            half_width: ARENA_HALF_WIDTH,
            half_length: ARENA_HALF_LENGTH,
            river_z: RIVER_Z,
            river_width: RIVER_WIDTH,
            bridge_x: BRIDGE_X.to_vec(),
            bridge_width: BRIDGE_WIDTH,
            deploy_tolerance: DEPLOY_TOLERANCE,
        }
    }
}

/// Base stats for one tower tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TowerTemplate {
    pub health: f32,
    pub damage: f32,
    /// Attacks per second
    pub attack_speed: f32,
    pub range: f32,
    pub hitbox_radius: f32,
    /// Distance from the back wall of the owner's half
    pub depth: f32,
}

/// Main (king) and side (princess) tower templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TowerConfig {
    pub main: TowerTemplate,
    pub side: TowerTemplate,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            main: TowerTemplate {
                health: 4000.0,
                damage: 90.0,
                attack_speed: 1.0,
                range: 7.0,
                hitbox_radius: 2.0,
                depth: 3.0,
            },
            side: TowerTemplate {
                health: 2500.0,
                damage: 90.0,
                attack_speed: 1.25,
                range: 7.5,
                hitbox_radius: 1.5,
                depth: 6.0,
            },
        }
    }
}

/// Elixir economy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElixirConfig {
    pub start: f32,
    pub max: f32,
    pub per_second: f32,
    pub double_multiplier: f32,
}

impl Default for ElixirConfig {
    fn default() -> Self {
        Self {
            start: STARTING_ELIXIR,
            max: MAX_ELIXIR,
            per_second: ELIXIR_PER_SECOND,
            double_multiplier: DOUBLE_ELIXIR_MULTIPLIER,
        }
    }
}

/// Unit AI tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Seconds between throttled target searches
    pub retarget_interval: f32,
    /// Search again right after a kill instead of waiting for the interval
    pub retarget_on_kill: bool,
    pub search_slack: f32,
    pub splash_edge_factor: f32,
    pub spawn_spread: f32,
    pub turn_rate: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            retarget_interval: RETARGET_INTERVAL_SECS,
            retarget_on_kill: true,
            search_slack: TARGET_SEARCH_SLACK,
            splash_edge_factor: SPLASH_EDGE_FACTOR,
            spawn_spread: SPAWN_SPREAD,
            turn_rate: TURN_RATE,
        }
    }
}

/// Complete match configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tick_rate: u32,
    pub countdown_secs: u32,
    pub match_duration: f32,
    /// Double elixir runs for this long before normal time ends
    pub double_elixir_window: f32,
    pub sudden_death_duration: f32,
    /// Delay between game over and room teardown
    pub finished_grace: f32,
    /// Empty rooms are torn down after this long
    pub idle_timeout: f32,
    pub elixir: ElixirConfig,
    pub arena: ArenaConfig,
    pub towers: TowerConfig,
    pub ai: AiConfig,
    /// Card ids both players start with unless a room overrides them
    pub default_deck: Vec<String>,
    pub shuffle_decks: bool,
    /// Seed for the per-engine RNG
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            countdown_secs: COUNTDOWN_SECS,
            match_duration: MATCH_DURATION_SECS,
            double_elixir_window: DOUBLE_ELIXIR_WINDOW_SECS,
            sudden_death_duration: SUDDEN_DEATH_SECS,
            finished_grace: FINISHED_GRACE_SECS,
            idle_timeout: EMPTY_ROOM_TIMEOUT_SECS,
            elixir: ElixirConfig::default(),
            arena: ArenaConfig::default(),
            towers: TowerConfig::default(),
            ai: AiConfig::default(),
            default_deck: [
                "knight",
                "archers",
                "giant",
                "musketeer",
                "minions",
                "baby_dragon",
                "fireball",
                "zap",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            shuffle_decks: false,
            seed: 0x5EED,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                let settings: Self = serde_json::from_str(&json)?;
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            None => {
                log::info!("Using default settings");
                Self::default()
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::invalid("tick_rate", "must be positive"));
        }
        if self.match_duration <= 0.0 {
            return Err(ConfigError::invalid("match_duration", "must be positive"));
        }
        if self.double_elixir_window < 0.0 || self.double_elixir_window > self.match_duration {
            return Err(ConfigError::invalid(
                "double_elixir_window",
                "must lie within the match duration",
            ));
        }
        if self.sudden_death_duration < 0.0 {
            return Err(ConfigError::invalid(
                "sudden_death_duration",
                "must not be negative",
            ));
        }
        if self.elixir.max <= 0.0 || !(0.0..=self.elixir.max).contains(&self.elixir.start) {
            return Err(ConfigError::invalid(
                "elixir",
                "start must lie in [0, max] and max must be positive",
            ));
        }
        if self.elixir.per_second < 0.0 || self.elixir.double_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "elixir",
                "regen must be non-negative and the double multiplier at least 1",
            ));
        }
        let arena = &self.arena;
        if arena.half_width <= 0.0 || arena.half_length <= 0.0 {
            return Err(ConfigError::invalid("arena", "extents must be positive"));
        }
        if arena.bridge_x.is_empty() {
            return Err(ConfigError::invalid(
                "arena.bridge_x",
                "need at least one bridge",
            ));
        }
        if arena.river_width <= 0.0 || arena.river_width / 2.0 >= arena.half_length {
            return Err(ConfigError::invalid(
                "arena.river_width",
                "river must fit inside the arena",
            ));
        }
        for (name, tower) in [
            ("towers.main", &self.towers.main),
            ("towers.side", &self.towers.side),
        ] {
            if tower.health <= 0.0 || tower.attack_speed <= 0.0 || tower.range <= 0.0 {
                return Err(ConfigError::invalid(
                    name,
                    "health, attack speed and range must be positive",
                ));
            }
            if tower.depth <= 0.0 || tower.depth >= arena.half_length {
                return Err(ConfigError::invalid(name, "tower must sit inside its half"));
            }
        }
        if self.ai.retarget_interval < 0.0 {
            return Err(ConfigError::invalid(
                "ai.retarget_interval",
                "must not be negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.ai.splash_edge_factor) {
            return Err(ConfigError::invalid(
                "ai.splash_edge_factor",
                "must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Fixed simulation timestep in seconds
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Convert a duration in seconds to a whole number of ticks
    #[inline]
    pub fn secs_to_ticks(&self, secs: f32) -> u64 {
        (secs * self.tick_rate as f32).round().max(0.0) as u64
    }
}
