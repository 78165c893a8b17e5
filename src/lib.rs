//! Tower Duel - authoritative simulation for a 1v1 lane-pushing tower battle
//!
//! Core modules:
//! - `sim`: Deterministic match simulation (units, towers, elixir, win checks)
//! - `room`: Match phase machine for one two-player room
//! - `server`: Async lobby running one tick loop per room
//! - `settings`: Data-driven match configuration

pub mod error;
pub mod room;
pub mod server;
pub mod settings;
pub mod sim;

pub use error::{ConfigError, DeployError, RoomError};
pub use settings::Settings;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Simulation ticks per second
    pub const TICK_RATE: u32 = 20;

    /// Arena extents on the (x, z) plane, centred on the origin
    pub const ARENA_HALF_WIDTH: f32 = 9.0;
    pub const ARENA_HALF_LENGTH: f32 = 16.0;
    /// River centre line and total width
    pub const RIVER_Z: f32 = 0.0;
    pub const RIVER_WIDTH: f32 = 2.0;
    /// Bridge centre lines and width
    pub const BRIDGE_X: [f32; 2] = [-5.5, 5.5];
    pub const BRIDGE_WIDTH: f32 = 2.0;
    /// How far past the river edge a deploy may land
    pub const DEPLOY_TOLERANCE: f32 = 0.5;

    /// Elixir economy
    pub const STARTING_ELIXIR: f32 = 5.0;
    pub const MAX_ELIXIR: f32 = 10.0;
    /// One elixir every 2.8 seconds
    pub const ELIXIR_PER_SECOND: f32 = 1.0 / 2.8;
    pub const DOUBLE_ELIXIR_MULTIPLIER: f32 = 2.0;

    /// Match clock (seconds)
    pub const COUNTDOWN_SECS: u32 = 3;
    pub const MATCH_DURATION_SECS: f32 = 180.0;
    /// Double elixir starts this long before normal time runs out
    pub const DOUBLE_ELIXIR_WINDOW_SECS: f32 = 60.0;
    pub const SUDDEN_DEATH_SECS: f32 = 60.0;
    pub const FINISHED_GRACE_SECS: f32 = 5.0;
    pub const EMPTY_ROOM_TIMEOUT_SECS: f32 = 30.0;

    /// Deck and hand sizes
    pub const DECK_SIZE: usize = 8;
    pub const HAND_SIZE: usize = 4;

    /// Unit AI tuning
    pub const RETARGET_INTERVAL_SECS: f32 = 0.5;
    /// Extra distance past attack range inside which an enemy unit always wins over a building
    pub const TARGET_SEARCH_SLACK: f32 = 2.0;
    /// Splash damage multiplier at the very edge of the splash radius
    pub const SPLASH_EDGE_FACTOR: f32 = 0.5;
    /// Distance between units spawned by the same card
    pub const SPAWN_SPREAD: f32 = 0.6;
    /// How quickly a unit turns toward its heading (fraction per tick)
    pub const TURN_RATE: f32 = 0.35;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Euclidean distance on the arena plane
#[inline]
pub fn distance(a: Vec2, b: Vec2) -> f32 {
    a.distance(b)
}

/// Linear interpolation between `a` and `b`
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolate between two angles along the shortest arc
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    let delta = normalize_angle(to - from);
    normalize_angle(from + delta * t)
}

/// Step `from` toward `to` by at most `max_step` without overshooting
pub fn move_towards(from: Vec2, to: Vec2, max_step: f32) -> Vec2 {
    let delta = to - from;
    let len = delta.length();
    if len <= max_step || len <= f32::EPSILON {
        to
    } else {
        from + delta / len * max_step
    }
}

/// Facing angle for a heading on the (x, z) plane (0 = +z)
#[inline]
pub fn heading_angle(dir: Vec2) -> f32 {
    dir.x.atan2(dir.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn normalize_wraps_into_range() {
        assert!((normalize_angle(2.5 * PI) - PI / 2.0).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        // Odd multiples of π land on the seam; either end of the range is fine
        let seam = normalize_angle(3.0 * PI);
        assert!((-PI..PI).contains(&seam));
        assert!(seam.abs() > PI - 1e-5);
    }

    #[test]
    fn lerp_angle_takes_short_arc() {
        // From just under +π to just over -π should cross the seam, not sweep through 0
        let mid = lerp_angle(PI - 0.1, -PI + 0.1, 0.5);
        assert!(mid.abs() > PI - 0.01);
    }

    #[test]
    fn move_towards_does_not_overshoot() {
        let from = Vec2::new(0.0, 0.0);
        let to = Vec2::new(1.0, 0.0);
        assert_eq!(move_towards(from, to, 5.0), to);
        assert_eq!(move_towards(from, to, 0.25), Vec2::new(0.25, 0.0));
    }

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(2.0, 4.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 4.0, 1.0), 4.0);
        assert_eq!(lerp(2.0, 4.0, 0.5), 3.0);
    }
}
