//! Arena geometry: bounds, river band, bridges and lane-constrained movement
//!
//! The arena is the (x, z) plane. Player one owns the half below the river
//! (z < river), player two the half above it. Ground units may only cross
//! the river band on a bridge.

use glam::Vec2;

use super::state::Side;
use crate::move_towards;
use crate::settings::ArenaConfig;

/// Which part of the arena a z coordinate falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Bank(Side),
    River,
}

/// Arena geometry derived from configuration
#[derive(Debug, Clone)]
pub struct Arena {
    config: ArenaConfig,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    #[inline]
    fn river_half(&self) -> f32 {
        self.config.river_width / 2.0
    }

    pub fn zone(&self, z: f32) -> Zone {
        let river = self.config.river_z;
        if z < river - self.river_half() {
            Zone::Bank(Side::One)
        } else if z > river + self.river_half() {
            Zone::Bank(Side::Two)
        } else {
            Zone::River
        }
    }

    pub fn in_bounds(&self, pos: Vec2) -> bool {
        pos.x.abs() <= self.config.half_width && pos.y.abs() <= self.config.half_length
    }

    pub fn clamp(&self, pos: Vec2) -> Vec2 {
        let c = &self.config;
        Vec2::new(
            pos.x.clamp(-c.half_width, c.half_width),
            pos.y.clamp(-c.half_length, c.half_length),
        )
    }

    /// Centre line of the bridge nearest to `x`
    pub fn nearest_bridge_x(&self, x: f32) -> f32 {
        let mut best = self.config.bridge_x[0];
        for &bx in &self.config.bridge_x[1..] {
            if (bx - x).abs() < (best - x).abs() {
                best = bx;
            }
        }
        best
    }

    /// Whether `x` lies within a bridge's width
    pub fn on_bridge(&self, x: f32) -> bool {
        let half = self.config.bridge_width / 2.0;
        self.config
            .bridge_x
            .iter()
            .any(|&bx| (x - bx).abs() <= half + f32::EPSILON)
    }

    /// A deploy is legal inside the arena on the player's own bank, with a
    /// small tolerance past the river edge
    pub fn is_valid_deploy(&self, side: Side, pos: Vec2) -> bool {
        if !pos.is_finite() || !self.in_bounds(pos) {
            return false;
        }
        let edge = self.river_half() - self.config.deploy_tolerance;
        match side {
            Side::One => pos.y <= self.config.river_z - edge,
            Side::Two => pos.y >= self.config.river_z + edge,
        }
    }

    /// Keep a spawn point inside the arena and out of the river band
    pub fn clamp_to_bank(&self, side: Side, pos: Vec2) -> Vec2 {
        let pos = self.clamp(pos);
        let edge = self.config.river_half_edge(side);
        let z = match side {
            Side::One => pos.y.min(edge),
            Side::Two => pos.y.max(edge),
        };
        Vec2::new(pos.x, z)
    }

    /// Span of the bridge nearest to `x`
    fn bridge_span(&self, x: f32) -> (f32, f32) {
        let bx = self.nearest_bridge_x(x);
        let half = self.config.bridge_width / 2.0;
        (bx - half, bx + half)
    }

    /// One movement step for a ground unit.
    ///
    /// Moves in a straight line while it stays on one bank. Otherwise a unit
    /// off the bridges first walks sideways to the nearest bridge, and a unit
    /// on a bridge keeps within its width for as long as it is over the
    /// river band.
    pub fn step_ground(&self, from: Vec2, goal: Vec2, step: f32) -> Vec2 {
        let from_zone = self.zone(from.y);
        let goal_zone = self.zone(goal.y);
        if from_zone == goal_zone && from_zone != Zone::River {
            return self.clamp(move_towards(from, goal, step));
        }
        if from_zone != Zone::River && !self.on_bridge(from.x) {
            let bx = self.nearest_bridge_x(from.x);
            let x = move_towards(Vec2::new(from.x, 0.0), Vec2::new(bx, 0.0), step).x;
            return Vec2::new(x, from.y);
        }

        let (lo, hi) = self.bridge_span(from.x);
        let next = match goal_zone {
            // Goal over the water: get as close as the bridge allows
            Zone::River => move_towards(from, Vec2::new(goal.x.clamp(lo, hi), goal.y), step),
            Zone::Bank(_) => {
                let dz = goal.y - from.y;
                Vec2::new(from.x, from.y + dz.signum() * step.min(dz.abs()))
            }
        };
        let next = self.clamp(next);
        if self.zone(next.y) == Zone::River {
            Vec2::new(next.x.clamp(lo, hi), next.y)
        } else {
            next
        }
    }
}

impl ArenaConfig {
    /// Last z coordinate on a side's bank before the river band
    fn river_half_edge(&self, side: Side) -> f32 {
        let half = self.river_width / 2.0 + 0.01;
        match side {
            Side::One => self.river_z - half,
            Side::Two => self.river_z + half,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arena() -> Arena {
        Arena::new(ArenaConfig::default())
    }

    #[test]
    fn zones() {
        let arena = arena();
        assert_eq!(arena.zone(-5.0), Zone::Bank(Side::One));
        assert_eq!(arena.zone(0.5), Zone::River);
        assert_eq!(arena.zone(5.0), Zone::Bank(Side::Two));
    }

    #[test]
    fn deploy_sides() {
        let arena = arena();
        assert!(arena.is_valid_deploy(Side::One, Vec2::new(0.0, -8.0)));
        assert!(!arena.is_valid_deploy(Side::One, Vec2::new(0.0, 8.0)));
        assert!(arena.is_valid_deploy(Side::Two, Vec2::new(0.0, 8.0)));
        assert!(!arena.is_valid_deploy(Side::Two, Vec2::new(0.0, -8.0)));
        // Tolerance band just past the river edge
        assert!(arena.is_valid_deploy(Side::One, Vec2::new(0.0, -0.6)));
        assert!(!arena.is_valid_deploy(Side::One, Vec2::new(0.0, -0.4)));
        // Out of bounds
        assert!(!arena.is_valid_deploy(Side::One, Vec2::new(20.0, -8.0)));
        assert!(!arena.is_valid_deploy(Side::One, Vec2::new(f32::NAN, -8.0)));
    }

    #[test]
    fn off_bridge_unit_walks_sideways_first() {
        let arena = arena();
        let from = Vec2::new(0.0, -2.0);
        let goal = Vec2::new(0.0, 10.0);
        let next = arena.step_ground(from, goal, 0.5);
        assert_eq!(next.y, from.y);
        assert!(next.x < 0.0 || next.x > 0.0);
        assert!((next.x.abs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn aligned_unit_crosses_straight() {
        let arena = arena();
        let from = Vec2::new(5.5, -2.0);
        let goal = Vec2::new(0.0, 10.0);
        let next = arena.step_ground(from, goal, 0.5);
        assert_eq!(next.x, 5.5);
        assert!((next.y - -1.5).abs() < 1e-6);
    }

    #[test]
    fn river_goal_off_the_bridge_keeps_unit_on_the_bridge() {
        let arena = arena();
        // On the left bridge, chasing something hovering over open water
        let mut pos = Vec2::new(-5.5, 0.0);
        let goal = Vec2::new(3.5, 0.5);
        for _ in 0..40 {
            pos = arena.step_ground(pos, goal, 0.2);
            assert!(arena.on_bridge(pos.x), "stepped off the bridge to {pos:?}");
        }
        assert!((pos.x - -4.5).abs() < 1e-5);
        assert!((pos.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn unit_in_the_river_leaves_along_the_bridge() {
        let arena = arena();
        let from = Vec2::new(5.0, 0.5);
        let next = arena.step_ground(from, Vec2::new(0.0, 10.0), 0.5);
        assert_eq!(next.x, 5.0);
        assert!((next.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn same_bank_moves_straight() {
        let arena = arena();
        let from = Vec2::new(0.0, -10.0);
        let goal = Vec2::new(3.0, -6.0);
        let next = arena.step_ground(from, goal, 5.0);
        assert_eq!(next, goal);
    }

    #[test]
    fn nearest_bridge_picks_closest_lane() {
        let arena = arena();
        assert_eq!(arena.nearest_bridge_x(-1.0), -5.5);
        assert_eq!(arena.nearest_bridge_x(2.0), 5.5);
    }

    #[test]
    fn clamp_to_bank_pulls_out_of_river() {
        let arena = arena();
        let pos = arena.clamp_to_bank(Side::One, Vec2::new(0.0, -0.6));
        assert_eq!(arena.zone(pos.y), Zone::Bank(Side::One));
    }

    proptest! {
        #[test]
        fn ground_steps_never_leave_the_bridges_over_water(
            x in -9.0f32..9.0,
            depth in 1.5f32..16.0,
            two in any::<bool>(),
            goal_x in -9.0f32..9.0,
            goal_z in -16.0f32..16.0,
            step in 0.05f32..0.5,
        ) {
            let arena = arena();
            let mut pos = Vec2::new(x, if two { depth } else { -depth });
            let goal = Vec2::new(goal_x, goal_z);
            for _ in 0..200 {
                pos = arena.step_ground(pos, goal, step);
                prop_assert!(arena.in_bounds(pos));
                prop_assert!(
                    arena.zone(pos.y) != Zone::River || arena.on_bridge(pos.x),
                    "in the water at {:?}", pos
                );
            }
        }
    }
}
