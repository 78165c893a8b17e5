//! Defensive towers: one main and two side towers per player

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::cards::UnitCategory;
use super::state::{Side, TargetRef, UnitId};
use super::targeting::Candidate;
use crate::settings::{ArenaConfig, TowerConfig, TowerTemplate};

/// Tower position within a side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerSlot {
    Left,
    Right,
    Main,
}

impl TowerSlot {
    /// Precedence order used for building searches: sides before main
    pub const ALL: [TowerSlot; 3] = [TowerSlot::Left, TowerSlot::Right, TowerSlot::Main];

    pub const fn as_str(self) -> &'static str {
        match self {
            TowerSlot::Left => "left",
            TowerSlot::Right => "right",
            TowerSlot::Main => "main",
        }
    }
}

/// A static defensive structure. Health only ever decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tower {
    pub id: String,
    pub owner: Side,
    pub slot: TowerSlot,
    pub max_health: f32,
    pub health: f32,
    pub damage: f32,
    pub attack_speed: f32,
    pub range: f32,
    pub hitbox_radius: f32,
    pub position: Vec2,
    /// Seconds until the next shot
    pub cooldown: f32,
    /// Main towers stay dormant until damaged or a side tower falls
    pub active: bool,
    pub last_attack_tick: Option<u64>,
    pub last_target: Option<UnitId>,
}

impl Tower {
    pub fn new(owner: Side, slot: TowerSlot, template: &TowerTemplate, position: Vec2) -> Self {
        Self {
            id: format!("player{}_{}", owner.number(), slot.as_str()),
            owner,
            slot,
            max_health: template.health,
            health: template.health,
            damage: template.damage,
            attack_speed: template.attack_speed,
            range: template.range,
            hitbox_radius: template.hitbox_radius,
            position,
            cooldown: 0.0,
            active: slot != TowerSlot::Main,
            last_attack_tick: None,
            last_target: None,
        }
    }

    /// Build all six towers, mirrored across the river
    pub fn standard_set(towers: &TowerConfig, arena: &ArenaConfig) -> Vec<Tower> {
        let mut set = Vec::with_capacity(6);
        let left_x = arena.bridge_x.iter().copied().fold(f32::INFINITY, f32::min);
        let right_x = arena
            .bridge_x
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        for side in Side::BOTH {
            // Back wall of this side's half
            let back = arena.river_z - side.forward() * arena.half_length;
            let at = |x: f32, depth: f32| Vec2::new(x, back + side.forward() * depth);
            for (slot, template, x) in [
                (TowerSlot::Left, &towers.side, left_x),
                (TowerSlot::Right, &towers.side, right_x),
                (TowerSlot::Main, &towers.main, 0.0),
            ] {
                set.push(Tower::new(side, slot, template, at(x, template.depth)));
            }
        }
        set
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn activate(&mut self) {
        if !self.active && self.is_alive() {
            log::debug!("{} activated", self.id);
            self.active = true;
        }
    }

    /// Apply damage, clamping at zero. Returns true if this hit destroyed the tower.
    pub fn apply_damage(&mut self, amount: f32, tick: u64) -> bool {
        if !self.is_alive() {
            return false;
        }
        debug_assert!(amount >= 0.0, "negative damage {amount}");
        let amount = amount.max(0.0);
        if amount > 0.0 {
            self.activate();
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            log::debug!("{} destroyed at tick {tick}", self.id);
            self.health = 0.0;
            self.last_target = None;
            return true;
        }
        false
    }

    pub fn reference(&self) -> TargetRef {
        TargetRef::Tower(self.owner, self.slot)
    }

    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            target: self.reference(),
            owner: self.owner,
            position: self.position,
            hitbox_radius: self.hitbox_radius,
            health: self.health,
            max_health: self.max_health,
            flying: false,
            category: UnitCategory::Building,
            dps: self.damage * self.attack_speed,
            range: self.range,
        }
    }

    /// Whether a unit with the given position and hitbox is inside this tower's range
    pub fn covers(&self, position: Vec2, hitbox_radius: f32) -> bool {
        self.position.distance(position) - hitbox_radius - self.hitbox_radius <= self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn standard_set_is_mirrored() {
        let settings = Settings::default();
        let towers = Tower::standard_set(&settings.towers, &settings.arena);
        assert_eq!(towers.len(), 6);
        for (a, b) in towers[..3].iter().zip(&towers[3..]) {
            assert_eq!(a.slot, b.slot);
            assert_eq!(a.position.x, b.position.x);
            assert_eq!(a.position.y, -b.position.y);
        }
        assert_eq!(towers[2].id, "player1_main");
        assert_eq!(towers[2].position, Vec2::new(0.0, -13.0));
        assert_eq!(towers[0].position, Vec2::new(-5.5, -10.0));
    }

    #[test]
    fn main_tower_wakes_when_hit() {
        let settings = Settings::default();
        let mut towers = Tower::standard_set(&settings.towers, &settings.arena);
        let main = &mut towers[2];
        assert!(!main.active);
        main.apply_damage(1.0, 5);
        assert!(main.active);
    }

    #[test]
    fn destroyed_tower_stays_destroyed() {
        let settings = Settings::default();
        let mut towers = Tower::standard_set(&settings.towers, &settings.arena);
        let side = &mut towers[0];
        assert!(side.apply_damage(10_000.0, 1));
        assert_eq!(side.health, 0.0);
        assert!(!side.apply_damage(10.0, 2));
        assert!(!side.is_alive());
    }
}
