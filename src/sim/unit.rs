//! Unit entity: a combat actor spawned from a card

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::cards::{BuffDef, BuffKind, UnitStats};
use super::state::{Side, TargetRef, UnitId};
use super::targeting::{Candidate, Seeker};

/// Finite-state status of a unit. `Dead` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitStatus {
    #[default]
    Idle,
    Move,
    Attack,
    Cooldown,
    Dead,
}

/// An active stat modifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buff {
    pub kind: BuffKind,
    pub magnitude: f32,
    /// Tick at which the buff stops applying
    pub expires_at: u64,
}

/// A combat actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub owner: Side,
    pub card_id: String,
    pub stats: UnitStats,
    pub health: f32,
    /// Position on the (x, z) plane
    pub position: Vec2,
    /// Facing angle (0 = +z)
    pub rotation: f32,
    pub target: Option<TargetRef>,
    /// Where to walk when there is nothing to attack
    pub destination: Option<Vec2>,
    /// Seconds until the next swing may start
    pub attack_cooldown: f32,
    pub status: UnitStatus,
    /// Tick the current status was entered
    pub status_since: u64,
    pub buffs: BTreeMap<String, Buff>,
    pub stunned: bool,
    pub stun_until: u64,
    pub spawn_tick: u64,
    pub last_attack_tick: Option<u64>,
    pub death_tick: Option<u64>,
}

impl Unit {
    pub fn new(
        id: UnitId,
        owner: Side,
        card_id: impl Into<String>,
        stats: UnitStats,
        position: Vec2,
        tick: u64,
    ) -> Self {
        let rotation = if owner == Side::One {
            0.0
        } else {
            std::f32::consts::PI
        };
        Self {
            id,
            owner,
            card_id: card_id.into(),
            health: stats.max_health,
            stats,
            position,
            rotation: crate::normalize_angle(rotation),
            target: None,
            destination: None,
            attack_cooldown: 0.0,
            status: UnitStatus::Idle,
            status_since: tick,
            buffs: BTreeMap::new(),
            stunned: false,
            stun_until: 0,
            spawn_tick: tick,
            last_attack_tick: None,
            death_tick: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status != UnitStatus::Dead
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.status == UnitStatus::Dead
    }

    /// Change status. Returns false if nothing changed; a dead unit never changes.
    pub fn set_status(&mut self, status: UnitStatus, tick: u64) -> bool {
        if self.is_dead() || self.status == status {
            return false;
        }
        self.status = status;
        self.status_since = tick;
        if status == UnitStatus::Dead {
            self.death_tick = Some(tick);
        }
        true
    }

    /// Apply damage, clamping health at zero. Returns true if this hit killed the unit.
    pub fn apply_damage(&mut self, amount: f32, tick: u64) -> bool {
        if self.is_dead() {
            return false;
        }
        debug_assert!(amount >= 0.0, "negative damage {amount}");
        let amount = amount.max(0.0);
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.health = 0.0;
            self.target = None;
            self.set_status(UnitStatus::Dead, tick);
            return true;
        }
        false
    }

    /// Add or refresh a buff
    pub fn add_buff(&mut self, def: &BuffDef, tick: u64, tick_rate: u32) {
        if self.is_dead() {
            return;
        }
        let ticks = (def.duration * tick_rate as f32).round() as u64;
        self.buffs.insert(
            def.id.clone(),
            Buff {
                kind: def.kind,
                magnitude: def.magnitude,
                expires_at: tick + ticks,
            },
        );
    }

    /// Drop buffs that have run out
    pub fn expire_buffs(&mut self, tick: u64) {
        self.buffs.retain(|_, b| b.expires_at > tick);
    }

    /// Stun until `until`. A longer existing stun is kept.
    pub fn stun(&mut self, until: u64) {
        if self.is_dead() {
            return;
        }
        self.stunned = true;
        self.stun_until = self.stun_until.max(until);
    }

    /// Update the stun flag for this tick and report whether it still holds
    pub fn update_stun(&mut self, tick: u64) -> bool {
        if self.stunned && tick >= self.stun_until {
            self.stunned = false;
        }
        self.stunned
    }

    fn multiplier(&self, kind: BuffKind) -> f32 {
        self.buffs
            .values()
            .filter(|b| b.kind == kind)
            .map(|b| b.magnitude)
            .product()
    }

    pub fn effective_damage(&self) -> f32 {
        self.stats.damage * self.multiplier(BuffKind::Damage)
    }

    pub fn effective_move_speed(&self) -> f32 {
        self.stats.move_speed * self.multiplier(BuffKind::MoveSpeed)
    }

    /// Seconds between swings
    pub fn attack_interval(&self) -> f32 {
        1.0 / (self.stats.attack_speed * self.multiplier(BuffKind::AttackSpeed))
    }

    pub fn dps(&self) -> f32 {
        self.effective_damage() / self.attack_interval()
    }

    /// Targeting view of this unit as the searcher
    pub fn seeker(&self) -> Seeker {
        Seeker {
            unit: Some(self.id),
            owner: self.owner,
            position: self.position,
            range: self.stats.attack_range,
            hitbox_radius: self.stats.hitbox_radius,
            hits_air: self.stats.hits_air,
            hits_ground: self.stats.hits_ground,
            health: self.health,
            max_health: self.stats.max_health,
        }
    }

    /// Targeting view of this unit as a potential victim
    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            target: TargetRef::Unit(self.id),
            owner: self.owner,
            position: self.position,
            hitbox_radius: self.stats.hitbox_radius,
            health: self.health,
            max_health: self.stats.max_health,
            flying: self.stats.flying,
            category: self.stats.category,
            dps: self.dps(),
            range: self.stats.attack_range,
        }
    }

    /// Gap between this unit's hitbox and a target's hitbox
    pub fn edge_distance(&self, target: &Candidate) -> f32 {
        (self.position.distance(target.position) - self.stats.hitbox_radius - target.hitbox_radius)
            .max(0.0)
    }

    pub fn in_range_of(&self, target: &Candidate) -> bool {
        self.edge_distance(target) <= self.stats.attack_range
    }
}
