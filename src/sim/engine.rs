//! Authoritative match engine
//!
//! One engine owns everything in one match. `update` advances exactly one
//! fixed tick in this order, which must not change:
//! 1. Elixir regeneration
//! 2. Unit AI (early win check afterwards)
//! 3. Tower attacks
//! 4. Effect decay
//! 5. Win check

use std::f32::consts::TAU;
use std::sync::Arc;

use glam::Vec2;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::ai::{AiContext, AiEvent, AiManager};
use super::arena::Arena;
use super::cards::{CardCatalog, CardDef, CardKind, SpellDef, SpellTargets, UnitStats};
use super::economy::PlayerState;
use super::snapshot::StateSnapshot;
use super::state::{Battlefield, Effect, Side, TargetRef, UnitId};
use super::targeting::{Nearest, Seeker, TargetSelector};
use super::tower::{Tower, TowerSlot};
use super::unit::Unit;
use crate::error::{ConfigError, DeployError};
use crate::settings::Settings;

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    MainTowerDestroyed,
    TowerCount,
    Tiebreak,
    OpponentLeft,
}

impl EndReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            EndReason::MainTowerDestroyed => "main_tower_destroyed",
            EndReason::TowerCount => "tower_count",
            EndReason::Tiebreak => "tiebreak",
            EndReason::OpponentLeft => "opponent_left",
        }
    }
}

/// Final result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub winner: Side,
    pub reason: EndReason,
}

/// What a successful deploy put on the field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployed {
    Units(Vec<UnitId>),
    Spell { effect: u32, hits: usize },
}

/// Simulation of one match between two players
#[derive(Debug)]
pub struct GameEngine {
    settings: Settings,
    catalog: Arc<CardCatalog>,
    arena: Arena,
    field: Battlefield,
    ai: AiManager,
    players: [PlayerState; 2],
    effects: Vec<Effect>,
    next_unit_id: UnitId,
    next_effect_id: u32,
    game_over: Option<GameOver>,
}

impl GameEngine {
    /// Engine where both players use the configured default deck
    pub fn new(settings: Settings, catalog: Arc<CardCatalog>) -> Result<Self, ConfigError> {
        let deck = settings.default_deck.clone();
        Self::with_decks(settings, catalog, [deck.clone(), deck])
    }

    pub fn with_decks(
        settings: Settings,
        catalog: Arc<CardCatalog>,
        decks: [Vec<String>; 2],
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut rng = Pcg32::seed_from_u64(settings.seed);
        let [mut one, mut two] = decks;
        for deck in [&mut one, &mut two] {
            catalog.validate_deck(deck)?;
            if settings.shuffle_decks {
                deck.shuffle(&mut rng);
            }
        }
        let players = [
            PlayerState::new(one, &settings.elixir)?,
            PlayerState::new(two, &settings.elixir)?,
        ];
        let towers = Tower::standard_set(&settings.towers, &settings.arena);
        log::debug!("Engine created (seed {:#x})", settings.seed);
        Ok(Self {
            arena: Arena::new(settings.arena.clone()),
            field: Battlefield::new(towers),
            ai: AiManager::new(),
            players,
            effects: Vec::new(),
            next_unit_id: 1,
            next_effect_id: 1,
            game_over: None,
            catalog,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    pub fn tick(&self) -> u64 {
        self.field.tick
    }

    pub fn field(&self) -> &Battlefield {
        &self.field
    }

    pub fn player(&self, side: Side) -> &PlayerState {
        &self.players[side.index()]
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn game_over(&self) -> Option<GameOver> {
        self.game_over
    }

    pub fn towers_standing(&self, side: Side) -> usize {
        self.field.towers_standing(side)
    }

    /// Advance one fixed tick. Returns the result once the match is decided.
    pub fn update(&mut self, double_elixir: bool) -> Option<GameOver> {
        if let Some(over) = self.game_over {
            log::warn!("Engine updated after game over (tick {})", self.field.tick);
            return Some(over);
        }
        self.field.tick += 1;
        let dt = self.settings.dt();

        // 1. Elixir
        let multiplier = if double_elixir {
            self.settings.elixir.double_multiplier
        } else {
            1.0
        };
        for player in &mut self.players {
            player.regen(dt, self.settings.elixir.per_second, multiplier);
        }

        // 2. Units
        self.ai.prune(&mut self.field);
        let ctx = AiContext {
            arena: &self.arena,
            ai: &self.settings.ai,
            tick_rate: self.settings.tick_rate,
        };
        let events = self.ai.update(&mut self.field, &ctx);
        for event in &events {
            if let AiEvent::Hit {
                attacker,
                target: TargetRef::Tower(side, slot),
                kills: true,
                ..
            } = event
            {
                log::debug!(
                    "Unit {attacker} destroyed player {} {:?} tower",
                    side.number(),
                    slot
                );
            }
        }
        if let Some(over) = self.check_main_towers() {
            return Some(self.finish(over));
        }

        // 3. Towers
        self.tower_attacks(dt);

        // 4. Effects
        for effect in &mut self.effects {
            effect.remaining -= dt;
        }
        self.effects.retain(|e| e.remaining > 0.0);

        // 5. Win check
        self.check_main_towers().map(|over| self.finish(over))
    }

    /// Player one's main tower is checked first, so if both fall on the
    /// same tick player two wins
    fn check_main_towers(&self) -> Option<GameOver> {
        let loser = Side::BOTH
            .into_iter()
            .find(|&side| self.field.main_tower_destroyed(side))?;
        Some(GameOver {
            winner: loser.opponent(),
            reason: EndReason::MainTowerDestroyed,
        })
    }

    /// Record the end of the match. The first recorded result stands.
    pub fn finish(&mut self, over: GameOver) -> GameOver {
        match self.game_over {
            Some(existing) => existing,
            None => {
                log::info!(
                    "Game over at tick {}: player {} wins ({})",
                    self.field.tick,
                    over.winner.number(),
                    over.reason.as_str()
                );
                self.game_over = Some(over);
                over
            }
        }
    }

    fn tower_attacks(&mut self, dt: f32) {
        let tick = self.field.tick;
        for i in 0..self.field.towers.len() {
            let tower = &mut self.field.towers[i];
            if !tower.is_alive() || !tower.active {
                continue;
            }
            tower.cooldown = (tower.cooldown - dt).max(0.0);
            if tower.cooldown > 0.0 {
                continue;
            }

            let tower = &self.field.towers[i];
            let seeker = Seeker {
                unit: None,
                owner: tower.owner,
                position: tower.position,
                range: tower.range,
                hitbox_radius: tower.hitbox_radius,
                hits_air: true,
                hits_ground: true,
                health: tower.health,
                max_health: tower.max_health,
            };
            let in_range: Vec<_> = self
                .field
                .unit_candidates(tower.owner.opponent())
                .into_iter()
                .filter(|c| tower.covers(c.position, c.hitbox_radius))
                .collect();
            let kept = tower
                .last_target
                .map(TargetRef::Unit)
                .filter(|t| in_range.iter().any(|c| c.target == *t));
            let target = kept.or_else(|| Nearest::default().select(&seeker, &in_range));
            let damage = tower.damage;

            let Some(TargetRef::Unit(id)) = target else {
                self.field.towers[i].last_target = None;
                continue;
            };
            if self.field.damage(TargetRef::Unit(id), damage, tick) {
                log::trace!("Tower {} killed unit {id}", self.field.towers[i].id);
            }
            let tower = &mut self.field.towers[i];
            tower.cooldown = 1.0 / tower.attack_speed;
            tower.last_attack_tick = Some(tick);
            tower.last_target = Some(id);
        }
    }

    /// Play a card from `side`'s hand at (x, z). A rejected deploy changes nothing.
    pub fn deploy_card(
        &mut self,
        side: Side,
        card_id: &str,
        x: f32,
        z: f32,
    ) -> Result<Deployed, DeployError> {
        let catalog = Arc::clone(&self.catalog);
        let result = self.try_deploy(&catalog, side, card_id, Vec2::new(x, z));
        match &result {
            Ok(deployed) => log::debug!(
                "Player {} deployed {card_id} at ({x:.1}, {z:.1}) tick {}: {deployed:?}",
                side.number(),
                self.field.tick
            ),
            Err(err) => log::debug!(
                "Player {} deploy of {card_id} rejected: {err}",
                side.number()
            ),
        }
        result
    }

    fn try_deploy(
        &mut self,
        catalog: &CardCatalog,
        side: Side,
        card_id: &str,
        pos: Vec2,
    ) -> Result<Deployed, DeployError> {
        let card = catalog
            .get(card_id)
            .ok_or_else(|| DeployError::UnknownCard(card_id.to_string()))?;
        let player = &self.players[side.index()];
        let slot = player
            .hand_slot(card_id)
            .ok_or_else(|| DeployError::NotInHand(card_id.to_string()))?;
        let cost = card.cost as f32;
        if !player.can_afford(cost) {
            return Err(DeployError::NotEnoughElixir);
        }
        if !self.is_valid_position(side, card, pos) {
            return Err(DeployError::InvalidPosition);
        }

        self.players[side.index()].play(slot, cost);
        Ok(match &card.kind {
            CardKind::Troop { unit, count } => {
                Deployed::Units(self.spawn_units(side, &card.id, unit, *count, pos))
            }
            CardKind::Building { unit } => {
                Deployed::Units(self.spawn_units(side, &card.id, unit, 1, pos))
            }
            CardKind::Spell(spell) => self.cast(side, &card.id, spell, pos),
        })
    }

    /// Troops and buildings land on the player's own bank; spells anywhere
    /// inside the arena
    fn is_valid_position(&self, side: Side, card: &CardDef, pos: Vec2) -> bool {
        match card.kind {
            CardKind::Spell(_) => pos.is_finite() && self.arena.in_bounds(pos),
            _ => self.arena.is_valid_deploy(side, pos),
        }
    }

    fn spawn_units(
        &mut self,
        side: Side,
        card_id: &str,
        stats: &UnitStats,
        count: u32,
        pos: Vec2,
    ) -> Vec<UnitId> {
        let spread = self.settings.ai.spawn_spread;
        let mut ids = Vec::with_capacity(count as usize);
        for i in 0..count {
            let offset = if count > 1 {
                let angle = TAU * i as f32 / count as f32;
                Vec2::new(angle.cos(), angle.sin()) * spread
            } else {
                Vec2::ZERO
            };
            let at = self.arena.clamp_to_bank(side, pos + offset);
            let id = self.next_unit_id;
            self.next_unit_id += 1;
            let unit = Unit::new(id, side, card_id, stats.clone(), at, self.field.tick);
            self.ai.add(&unit);
            self.field.insert_unit(unit);
            ids.push(id);
        }
        ids
    }

    fn cast(&mut self, side: Side, card_id: &str, spell: &SpellDef, pos: Vec2) -> Deployed {
        let tick = self.field.tick;
        let rate = self.settings.tick_rate;
        let stun_until = tick + self.settings.secs_to_ticks(spell.stun);
        let affected_side = match spell.affects {
            SpellTargets::Enemies => side.opponent(),
            SpellTargets::Allies => side,
        };
        let reaches =
            |at: Vec2, hitbox: f32| (at.distance(pos) - hitbox).max(0.0) <= spell.radius;

        let mut hits = 0;
        for unit in self
            .field
            .units
            .iter_mut()
            .filter(|u| u.owner == affected_side && u.is_alive())
        {
            if !reaches(unit.position, unit.stats.hitbox_radius) {
                continue;
            }
            hits += 1;
            if spell.damage > 0.0 {
                unit.apply_damage(spell.damage, tick);
            }
            if spell.stun > 0.0 {
                unit.stun(stun_until);
            }
            for buff in &spell.buffs {
                unit.add_buff(buff, tick, rate);
            }
        }

        if spell.affects == SpellTargets::Enemies && spell.tower_damage > 0.0 {
            for slot in TowerSlot::ALL {
                let Some(tower) = self.field.tower(affected_side, slot) else {
                    continue;
                };
                if tower.is_alive() && reaches(tower.position, tower.hitbox_radius) {
                    hits += 1;
                    self.field
                        .damage_tower(affected_side, slot, spell.tower_damage, tick);
                }
            }
        }

        let effect = self.next_effect_id;
        self.next_effect_id += 1;
        self.effects.push(Effect {
            id: effect,
            card_id: card_id.to_string(),
            owner: side,
            position: pos,
            radius: spell.radius,
            remaining: spell.effect_duration,
        });
        Deployed::Spell { effect, hits }
    }

    /// Render-facing view of the current state. Pure: repeated calls
    /// without an update serialize identically.
    pub fn get_state(&self) -> StateSnapshot {
        StateSnapshot::capture(&self.field, &self.players, &self.effects)
    }

    /// Side with more total remaining tower health; player one on a tie
    pub fn tiebreak_winner(&self) -> Side {
        let one = self.field.tower_health_total(Side::One);
        let two = self.field.tower_health_total(Side::Two);
        if two > one { Side::Two } else { Side::One }
    }

    #[cfg(test)]
    pub(crate) fn field_mut(&mut self) -> &mut Battlefield {
        &mut self.field
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self, side: Side) -> &mut PlayerState {
        &mut self.players[side.index()]
    }
}
