//! Render-facing state snapshots
//!
//! Plain owned copies of the battlefield in the JSON shape clients expect.
//! Nothing here borrows from the engine.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::economy::PlayerState;
use super::state::{Battlefield, Effect, Side, UnitId};
use super::tower::{Tower, TowerSlot};
use super::unit::Unit;

/// Point on the arena plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub z: f32,
}

impl From<Vec2> for Position {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, z: v.y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Rounded to one decimal place
    pub elixir: f32,
    pub hand: Vec<String>,
    pub next_card: String,
}

impl From<&PlayerState> for PlayerView {
    fn from(player: &PlayerState) -> Self {
        Self {
            elixir: player.elixir_display(),
            hand: player.hand().to_vec(),
            next_card: player.next_card().to_string(),
        }
    }
}

/// Both players keyed by player number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayersView {
    #[serde(rename = "1")]
    pub one: PlayerView,
    #[serde(rename = "2")]
    pub two: PlayerView,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TowerView {
    pub id: String,
    pub health: f32,
    pub max_health: f32,
    pub position: Position,
    pub last_attack_tick: Option<u64>,
    pub last_target: Option<UnitId>,
}

impl From<&Tower> for TowerView {
    fn from(tower: &Tower) -> Self {
        Self {
            id: tower.id.clone(),
            health: tower.health,
            max_health: tower.max_health,
            position: tower.position.into(),
            last_attack_tick: tower.last_attack_tick,
            last_target: tower.last_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideTowers {
    pub main: TowerView,
    pub left: TowerView,
    pub right: TowerView,
}

impl SideTowers {
    fn capture(field: &Battlefield, side: Side) -> Self {
        let view = |slot| {
            field
                .tower(side, slot)
                .map(TowerView::from)
                .unwrap_or_default()
        };
        Self {
            main: view(TowerSlot::Main),
            left: view(TowerSlot::Left),
            right: view(TowerSlot::Right),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowersView {
    pub player1: SideTowers,
    pub player2: SideTowers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub id: UnitId,
    pub card_id: String,
    pub owner: Side,
    pub position: Position,
    pub rotation: f32,
    pub health: f32,
    pub max_health: f32,
    pub last_attack_tick: Option<u64>,
    pub spawn_tick: u64,
}

impl From<&Unit> for UnitView {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            card_id: unit.card_id.clone(),
            owner: unit.owner,
            position: unit.position.into(),
            rotation: unit.rotation,
            health: unit.health,
            max_health: unit.stats.max_health,
            last_attack_tick: unit.last_attack_tick,
            spawn_tick: unit.spawn_tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectView {
    pub id: u32,
    pub card_id: String,
    pub owner: Side,
    pub position: Position,
    pub radius: f32,
    pub remaining: f32,
}

impl From<&Effect> for EffectView {
    fn from(effect: &Effect) -> Self {
        Self {
            id: effect.id,
            card_id: effect.card_id.clone(),
            owner: effect.owner,
            position: effect.position.into(),
            radius: effect.radius,
            remaining: effect.remaining,
        }
    }
}

/// Complete visible state of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub players: PlayersView,
    pub towers: TowersView,
    /// Sorted by id
    pub units: Vec<UnitView>,
    pub effects: Vec<EffectView>,
}

impl StateSnapshot {
    pub fn capture(field: &Battlefield, players: &[PlayerState; 2], effects: &[Effect]) -> Self {
        Self {
            players: PlayersView {
                one: PlayerView::from(&players[Side::One.index()]),
                two: PlayerView::from(&players[Side::Two.index()]),
            },
            towers: TowersView {
                player1: SideTowers::capture(field, Side::One),
                player2: SideTowers::capture(field, Side::Two),
            },
            units: field.units.iter().map(UnitView::from).collect(),
            effects: effects.iter().map(EffectView::from).collect(),
        }
    }
}

/// Per-tick broadcast while a match is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSnapshot {
    pub tick: u64,
    /// Seconds since the match started
    pub elapsed: f32,
    pub is_double_elixir: bool,
    pub state: StateSnapshot,
}
