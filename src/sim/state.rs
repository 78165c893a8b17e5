//! Shared simulation types
//!
//! Sides, identifiers, target references and the battlefield that holds
//! every live combatant of one match.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::cards::UnitCategory;
use super::targeting::Candidate;
use super::tower::{Tower, TowerSlot};
use super::unit::Unit;
use crate::error::RoomError;

/// Unit identifier, unique within one engine
pub type UnitId = u32;

/// One of the two players. Serialized as the player number (1 or 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::One, Side::Two];

    /// Player number as seen by clients
    pub const fn number(self) -> u8 {
        match self {
            Side::One => 1,
            Side::Two => 2,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }

    pub const fn opponent(self) -> Side {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }

    /// Direction of the enemy half along z (player one defends -z)
    pub const fn forward(self) -> f32 {
        match self {
            Side::One => 1.0,
            Side::Two => -1.0,
        }
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> Self {
        side.number()
    }
}

impl TryFrom<u8> for Side {
    type Error = RoomError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(Side::One),
            2 => Ok(Side::Two),
            other => Err(RoomError::UnknownPlayer(other)),
        }
    }
}

/// Something a unit can attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    Unit(UnitId),
    Tower(Side, TowerSlot),
}

/// Transient area effect left by a spell. Damage is applied once at cast
/// time; the effect only tells the renderer how long to show it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub id: u32,
    pub card_id: String,
    pub owner: Side,
    pub position: Vec2,
    pub radius: f32,
    pub remaining: f32,
}

/// Every combatant of one match
#[derive(Debug, Clone, Default)]
pub struct Battlefield {
    /// Units sorted by id
    pub units: Vec<Unit>,
    /// Towers of both sides; per side the order is left, right, main
    pub towers: Vec<Tower>,
    /// Current simulation tick
    pub tick: u64,
}

impl Battlefield {
    pub fn new(towers: Vec<Tower>) -> Self {
        Self {
            units: Vec::new(),
            towers,
            tick: 0,
        }
    }

    /// Index of a unit by id (units are kept sorted by id)
    pub fn unit_index(&self, id: UnitId) -> Option<usize> {
        self.units.binary_search_by_key(&id, |u| u.id).ok()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.unit_index(id).map(|i| &self.units[i])
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.unit_index(id).map(move |i| &mut self.units[i])
    }

    /// Insert a unit, keeping id order
    pub fn insert_unit(&mut self, unit: Unit) {
        match self.units.binary_search_by_key(&unit.id, |u| u.id) {
            Ok(i) => {
                debug_assert!(false, "duplicate unit id {}", unit.id);
                self.units[i] = unit;
            }
            Err(i) => self.units.insert(i, unit),
        }
    }

    pub fn tower(&self, side: Side, slot: TowerSlot) -> Option<&Tower> {
        self.towers
            .iter()
            .find(|t| t.owner == side && t.slot == slot)
    }

    pub fn tower_mut(&mut self, side: Side, slot: TowerSlot) -> Option<&mut Tower> {
        self.towers
            .iter_mut()
            .find(|t| t.owner == side && t.slot == slot)
    }

    /// Towers belonging to one side, in precedence order (sides before main)
    pub fn towers_of(&self, side: Side) -> impl Iterator<Item = &Tower> {
        self.towers.iter().filter(move |t| t.owner == side)
    }

    /// Number of living towers a side still has
    pub fn towers_standing(&self, side: Side) -> usize {
        self.towers_of(side).filter(|t| t.is_alive()).count()
    }

    /// Summed remaining tower health of one side, each tower clamped at zero
    pub fn tower_health_total(&self, side: Side) -> f32 {
        self.towers_of(side).map(|t| t.health.max(0.0)).sum()
    }

    pub fn main_tower_destroyed(&self, side: Side) -> bool {
        self.tower(side, TowerSlot::Main)
            .is_none_or(|t| !t.is_alive())
    }

    /// Damage a tower. Destroying a side tower wakes its main tower.
    /// Returns true if this hit destroyed the tower.
    pub fn damage_tower(&mut self, side: Side, slot: TowerSlot, amount: f32, tick: u64) -> bool {
        let Some(tower) = self.tower_mut(side, slot) else {
            return false;
        };
        let destroyed = tower.apply_damage(amount, tick);
        if destroyed {
            log::info!(
                "Player {} {:?} tower destroyed at tick {tick}",
                side.number(),
                slot
            );
            if slot != TowerSlot::Main {
                if let Some(main) = self.tower_mut(side, TowerSlot::Main) {
                    main.activate();
                }
            }
        }
        destroyed
    }

    /// Damage any target. Returns true if this hit destroyed it.
    pub fn damage(&mut self, target: TargetRef, amount: f32, tick: u64) -> bool {
        match target {
            TargetRef::Unit(id) => self
                .unit_mut(id)
                .is_some_and(|u| u.apply_damage(amount, tick)),
            TargetRef::Tower(side, slot) => self.damage_tower(side, slot, amount, tick),
        }
    }

    /// Live target description, or `None` if the target is gone or dead
    pub fn candidate(&self, target: TargetRef) -> Option<Candidate> {
        match target {
            TargetRef::Unit(id) => self
                .unit(id)
                .filter(|u| u.is_alive())
                .map(Unit::as_candidate),
            TargetRef::Tower(side, slot) => self
                .tower(side, slot)
                .filter(|t| t.is_alive())
                .map(Tower::as_candidate),
        }
    }

    /// Live units owned by `side`, in id order
    pub fn unit_candidates(&self, side: Side) -> Vec<Candidate> {
        self.units
            .iter()
            .filter(|u| u.owner == side && u.is_alive())
            .map(Unit::as_candidate)
            .collect()
    }

    /// Live buildings owned by `side`: towers first (sides before main),
    /// then building units in id order
    pub fn building_candidates(&self, side: Side) -> Vec<Candidate> {
        let towers = self
            .towers_of(side)
            .filter(|t| t.is_alive())
            .map(Tower::as_candidate);
        let buildings = self
            .units
            .iter()
            .filter(|u| {
                u.owner == side && u.is_alive() && u.stats.category == UnitCategory::Building
            })
            .map(Unit::as_candidate);
        towers.chain(buildings).collect()
    }

    /// Position of the nearest living tower of `side`, ties resolved by tower order
    pub fn nearest_tower_position(&self, side: Side, from: Vec2) -> Option<Vec2> {
        let mut best: Option<(Vec2, f32)> = None;
        for tower in self.towers_of(side).filter(|t| t.is_alive()) {
            let d = from.distance(tower.position);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((tower.position, d));
            }
        }
        best.map(|(p, _)| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::testing::spawn;

    #[test]
    fn side_numbers_round_trip() {
        for side in Side::BOTH {
            assert_eq!(Side::try_from(side.number()).unwrap(), side);
            assert_eq!(side.opponent().opponent(), side);
        }
        assert_eq!(Side::try_from(3), Err(RoomError::UnknownPlayer(3)));
    }

    #[test]
    fn side_tower_loss_wakes_main() {
        let settings = crate::Settings::default();
        let mut field = Battlefield::new(Tower::standard_set(&settings.towers, &settings.arena));
        assert!(!field.tower(Side::Two, TowerSlot::Main).unwrap().active);
        let left = TargetRef::Tower(Side::Two, TowerSlot::Left);
        assert!(field.damage(left, 1e6, 3));
        assert!(field.tower(Side::Two, TowerSlot::Main).unwrap().active);
        assert_eq!(field.towers_standing(Side::Two), 2);
        assert_eq!(field.tower_health_total(Side::Two), 6500.0);
        assert!(field.candidate(left).is_none());
        assert!(!field.main_tower_destroyed(Side::Two));
    }

    #[test]
    fn units_stay_sorted_by_id() {
        let mut field = Battlefield::default();
        for id in [5, 1, 3] {
            field.insert_unit(spawn(id, Side::One, "knight", 0.0, -5.0));
        }
        let ids: Vec<UnitId> = field.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert!(field.unit(3).is_some());
        assert!(field.unit(2).is_none());
        assert!(field.damage(TargetRef::Unit(3), 1e6, 1));
        assert!(field.candidate(TargetRef::Unit(3)).is_none());
        let candidates = field.unit_candidates(Side::One);
        assert!(candidates.iter().all(|c| c.target != TargetRef::Unit(3)));
    }

    #[test]
    fn side_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Side::Two).unwrap(), "2");
        let side: Side = serde_json::from_str("1").unwrap();
        assert_eq!(side, Side::One);
        assert!(serde_json::from_str::<Side>("0").is_err());
    }
}
