//! Shared fixtures for simulation tests

use glam::Vec2;

use super::cards::{CardCatalog, CardKind, UnitStats};
use super::state::{Side, UnitId};
use super::unit::Unit;

/// Stat block of a built-in troop or building card
pub(crate) fn stats(card_id: &str) -> UnitStats {
    let catalog = CardCatalog::default();
    match catalog.get(card_id).map(|c| &c.kind) {
        Some(CardKind::Troop { unit, .. }) | Some(CardKind::Building { unit }) => unit.clone(),
        _ => panic!("{card_id} is not a unit card"),
    }
}

/// A freshly spawned unit of a built-in card at tick 0
pub(crate) fn spawn(id: UnitId, owner: Side, card_id: &str, x: f32, z: f32) -> Unit {
    Unit::new(id, owner, card_id, stats(card_id), Vec2::new(x, z), 0)
}
