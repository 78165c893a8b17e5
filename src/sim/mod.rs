//! Deterministic simulation module
//!
//! All match logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by unit id, towers in side-before-main order)
//! - No transport or timer dependencies

pub mod ai;
pub mod arena;
pub mod cards;
pub mod economy;
pub mod engine;
pub mod snapshot;
pub mod state;
pub mod targeting;
#[cfg(test)]
pub(crate) mod testing;
pub mod tower;
pub mod unit;

pub use ai::{AiContext, AiEvent, AiManager, AttackPhase, UnitAi};
pub use arena::{Arena, Zone};
pub use cards::{
    BuffDef, BuffKind, CardCatalog, CardDef, CardKind, SpellDef, SpellTargets, TargetPolicy,
    TargetTag, UnitCategory, UnitStats,
};
pub use economy::PlayerState;
pub use engine::{Deployed, EndReason, GameEngine, GameOver};
pub use snapshot::{
    EffectView, PlayerView, PlayersView, Position, SideTowers, StateSnapshot, TickSnapshot,
    TowerView, TowersView, UnitView,
};
pub use state::{Battlefield, Effect, Side, TargetRef, UnitId};
pub use targeting::{
    Acquisition, Candidate, Composite, HighestHealth, LineOfSight, LowestHealth, Nearest,
    PriorityList, Seeker, TargetSelector, ThreatScore, ThreatWeights, Visibility, acquire,
    is_valid_target,
};
pub use tower::{Tower, TowerSlot};
pub use unit::{Buff, Unit, UnitStatus};
