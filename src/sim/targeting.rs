//! Target selection
//!
//! Selectors are pure functions of (seeker, candidates) and know nothing
//! about units or controllers, so they can be swapped per card. Every
//! strategy applies the same validity filter and breaks ties in favor of
//! the earliest candidate, which keeps selection deterministic as long as
//! callers pass candidates in a stable order.

use std::sync::Arc;

use glam::Vec2;

use super::cards::UnitCategory;
use super::state::{Battlefield, Side, TargetRef, UnitId};
use super::unit::Unit;

/// The unit doing the searching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seeker {
    /// `None` for searches not made by a unit (towers, spells)
    pub unit: Option<UnitId>,
    pub owner: Side,
    pub position: Vec2,
    pub range: f32,
    pub hitbox_radius: f32,
    pub hits_air: bool,
    pub hits_ground: bool,
    pub health: f32,
    pub max_health: f32,
}

/// Something that might be attacked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub target: TargetRef,
    pub owner: Side,
    pub position: Vec2,
    pub hitbox_radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub flying: bool,
    pub category: UnitCategory,
    pub dps: f32,
    pub range: f32,
}

impl Candidate {
    /// Centre distance to the seeker
    #[inline]
    pub fn distance(&self, seeker: &Seeker) -> f32 {
        seeker.position.distance(self.position)
    }

    /// Gap between hitboxes
    #[inline]
    pub fn edge_distance(&self, seeker: &Seeker) -> f32 {
        let gap = self.distance(seeker) - seeker.hitbox_radius - self.hitbox_radius;
        gap.max(0.0)
    }

    #[inline]
    fn health_fraction(&self) -> f32 {
        if self.max_health > 0.0 {
            self.health / self.max_health
        } else {
            0.0
        }
    }

    #[inline]
    fn health_key(&self, percent: bool) -> f32 {
        if percent {
            self.health_fraction()
        } else {
            self.health
        }
    }
}

/// Shared filter: alive, hostile, not the seeker itself, and reachable
/// given the seeker's air/ground capability
pub fn is_valid_target(seeker: &Seeker, candidate: &Candidate) -> bool {
    if candidate.health <= 0.0 || candidate.owner == seeker.owner {
        return false;
    }
    if let (Some(me), TargetRef::Unit(id)) = (seeker.unit, candidate.target) {
        if me == id {
            return false;
        }
    }
    if candidate.flying {
        seeker.hits_air
    } else {
        seeker.hits_ground
    }
}

/// A swappable targeting policy
pub trait TargetSelector: Send + Sync {
    /// Pick the best target among `candidates`, or `None`
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef>;

    fn name(&self) -> &'static str;
}

impl std::fmt::Debug for dyn TargetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowest key wins; first candidate wins ties
fn min_by_key(
    seeker: &Seeker,
    candidates: &[Candidate],
    key: impl Fn(&Candidate) -> f32,
) -> Option<TargetRef> {
    let mut best: Option<(TargetRef, f32)> = None;
    for c in candidates.iter().filter(|c| is_valid_target(seeker, c)) {
        let k = key(c);
        if best.is_none_or(|(_, bk)| k < bk) {
            best = Some((c.target, k));
        }
    }
    best.map(|(t, _)| t)
}

/// Closest valid candidate by centre distance, optionally capped
#[derive(Debug, Clone, Copy, Default)]
pub struct Nearest {
    /// Ignore candidates whose hitbox edge is farther than this
    pub max_range: Option<f32>,
}

impl TargetSelector for Nearest {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        let mut best: Option<(TargetRef, f32)> = None;
        for c in candidates.iter().filter(|c| is_valid_target(seeker, c)) {
            if self.max_range.is_some_and(|r| c.edge_distance(seeker) > r) {
                continue;
            }
            let d = c.distance(seeker);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((c.target, d));
            }
        }
        best.map(|(t, _)| t)
    }

    fn name(&self) -> &'static str {
        "nearest"
    }
}

/// Weakest valid candidate, by absolute health or fraction of max health
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestHealth {
    pub percent: bool,
}

impl TargetSelector for LowestHealth {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        min_by_key(seeker, candidates, |c| c.health_key(self.percent))
    }

    fn name(&self) -> &'static str {
        if self.percent {
            "lowest_health_percent"
        } else {
            "lowest_health"
        }
    }
}

/// Toughest valid candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestHealth {
    pub percent: bool,
}

impl TargetSelector for HighestHealth {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        min_by_key(seeker, candidates, |c| -c.health_key(self.percent))
    }

    fn name(&self) -> &'static str {
        "highest_health"
    }
}

/// Try categories in order, nearest within the first one that has a match
#[derive(Debug, Clone)]
pub struct PriorityList {
    pub order: Vec<UnitCategory>,
    /// Fall back to the nearest candidate of any category
    pub fallback_nearest: bool,
}

impl TargetSelector for PriorityList {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        let nearest = Nearest::default();
        for category in &self.order {
            let subset: Vec<Candidate> = candidates
                .iter()
                .filter(|c| c.category == *category)
                .copied()
                .collect();
            if let Some(target) = nearest.select(seeker, &subset) {
                return Some(target);
            }
        }
        if self.fallback_nearest {
            nearest.select(seeker, candidates)
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "priority_list"
    }
}

/// Weights for [`ThreatScore`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreatWeights {
    /// Per point of target damage per second
    pub dps: f32,
    /// Bonus when the seeker stands inside the target's attack range
    pub in_range: f32,
    /// Scales 1 / (1 + distance)
    pub proximity: f32,
    /// Scales the fraction of health the target has already lost
    pub deficit: f32,
}

impl Default for ThreatWeights {
    fn default() -> Self {
        Self {
            dps: 0.01,
            in_range: 1.0,
            proximity: 4.0,
            deficit: 1.0,
        }
    }
}

/// Highest weighted threat wins
#[derive(Debug, Clone, Copy)]
pub struct ThreatScore {
    weights: ThreatWeights,
}

impl ThreatScore {
    pub fn new(weights: ThreatWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, seeker: &Seeker, c: &Candidate) -> f32 {
        let w = &self.weights;
        let threatens = c.edge_distance(seeker) <= c.range;
        w.dps * c.dps
            + if threatens { w.in_range } else { 0.0 }
            + w.proximity / (1.0 + c.distance(seeker))
            + w.deficit * (1.0 - c.health_fraction())
    }
}

impl TargetSelector for ThreatScore {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        min_by_key(seeker, candidates, |c| -self.score(seeker, c))
    }

    fn name(&self) -> &'static str {
        "threat"
    }
}

/// Ensemble: each member votes for its pick with its weight; most votes wins
#[derive(Debug, Default)]
pub struct Composite {
    members: Vec<(Box<dyn TargetSelector>, f32)>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: impl TargetSelector + 'static, weight: f32) -> Self {
        self.members.push((Box::new(selector), weight));
        self
    }
}

impl TargetSelector for Composite {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        // Tallies stay in first-vote order so equal totals resolve to the
        // earliest voted target
        let mut tally: Vec<(TargetRef, f32)> = Vec::new();
        for (selector, weight) in &self.members {
            let Some(pick) = selector.select(seeker, candidates) else {
                continue;
            };
            match tally.iter_mut().find(|(t, _)| *t == pick) {
                Some((_, votes)) => *votes += weight,
                None => tally.push((pick, *weight)),
            }
        }
        let mut best: Option<(TargetRef, f32)> = None;
        for (target, votes) in tally {
            if best.is_none_or(|(_, bv)| votes > bv) {
                best = Some((target, votes));
            }
        }
        best.map(|(t, _)| t)
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

/// Visibility predicate for [`LineOfSight`]
pub type Visibility = Arc<dyn Fn(&Seeker, &Candidate) -> bool + Send + Sync>;

/// Drops candidates the predicate cannot see, then delegates
pub struct LineOfSight {
    inner: Box<dyn TargetSelector>,
    visible: Visibility,
}

impl LineOfSight {
    pub fn new(inner: impl TargetSelector + 'static, visible: Visibility) -> Self {
        Self {
            inner: Box::new(inner),
            visible,
        }
    }
}

impl TargetSelector for LineOfSight {
    fn select(&self, seeker: &Seeker, candidates: &[Candidate]) -> Option<TargetRef> {
        let seen: Vec<Candidate> = candidates
            .iter()
            .filter(|c| (self.visible)(seeker, c))
            .copied()
            .collect();
        self.inner.select(seeker, &seen)
    }

    fn name(&self) -> &'static str {
        "line_of_sight"
    }
}

/// Result of a full target search for one unit
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Acquisition {
    pub target: Option<TargetRef>,
    /// Where to push when nothing is targetable
    pub destination: Option<Vec2>,
}

/// Full per-unit search: enemy units through the unit's selector, enemy
/// buildings by strict nearest distance, then the default push toward the
/// nearest enemy tower.
pub fn acquire(
    field: &Battlefield,
    unit: &Unit,
    selector: &dyn TargetSelector,
    slack: f32,
) -> Acquisition {
    use super::cards::TargetTag;

    let seeker = unit.seeker();
    let enemy = unit.owner.opponent();
    let wants_units = unit.stats.targets.contains(&TargetTag::Unit);
    let wants_buildings = unit.stats.targets.contains(&TargetTag::Building);

    let building = if wants_buildings {
        Nearest::default()
            .select(&seeker, &field.building_candidates(enemy))
            .and_then(|t| field.candidate(t))
    } else {
        None
    };

    if unit.stats.building_only() {
        if let Some(b) = building {
            return Acquisition {
                target: Some(b.target),
                destination: None,
            };
        }
    } else if wants_units {
        let picked = selector
            .select(&seeker, &field.unit_candidates(enemy))
            .and_then(|t| field.candidate(t));
        if let Some(u) = picked {
            if u.edge_distance(&seeker) <= seeker.range + slack {
                return Acquisition {
                    target: Some(u.target),
                    destination: None,
                };
            }
            let target = match building {
                Some(b) if b.distance(&seeker) <= u.distance(&seeker) => b.target,
                _ => u.target,
            };
            return Acquisition {
                target: Some(target),
                destination: None,
            };
        }
    }

    if let Some(b) = building {
        return Acquisition {
            target: Some(b.target),
            destination: None,
        };
    }

    Acquisition {
        target: None,
        destination: field.nearest_tower_position(enemy, unit.position),
    }
}
