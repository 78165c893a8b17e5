//! Unit AI: per-unit state machine and the manager that ticks every unit
//!
//! Each tick a controller:
//! 1. Skips dead units and holds stunned ones in Idle
//! 2. Validates its current target and re-searches on a throttle
//! 3. Attacks in place when in range (windup, hit, recovery)
//! 4. Otherwise walks toward the target or its push destination

use glam::Vec2;

use super::arena::Arena;
use super::state::{Battlefield, TargetRef, UnitId};
use super::targeting::{Candidate, TargetSelector, acquire, is_valid_target};
use super::unit::{Unit, UnitStatus};
use crate::settings::AiConfig;
use crate::{heading_angle, lerp, lerp_angle, move_towards};

/// Timers closer to zero than this count as elapsed
const TIMER_EPSILON: f32 = 1e-6;

/// Sub-phase of a single attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackPhase {
    #[default]
    None,
    Windup,
    Recovery,
}

/// Read-only context shared by all controllers during one tick
#[derive(Debug, Clone, Copy)]
pub struct AiContext<'a> {
    pub arena: &'a Arena,
    pub ai: &'a AiConfig,
    pub tick_rate: u32,
}

impl AiContext<'_> {
    #[inline]
    fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}

/// Notable things that happened during an AI update
#[derive(Debug, Clone, PartialEq)]
pub enum AiEvent {
    TargetAcquired {
        unit: UnitId,
        target: TargetRef,
    },
    TargetLost { unit: UnitId },
    Hit {
        attacker: UnitId,
        target: TargetRef,
        damage: f32,
        kills: bool,
    },
    Died { unit: UnitId },
}

/// Damage multiplier for a splash victim `distance` from the impact point
pub fn splash_factor(distance: f32, radius: f32, edge_factor: f32) -> f32 {
    if radius <= 0.0 {
        return 1.0;
    }
    lerp(1.0, edge_factor, (distance / radius).clamp(0.0, 1.0))
}

/// Controller for one unit
#[derive(Debug)]
pub struct UnitAi {
    pub unit_id: UnitId,
    selector: Box<dyn TargetSelector>,
    pub attack_phase: AttackPhase,
    /// Time left in the current attack phase
    phase_timer: f32,
    /// Time until the next throttled search
    retarget_timer: f32,
    force_retarget: bool,
}

impl UnitAi {
    pub fn new(unit_id: UnitId, selector: Box<dyn TargetSelector>) -> Self {
        Self {
            unit_id,
            selector,
            attack_phase: AttackPhase::None,
            phase_timer: 0.0,
            retarget_timer: 0.0,
            force_retarget: true,
        }
    }

    pub fn selector(&self) -> &dyn TargetSelector {
        self.selector.as_ref()
    }

    /// Swap the targeting policy; takes effect on the next search
    pub fn set_selector(&mut self, selector: Box<dyn TargetSelector>) {
        self.selector = selector;
        self.force_retarget = true;
    }

    fn reset_attack(&mut self) {
        self.attack_phase = AttackPhase::None;
        self.phase_timer = 0.0;
    }

    /// Advance this unit by one tick
    pub fn update(&mut self, field: &mut Battlefield, ctx: &AiContext, events: &mut Vec<AiEvent>) {
        let tick = field.tick;
        let dt = ctx.dt();
        let Some(idx) = field.unit_index(self.unit_id) else {
            return;
        };

        {
            let unit = &mut field.units[idx];
            if unit.is_dead() {
                return;
            }
            unit.expire_buffs(tick);
            if unit.update_stun(tick) {
                unit.set_status(UnitStatus::Idle, tick);
                self.reset_attack();
                return;
            }
            unit.attack_cooldown = (unit.attack_cooldown - dt).max(0.0);

            if let Some(lifetime) = unit.stats.lifetime {
                let decay = unit.stats.max_health / lifetime * dt;
                if unit.apply_damage(decay, tick) {
                    log::debug!("Unit {} ({}) expired", unit.id, unit.card_id);
                    events.push(AiEvent::Died { unit: unit.id });
                    return;
                }
            }
        }

        self.validate_target(field, idx, events);

        self.retarget_timer -= dt;
        if (self.force_retarget || self.retarget_timer <= 0.0)
            && self.attack_phase == AttackPhase::None
        {
            self.retarget(field, idx, ctx, events);
        }

        let unit = &field.units[idx];
        let target = unit
            .target
            .and_then(|t| field.candidate(t))
            .filter(|c| is_valid_target(&unit.seeker(), c))
            .map(|c| (c, unit.in_range_of(&c)));
        match target {
            Some((c, true)) => self.engage(field, idx, c, ctx, events),
            Some((c, false)) => self.approach(field, idx, c.position, ctx),
            None => self.wander(field, idx, ctx),
        }
    }

    /// Drop a target that died, vanished or became unreachable
    fn validate_target(&mut self, field: &mut Battlefield, idx: usize, events: &mut Vec<AiEvent>) {
        let tick = field.tick;
        let unit = &field.units[idx];
        let Some(target) = unit.target else {
            return;
        };
        let seeker = unit.seeker();
        if field
            .candidate(target)
            .is_some_and(|c| is_valid_target(&seeker, &c))
        {
            return;
        }
        let unit = &mut field.units[idx];
        unit.target = None;
        if matches!(unit.status, UnitStatus::Attack | UnitStatus::Cooldown) {
            events.push(AiEvent::TargetLost { unit: unit.id });
            unit.set_status(UnitStatus::Idle, tick);
        }
        self.reset_attack();
        self.force_retarget = true;
    }

    fn retarget(
        &mut self,
        field: &mut Battlefield,
        idx: usize,
        ctx: &AiContext,
        events: &mut Vec<AiEvent>,
    ) {
        let found = acquire(
            field,
            &field.units[idx],
            self.selector.as_ref(),
            ctx.ai.search_slack,
        );
        let unit = &mut field.units[idx];
        if found.target != unit.target {
            if let Some(target) = found.target {
                log::trace!("Unit {} targets {:?}", unit.id, target);
                events.push(AiEvent::TargetAcquired {
                    unit: unit.id,
                    target,
                });
            }
        }
        unit.target = found.target;
        unit.destination = found.destination;
        self.retarget_timer = ctx.ai.retarget_interval;
        self.force_retarget = false;
    }

    /// Target in range: run the windup, hit, recovery cycle
    fn engage(
        &mut self,
        field: &mut Battlefield,
        idx: usize,
        target: Candidate,
        ctx: &AiContext,
        events: &mut Vec<AiEvent>,
    ) {
        let tick = field.tick;
        let dt = ctx.dt();
        let unit = &mut field.units[idx];
        face(unit, target.position, ctx.ai.turn_rate);
        if matches!(unit.status, UnitStatus::Idle | UnitStatus::Move) {
            unit.set_status(UnitStatus::Attack, tick);
        }

        if self.attack_phase == AttackPhase::None {
            if unit.attack_cooldown > TIMER_EPSILON {
                unit.set_status(UnitStatus::Cooldown, tick);
                return;
            }
            unit.set_status(UnitStatus::Attack, tick);
            self.attack_phase = AttackPhase::Windup;
            self.phase_timer = unit.stats.windup;
        }

        match self.attack_phase {
            AttackPhase::Windup => {
                self.phase_timer -= dt;
                if self.phase_timer > TIMER_EPSILON {
                    return;
                }
                let killed = self.strike(field, idx, target, ctx, events);
                let unit = &mut field.units[idx];
                unit.attack_cooldown = unit.attack_interval();
                unit.last_attack_tick = Some(tick);
                self.attack_phase = AttackPhase::Recovery;
                self.phase_timer = unit.stats.recovery;
                if killed && ctx.ai.retarget_on_kill {
                    unit.target = None;
                    self.retarget(field, idx, ctx, events);
                }
            }
            AttackPhase::Recovery => {
                self.phase_timer -= dt;
                if self.phase_timer <= TIMER_EPSILON {
                    self.reset_attack();
                    if unit.attack_cooldown > TIMER_EPSILON {
                        unit.set_status(UnitStatus::Cooldown, tick);
                    }
                }
            }
            AttackPhase::None => {}
        }
    }

    /// Apply this unit's hit to `primary`, splashing nearby enemy units.
    /// Returns true if the primary target died.
    fn strike(
        &self,
        field: &mut Battlefield,
        idx: usize,
        primary: Candidate,
        ctx: &AiContext,
        events: &mut Vec<AiEvent>,
    ) -> bool {
        let tick = field.tick;
        let attacker = &field.units[idx];
        let attacker_id = attacker.id;
        let seeker = attacker.seeker();
        let damage = attacker.effective_damage();
        let radius = attacker.stats.splash_radius;

        let mut hits = vec![(primary.target, damage)];
        if radius > 0.0 {
            let impact = primary.position;
            hits.extend(
                field
                    .units
                    .iter()
                    .map(Unit::as_candidate)
                    .filter(|c| {
                        c.target != primary.target && is_valid_target(&seeker, c)
                    })
                    .filter_map(|c| {
                        let d = (c.position.distance(impact) - c.hitbox_radius).max(0.0);
                        (d <= radius).then(|| {
                            let factor = splash_factor(d, radius, ctx.ai.splash_edge_factor);
                            (c.target, damage * factor)
                        })
                    }),
            );
        }

        let mut primary_killed = false;
        for (i, (target, amount)) in hits.into_iter().enumerate() {
            let kills = field.damage(target, amount, tick);
            if i == 0 {
                primary_killed = kills;
            }
            events.push(AiEvent::Hit {
                attacker: attacker_id,
                target,
                damage: amount,
                kills,
            });
            if let (true, TargetRef::Unit(unit)) = (kills, target) {
                events.push(AiEvent::Died { unit });
            }
        }
        primary_killed
    }

    /// Target out of range: close the distance unless holding position
    fn approach(&mut self, field: &mut Battlefield, idx: usize, goal: Vec2, ctx: &AiContext) {
        let tick = field.tick;
        match self.attack_phase {
            AttackPhase::Windup => self.reset_attack(),
            AttackPhase::Recovery => {
                self.phase_timer -= ctx.dt();
                if self.phase_timer > TIMER_EPSILON {
                    return;
                }
                self.reset_attack();
            }
            AttackPhase::None => {}
        }
        let unit = &mut field.units[idx];
        if unit.stats.holds_position() {
            unit.set_status(UnitStatus::Idle, tick);
            return;
        }
        unit.set_status(UnitStatus::Move, tick);
        step(unit, goal, ctx);
    }

    /// No target: push toward the destination, or idle
    fn wander(&mut self, field: &mut Battlefield, idx: usize, ctx: &AiContext) {
        let tick = field.tick;
        self.reset_attack();
        let unit = &mut field.units[idx];
        let Some(goal) = unit.destination else {
            unit.set_status(UnitStatus::Idle, tick);
            return;
        };
        if unit.stats.holds_position() || unit.position.distance(goal) <= TIMER_EPSILON {
            unit.destination = None;
            unit.set_status(UnitStatus::Idle, tick);
            return;
        }
        unit.set_status(UnitStatus::Move, tick);
        step(unit, goal, ctx);
    }
}

/// Turn part of the way toward a point
fn face(unit: &mut Unit, point: Vec2, turn_rate: f32) {
    let dir = point - unit.position;
    if dir.length_squared() > 0.0 {
        unit.rotation = lerp_angle(unit.rotation, heading_angle(dir), turn_rate);
    }
}

/// One tick of movement. Flyers go straight; ground units respect the river.
fn step(unit: &mut Unit, goal: Vec2, ctx: &AiContext) {
    let distance = unit.effective_move_speed() * ctx.dt();
    let from = unit.position;
    let next = if unit.stats.flying {
        ctx.arena.clamp(move_towards(from, goal, distance))
    } else {
        ctx.arena.step_ground(from, goal, distance)
    };
    unit.position = next;
    let moved = next - from;
    if moved.length_squared() > 0.0 {
        unit.rotation = lerp_angle(unit.rotation, heading_angle(moved), ctx.ai.turn_rate);
    }
}

/// Owns every unit controller of a match
#[derive(Debug, Default)]
pub struct AiManager {
    /// Kept in unit id order
    controllers: Vec<UnitAi>,
}

impl AiManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned unit with its card's target policy
    pub fn add(&mut self, unit: &Unit) {
        debug_assert!(
            self.controllers.last().is_none_or(|c| c.unit_id < unit.id),
            "units must be registered in id order"
        );
        self.controllers
            .push(UnitAi::new(unit.id, unit.stats.target_policy.selector()));
    }

    pub fn get(&self, unit_id: UnitId) -> Option<&UnitAi> {
        self.controllers
            .binary_search_by_key(&unit_id, |c| c.unit_id)
            .ok()
            .map(|i| &self.controllers[i])
    }

    pub fn get_mut(&mut self, unit_id: UnitId) -> Option<&mut UnitAi> {
        self.controllers
            .binary_search_by_key(&unit_id, |c| c.unit_id)
            .ok()
            .map(move |i| &mut self.controllers[i])
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Remove units that died before the current tick along with their
    /// controllers. A unit stays visible for the tick it died on.
    pub fn prune(&mut self, field: &mut Battlefield) {
        let tick = field.tick;
        let before = field.units.len();
        field
            .units
            .retain(|u| u.death_tick.is_none_or(|died| died >= tick));
        if field.units.len() != before {
            log::trace!(
                "Pruned {} dead units at tick {tick}",
                before - field.units.len()
            );
        }
        self.controllers
            .retain(|c| field.unit_index(c.unit_id).is_some());
    }

    /// Update every controller once, in unit id order
    pub fn update(&mut self, field: &mut Battlefield, ctx: &AiContext) -> Vec<AiEvent> {
        let mut events = Vec::new();
        for controller in &mut self.controllers {
            controller.update(field, ctx, &mut events);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::state::Side;
    use crate::sim::testing::spawn;
    use crate::sim::tower::{Tower, TowerSlot};
    use proptest::prelude::*;

    struct Rig {
        settings: Settings,
        arena: Arena,
        field: Battlefield,
        manager: AiManager,
    }

    impl Rig {
        fn new() -> Self {
            let settings = Settings::default();
            let arena = Arena::new(settings.arena.clone());
            let field = Battlefield::new(Tower::standard_set(&settings.towers, &settings.arena));
            Self {
                settings,
                arena,
                field,
                manager: AiManager::new(),
            }
        }

        /// Place a unit; only `controlled` units get an AI
        fn place(&mut self, unit: Unit, controlled: bool) {
            if controlled {
                self.manager.add(&unit);
            }
            self.field.insert_unit(unit);
        }

        fn tick(&mut self) -> Vec<AiEvent> {
            self.field.tick += 1;
            self.manager.prune(&mut self.field);
            let ctx = AiContext {
                arena: &self.arena,
                ai: &self.settings.ai,
                tick_rate: self.settings.tick_rate,
            };
            self.manager.update(&mut self.field, &ctx)
        }

        fn unit(&self, id: UnitId) -> &Unit {
            self.field.unit(id).unwrap()
        }
    }

    #[test]
    fn splash_falloff_factor() {
        assert_eq!(splash_factor(0.0, 2.0, 0.5), 1.0);
        assert!((splash_factor(1.0, 2.0, 0.5) - 0.75).abs() < 1e-6);
        assert_eq!(splash_factor(2.0, 2.0, 0.5), 0.5);
        assert_eq!(splash_factor(1.0, 0.0, 0.5), 1.0);
    }

    #[test]
    fn melee_hit_lands_after_windup() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "knight", 0.0, -8.0), true);
        rig.place(spawn(2, Side::Two, "knight", 0.0, -6.8), false);

        for _ in 0..5 {
            rig.tick();
            assert_eq!(rig.unit(2).health, 1400.0);
            assert_eq!(rig.unit(1).status, UnitStatus::Attack);
        }
        let events = rig.tick();
        assert_eq!(rig.unit(2).health, 1240.0);
        assert_eq!(rig.unit(1).last_attack_tick, Some(6));
        assert!(events.contains(&AiEvent::Hit {
            attacker: 1,
            target: TargetRef::Unit(2),
            damage: 160.0,
            kills: false,
        }));

        // Recovery then a cooldown wait before the next swing
        for _ in 0..5 {
            rig.tick();
        }
        assert_eq!(rig.unit(1).status, UnitStatus::Cooldown);
        assert_eq!(rig.manager.get(1).unwrap().attack_phase, AttackPhase::None);
    }

    #[test]
    fn splash_hits_whole_cluster_in_one_tick() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "valkyrie", 0.0, -8.0), true);
        rig.place(spawn(2, Side::Two, "knight", 0.0, -6.5), false);
        rig.place(spawn(3, Side::Two, "knight", 0.8, -6.3), false);
        rig.place(spawn(4, Side::Two, "knight", -0.8, -6.3), false);
        // Friendly unit inside the splash radius is spared
        rig.place(spawn(5, Side::One, "knight", 0.5, -6.6), false);

        let mut hit_tick = None;
        for _ in 0..40 {
            rig.tick();
            let damaged: Vec<bool> = (2..=4).map(|id| rig.unit(id).health < 1400.0).collect();
            if damaged.iter().any(|d| *d) {
                assert!(damaged.iter().all(|d| *d), "partial splash {damaged:?}");
                hit_tick = Some(rig.field.tick);
                break;
            }
        }
        assert!(hit_tick.is_some());
        assert_eq!(rig.unit(2).health, 1400.0 - 220.0);
        for id in [3, 4] {
            let taken = 1400.0 - rig.unit(id).health;
            assert!(taken >= 110.0 && taken < 220.0, "{taken}");
        }
        assert_eq!(rig.unit(5).health, 1400.0);
    }

    #[test]
    fn retargets_immediately_after_kill() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "knight", 0.0, -8.0), true);
        rig.place(spawn(2, Side::Two, "skeletons", 0.0, -6.8), false);
        rig.place(spawn(3, Side::Two, "skeletons", 1.5, -7.0), false);

        let mut kill_events = Vec::new();
        for _ in 0..10 {
            let events = rig.tick();
            if rig.unit(2).is_dead() {
                kill_events = events;
                break;
            }
        }
        assert!(kill_events.contains(&AiEvent::Died { unit: 2 }));
        assert!(kill_events.contains(&AiEvent::TargetAcquired {
            unit: 1,
            target: TargetRef::Unit(3),
        }));
        assert_eq!(rig.unit(1).target, Some(TargetRef::Unit(3)));
    }

    #[test]
    fn lost_target_notifies_and_retargets() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "knight", 0.0, -8.0), true);
        rig.place(spawn(2, Side::Two, "knight", 0.0, -6.8), false);
        rig.tick();
        assert_eq!(rig.unit(1).target, Some(TargetRef::Unit(2)));
        assert_eq!(
            rig.manager.get(1).unwrap().attack_phase,
            AttackPhase::Windup
        );

        let tick = rig.field.tick;
        rig.field.damage(TargetRef::Unit(2), 1e6, tick);
        let events = rig.tick();
        assert!(events.contains(&AiEvent::TargetLost { unit: 1 }));
        assert!(matches!(
            rig.unit(1).target,
            Some(TargetRef::Tower(Side::Two, _))
        ));
        assert_eq!(rig.unit(1).status, UnitStatus::Move);
    }

    #[test]
    fn stunned_unit_idles() {
        let mut rig = Rig::new();
        let mut knight = spawn(1, Side::One, "knight", 0.0, -8.0);
        knight.stun(40);
        rig.place(knight, true);
        rig.place(spawn(2, Side::Two, "knight", 0.0, -6.8), false);
        for _ in 0..39 {
            rig.tick();
            assert_eq!(rig.unit(1).status, UnitStatus::Idle);
        }
        assert_eq!(rig.unit(2).health, 1400.0);
        assert_eq!(rig.unit(1).position, Vec2::new(0.0, -8.0));
        rig.tick();
        assert!(!rig.unit(1).stunned);
        assert_eq!(rig.unit(1).status, UnitStatus::Attack);
    }

    #[test]
    fn ground_unit_walks_to_bridge_before_crossing() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "knight", 0.0, -3.0), true);
        rig.tick();
        let knight = rig.unit(1);
        assert_eq!(knight.status, UnitStatus::Move);
        assert_eq!(
            knight.target,
            Some(TargetRef::Tower(Side::Two, TowerSlot::Left))
        );
        assert!(knight.position.x < 0.0);
        assert_eq!(knight.position.y, -3.0);

        // Far enough to reach the bridge and cross
        for _ in 0..400 {
            rig.tick();
        }
        let knight = rig.unit(1);
        assert!(knight.position.y > 1.0);
        assert!((knight.position.x - -5.5).abs() < 1.5);
    }

    #[test]
    fn flyers_ignore_the_river() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "minions", 0.0, -3.0), true);
        rig.tick();
        let minion = rig.unit(1);
        assert!(minion.position.x < 0.0);
        assert!(minion.position.y > -3.0);
    }

    #[test]
    fn building_holds_position_and_decays() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "cannon", 0.0, -6.0), true);
        for _ in 0..300 {
            rig.tick();
        }
        let cannon = rig.unit(1);
        assert_eq!(cannon.position, Vec2::new(0.0, -6.0));
        assert_eq!(cannon.status, UnitStatus::Idle);
        assert!((cannon.health - 400.0).abs() < 5.0, "{}", cannon.health);
        for _ in 0..320 {
            rig.tick();
        }
        assert!(rig.field.unit(1).is_none());
        assert!(rig.manager.is_empty());
    }

    #[test]
    fn dead_units_linger_one_tick() {
        let mut rig = Rig::new();
        rig.place(spawn(1, Side::One, "knight", 0.0, -8.0), true);
        rig.tick();
        let tick = rig.field.tick;
        rig.field.damage(TargetRef::Unit(1), 1e6, tick);
        rig.manager.prune(&mut rig.field);
        assert!(rig.field.unit(1).is_some());
        rig.tick();
        assert!(rig.field.unit(1).is_none());
        assert!(rig.manager.get(1).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn health_never_rises(
            placements in proptest::collection::vec(
                (0usize..6, any::<bool>(), -8.0f32..8.0, 2.0f32..12.0),
                1..12,
            )
        ) {
            const CARDS: [&str; 6] =
                ["knight", "archers", "giant", "minions", "valkyrie", "skeletons"];
            let mut rig = Rig::new();
            for (i, &(card, two, x, depth)) in placements.iter().enumerate() {
                let (side, z) = if two { (Side::Two, depth) } else { (Side::One, -depth) };
                rig.place(spawn(i as UnitId + 1, side, CARDS[card], x, z), true);
            }
            let mut last: std::collections::BTreeMap<UnitId, f32> =
                rig.field.units.iter().map(|u| (u.id, u.health)).collect();
            let mut towers: Vec<f32> = rig.field.towers.iter().map(|t| t.health).collect();
            for _ in 0..200 {
                rig.tick();
                for unit in &rig.field.units {
                    prop_assert!(unit.health >= 0.0);
                    prop_assert!(unit.health <= last[&unit.id]);
                    prop_assert_eq!(unit.is_dead(), unit.health <= 0.0);
                    last.insert(unit.id, unit.health);
                }
                for (tower, prev) in rig.field.towers.iter().zip(towers.iter_mut()) {
                    prop_assert!(tower.health <= *prev);
                    *prev = tower.health;
                }
            }
        }
    }
}
