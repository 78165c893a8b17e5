//! Card definitions
//!
//! Cards are a closed set of variants (troop, spell, building) loaded from
//! static data and validated once at load time. The simulation never sees
//! a card that failed validation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::targeting::{
    HighestHealth, LowestHealth, Nearest, TargetSelector, ThreatScore, ThreatWeights,
};
use crate::consts::DECK_SIZE;
use crate::error::ConfigError;

/// Broad combat role of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Melee,
    Ranged,
    Flying,
    Building,
}

/// What a unit is willing to attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTag {
    Unit,
    Building,
}

/// Which selector picks among enemy units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    #[default]
    Nearest,
    LowestHealth,
    LowestHealthPercent,
    HighestHealth,
    Threat,
}

impl TargetPolicy {
    /// Build the selector this policy names
    pub fn selector(self) -> Box<dyn TargetSelector> {
        match self {
            TargetPolicy::Nearest => Box::new(Nearest::default()),
            TargetPolicy::LowestHealth => Box::new(LowestHealth { percent: false }),
            TargetPolicy::LowestHealthPercent => Box::new(LowestHealth { percent: true }),
            TargetPolicy::HighestHealth => Box::new(HighestHealth { percent: false }),
            TargetPolicy::Threat => Box::new(ThreatScore::new(ThreatWeights::default())),
        }
    }
}

/// Stat block for a spawned unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub category: UnitCategory,
    pub max_health: f32,
    pub damage: f32,
    /// Attacks per second
    pub attack_speed: f32,
    /// Distance per second
    pub move_speed: f32,
    pub attack_range: f32,
    /// 0 = single target
    #[serde(default)]
    pub splash_radius: f32,
    pub hitbox_radius: f32,
    #[serde(default)]
    pub flying: bool,
    #[serde(default)]
    pub hits_air: bool,
    #[serde(default = "default_true")]
    pub hits_ground: bool,
    #[serde(default)]
    pub target_policy: TargetPolicy,
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetTag>,
    /// Delay between starting a swing and the hit landing
    #[serde(default)]
    pub windup: f32,
    /// Delay after the hit before the unit may act again
    #[serde(default)]
    pub recovery: f32,
    /// Buildings lose their health evenly over this many seconds
    #[serde(default)]
    pub lifetime: Option<f32>,
}

fn default_true() -> bool {
    true
}

fn default_targets() -> Vec<TargetTag> {
    vec![TargetTag::Unit, TargetTag::Building]
}

impl UnitStats {
    /// True for units that only ever attack buildings
    pub fn building_only(&self) -> bool {
        self.targets == [TargetTag::Building]
    }

    /// Stationary units never leave their spawn point
    pub fn holds_position(&self) -> bool {
        self.category == UnitCategory::Building || self.move_speed <= 0.0
    }

    fn validate(&self, card: &str) -> Result<(), ConfigError> {
        if self.max_health <= 0.0 {
            return Err(ConfigError::card(card, "max_health must be positive"));
        }
        if self.damage < 0.0 || self.attack_speed <= 0.0 {
            return Err(ConfigError::card(
                card,
                "damage must be non-negative and attack_speed positive",
            ));
        }
        if self.move_speed < 0.0 || self.attack_range < 0.0 || self.splash_radius < 0.0 {
            return Err(ConfigError::card(
                card,
                "speeds and radii must not be negative",
            ));
        }
        if self.hitbox_radius <= 0.0 {
            return Err(ConfigError::card(card, "hitbox_radius must be positive"));
        }
        if !self.hits_air && !self.hits_ground {
            return Err(ConfigError::card(card, "unit can hit nothing"));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::card(card, "targets must not be empty"));
        }
        if self.windup < 0.0 || self.recovery < 0.0 {
            return Err(ConfigError::card(
                card,
                "windup and recovery must not be negative",
            ));
        }
        if self.lifetime.is_some_and(|l| l <= 0.0) {
            return Err(ConfigError::card(card, "lifetime must be positive"));
        }
        if self.flying && self.category != UnitCategory::Flying {
            return Err(ConfigError::card(
                card,
                "flying units must use the flying category",
            ));
        }
        Ok(())
    }
}

/// Stat a buff scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    MoveSpeed,
    AttackSpeed,
    Damage,
}

/// Buff granted by a spell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffDef {
    pub id: String,
    pub kind: BuffKind,
    /// Multiplier applied to the stat
    pub magnitude: f32,
    /// Seconds
    pub duration: f32,
}

/// Who a spell affects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellTargets {
    #[default]
    Enemies,
    Allies,
}

/// Area spell definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellDef {
    pub radius: f32,
    #[serde(default)]
    pub damage: f32,
    /// Damage dealt to towers (usually reduced)
    #[serde(default)]
    pub tower_damage: f32,
    /// Seconds of stun applied to units hit
    #[serde(default)]
    pub stun: f32,
    #[serde(default)]
    pub buffs: Vec<BuffDef>,
    #[serde(default)]
    pub affects: SpellTargets,
    /// How long the renderer shows the effect
    pub effect_duration: f32,
}

/// What a card does when played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardKind {
    Troop {
        unit: UnitStats,
        count: u32,
    },
    Spell(SpellDef),
    Building { unit: UnitStats },
}

/// A playable card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDef {
    pub id: String,
    pub name: String,
    pub cost: u32,
    pub kind: CardKind,
}

impl CardDef {
    fn validate(&self, max_elixir: f32) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::card(&self.name, "empty id"));
        }
        if self.cost as f32 > max_elixir {
            return Err(ConfigError::card(&self.id, "costs more than max elixir"));
        }
        match &self.kind {
            CardKind::Troop { unit, count } => {
                if *count == 0 {
                    return Err(ConfigError::card(
                        &self.id,
                        "troop count must be at least 1",
                    ));
                }
                if unit.category == UnitCategory::Building {
                    return Err(ConfigError::card(
                        &self.id,
                        "troops may not use the building category",
                    ));
                }
                unit.validate(&self.id)
            }
            CardKind::Building { unit } => {
                if unit.category != UnitCategory::Building {
                    return Err(ConfigError::card(
                        &self.id,
                        "buildings must use the building category",
                    ));
                }
                unit.validate(&self.id)
            }
            CardKind::Spell(spell) => {
                if spell.radius <= 0.0 || spell.effect_duration < 0.0 {
                    return Err(ConfigError::card(
                        &self.id,
                        "spell radius must be positive and duration non-negative",
                    ));
                }
                if spell.damage < 0.0 || spell.tower_damage < 0.0 || spell.stun < 0.0 {
                    return Err(ConfigError::card(
                        &self.id,
                        "spell values must not be negative",
                    ));
                }
                if spell
                    .buffs
                    .iter()
                    .any(|b| b.magnitude <= 0.0 || b.duration <= 0.0)
                {
                    return Err(ConfigError::card(
                        &self.id,
                        "buff magnitude and duration must be positive",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// All cards known to a match, keyed by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardCatalog {
    cards: BTreeMap<String, CardDef>,
}

impl CardCatalog {
    /// Build and validate a catalog
    pub fn new(cards: Vec<CardDef>, max_elixir: f32) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for card in cards {
            card.validate(max_elixir)?;
            if map.contains_key(&card.id) {
                return Err(ConfigError::card(&card.id, "duplicate card id"));
            }
            map.insert(card.id.clone(), card);
        }
        Ok(Self { cards: map })
    }

    /// Parse a JSON array of card definitions
    pub fn from_json(json: &str, max_elixir: f32) -> Result<Self, ConfigError> {
        let cards: Vec<CardDef> = serde_json::from_str(json)?;
        Self::new(cards, max_elixir)
    }

    pub fn get(&self, id: &str) -> Option<&CardDef> {
        self.cards.get(id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.cards.keys().map(String::as_str)
    }

    /// A deck is exactly eight distinct known cards
    pub fn validate_deck(&self, deck: &[String]) -> Result<(), ConfigError> {
        if deck.len() != DECK_SIZE {
            return Err(ConfigError::InvalidDeck(format!(
                "expected {DECK_SIZE} cards, got {}",
                deck.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for id in deck {
            if !self.cards.contains_key(id) {
                return Err(ConfigError::InvalidDeck(format!("unknown card `{id}`")));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::InvalidDeck(format!("duplicate card `{id}`")));
            }
        }
        Ok(())
    }
}

impl Default for CardCatalog {
    fn default() -> Self {
        // Built-in data is covered by tests; validation cannot fail here
        Self {
            cards: default_cards()
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }
}

fn troop(id: &str, name: &str, cost: u32, count: u32, unit: UnitStats) -> CardDef {
    CardDef {
        id: id.to_string(),
        name: name.to_string(),
        cost,
        kind: CardKind::Troop { unit, count },
    }
}

fn spell(id: &str, name: &str, cost: u32, def: SpellDef) -> CardDef {
    CardDef {
        id: id.to_string(),
        name: name.to_string(),
        cost,
        kind: CardKind::Spell(def),
    }
}

fn ground(category: UnitCategory) -> UnitStats {
    UnitStats {
        category,
        max_health: 100.0,
        damage: 10.0,
        attack_speed: 1.0,
        move_speed: 1.0,
        attack_range: 1.2,
        splash_radius: 0.0,
        hitbox_radius: 0.5,
        flying: false,
        hits_air: false,
        hits_ground: true,
        target_policy: TargetPolicy::Nearest,
        targets: default_targets(),
        windup: 0.3,
        recovery: 0.2,
        lifetime: None,
    }
}

/// Built-in card set
pub fn default_cards() -> Vec<CardDef> {
    let melee = ground(UnitCategory::Melee);
    let ranged = UnitStats {
        hits_air: true,
        ..ground(UnitCategory::Ranged)
    };
    let flyer = UnitStats {
        flying: true,
        hits_air: true,
        move_speed: 1.5,
        ..ground(UnitCategory::Flying)
    };

    vec![
        troop(
            "knight",
            "Knight",
            3,
            1,
            UnitStats {
                max_health: 1400.0,
                damage: 160.0,
                attack_speed: 1.0 / 1.2,
                ..melee.clone()
            },
        ),
        troop(
            "archers",
            "Archers",
            3,
            2,
            UnitStats {
                max_health: 250.0,
                damage: 90.0,
                attack_speed: 1.0 / 0.9,
                attack_range: 5.0,
                hitbox_radius: 0.4,
                target_policy: TargetPolicy::LowestHealthPercent,
                ..ranged.clone()
            },
        ),
        troop(
            "giant",
            "Giant",
            5,
            1,
            UnitStats {
                max_health: 3300.0,
                damage: 210.0,
                attack_speed: 1.0 / 1.5,
                move_speed: 0.75,
                hitbox_radius: 0.75,
                targets: vec![TargetTag::Building],
                windup: 0.5,
                ..melee.clone()
            },
        ),
        troop(
            "musketeer",
            "Musketeer",
            4,
            1,
            UnitStats {
                max_health: 600.0,
                damage: 180.0,
                attack_speed: 1.0,
                attack_range: 6.0,
                ..ranged.clone()
            },
        ),
        troop(
            "minions",
            "Minions",
            3,
            3,
            UnitStats {
                max_health: 190.0,
                damage: 84.0,
                attack_speed: 1.0,
                attack_range: 2.0,
                hitbox_radius: 0.4,
                ..flyer.clone()
            },
        ),
        troop(
            "baby_dragon",
            "Baby Dragon",
            4,
            1,
            UnitStats {
                max_health: 1000.0,
                damage: 130.0,
                attack_speed: 1.0 / 1.5,
                attack_range: 3.5,
                splash_radius: 1.5,
                hitbox_radius: 0.6,
                ..flyer.clone()
            },
        ),
        troop(
            "valkyrie",
            "Valkyrie",
            4,
            1,
            UnitStats {
                max_health: 1650.0,
                damage: 220.0,
                attack_speed: 1.0 / 1.5,
                splash_radius: 2.0,
                ..melee.clone()
            },
        ),
        troop(
            "hog_rider",
            "Hog Rider",
            4,
            1,
            UnitStats {
                max_health: 1400.0,
                damage: 260.0,
                attack_speed: 1.0 / 1.6,
                move_speed: 2.0,
                targets: vec![TargetTag::Building],
                ..melee.clone()
            },
        ),
        troop(
            "skeletons",
            "Skeletons",
            1,
            3,
            UnitStats {
                max_health: 70.0,
                damage: 70.0,
                attack_speed: 1.0,
                move_speed: 1.5,
                hitbox_radius: 0.3,
                target_policy: TargetPolicy::LowestHealth,
                windup: 0.2,
                recovery: 0.1,
                ..melee.clone()
            },
        ),
        troop(
            "wizard",
            "Wizard",
            5,
            1,
            UnitStats {
                max_health: 600.0,
                damage: 230.0,
                attack_speed: 1.0 / 1.4,
                attack_range: 5.5,
                splash_radius: 1.5,
                target_policy: TargetPolicy::Threat,
                ..ranged.clone()
            },
        ),
        CardDef {
            id: "cannon".to_string(),
            name: "Cannon".to_string(),
            cost: 3,
            kind: CardKind::Building {
                unit: UnitStats {
                    max_health: 800.0,
                    damage: 180.0,
                    attack_speed: 1.0 / 0.9,
                    move_speed: 0.0,
                    attack_range: 5.5,
                    hitbox_radius: 0.9,
                    targets: vec![TargetTag::Unit],
                    windup: 0.1,
                    recovery: 0.1,
                    lifetime: Some(30.0),
                    ..ground(UnitCategory::Building)
                },
            },
        },
        spell(
            "fireball",
            "Fireball",
            4,
            SpellDef {
                radius: 2.5,
                damage: 570.0,
                tower_damage: 170.0,
                stun: 0.0,
                buffs: Vec::new(),
                affects: SpellTargets::Enemies,
                effect_duration: 1.0,
            },
        ),
        spell(
            "arrows",
            "Arrows",
            3,
            SpellDef {
                radius: 4.0,
                damage: 240.0,
                tower_damage: 70.0,
                stun: 0.0,
                buffs: Vec::new(),
                affects: SpellTargets::Enemies,
                effect_duration: 1.0,
            },
        ),
        spell(
            "zap",
            "Zap",
            2,
            SpellDef {
                radius: 2.5,
                damage: 160.0,
                tower_damage: 50.0,
                stun: 0.5,
                buffs: Vec::new(),
                affects: SpellTargets::Enemies,
                effect_duration: 0.5,
            },
        ),
        spell(
            "rage",
            "Rage",
            2,
            SpellDef {
                radius: 5.0,
                damage: 0.0,
                tower_damage: 0.0,
                stun: 0.0,
                buffs: vec![
                    BuffDef {
                        id: "rage_move".to_string(),
                        kind: BuffKind::MoveSpeed,
                        magnitude: 1.35,
                        duration: 6.0,
                    },
                    BuffDef {
                        id: "rage_attack".to_string(),
                        kind: BuffKind::AttackSpeed,
                        magnitude: 1.35,
                        duration: 6.0,
                    },
                ],
                affects: SpellTargets::Allies,
                effect_duration: 6.0,
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MAX_ELIXIR;
    use crate::settings::Settings;

    #[test]
    fn default_cards_validate() {
        let catalog = CardCatalog::new(default_cards(), MAX_ELIXIR).unwrap();
        assert_eq!(catalog.len(), default_cards().len());
    }

    #[test]
    fn default_deck_is_legal() {
        let catalog = CardCatalog::default();
        catalog
            .validate_deck(&Settings::default().default_deck)
            .unwrap();
    }

    #[test]
    fn deck_rejects_duplicates_and_unknowns() {
        let catalog = CardCatalog::default();
        let mut deck = Settings::default().default_deck;
        deck[1] = deck[0].clone();
        assert!(catalog.validate_deck(&deck).is_err());

        let mut deck = Settings::default().default_deck;
        deck[7] = "dragon_lord".to_string();
        assert!(catalog.validate_deck(&deck).is_err());

        let deck = Settings::default().default_deck[..7].to_vec();
        assert!(catalog.validate_deck(&deck).is_err());
    }

    #[test]
    fn loads_cards_from_json() {
        let json = r#"[
            { "id": "brute", "name": "Brute", "cost": 2,
              "kind": { "type": "troop", "count": 1, "unit": {
                "category": "melee", "max_health": 300, "damage": 40,
                "attack_speed": 1.0, "move_speed": 1.0, "attack_range": 1.0,
                "hitbox_radius": 0.5 } } },
            { "id": "bolt", "name": "Bolt", "cost": 1,
              "kind": { "type": "spell", "radius": 1.0, "damage": 50, "effect_duration": 0.2 } }
        ]"#;
        let catalog = CardCatalog::from_json(json, MAX_ELIXIR).unwrap();
        let CardKind::Troop { unit, count } = &catalog.get("brute").unwrap().kind else {
            panic!("brute should be a troop");
        };
        assert_eq!(*count, 1);
        assert!(unit.hits_ground);
        assert_eq!(unit.targets, vec![TargetTag::Unit, TargetTag::Building]);
        assert!(matches!(
            catalog.get("bolt").unwrap().kind,
            CardKind::Spell(_)
        ));
    }

    #[test]
    fn rejects_invalid_unit_stats() {
        let mut cards = default_cards();
        if let CardKind::Troop { unit, .. } = &mut cards[0].kind {
            unit.max_health = 0.0;
        }
        assert!(matches!(
            CardCatalog::new(cards, MAX_ELIXIR),
            Err(ConfigError::InvalidCard { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut cards = default_cards();
        cards.push(cards[0].clone());
        assert!(CardCatalog::new(cards, MAX_ELIXIR).is_err());
    }

    #[test]
    fn building_only_units() {
        let catalog = CardCatalog::default();
        let CardKind::Troop { unit, .. } = &catalog.get("giant").unwrap().kind else {
            panic!("giant should be a troop");
        };
        assert!(unit.building_only());
        let CardKind::Building { unit } = &catalog.get("cannon").unwrap().kind else {
            panic!("cannon should be a building");
        };
        assert!(unit.holds_position());
    }
}
