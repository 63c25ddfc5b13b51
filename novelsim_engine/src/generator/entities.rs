//! World entity generation.
//!
//! Every story gets a few fixed items that generated nodes refer to (a healing potion, an
//! ether, the golden key used by the stock conditions and one gear template per equipment
//! slot). Everything else comes from the config's entity rules.

use std::collections::BTreeMap;

use log::debug;
use novelsim_data::{
    Character, CharacterStats, Clue, EnemyDrop, Enemy, Faction, GameEvent, Gender, Item, ItemEffect, ItemType,
    Location, Skill, SkillEffect,
};
use rand::{Rng, RngCore};

use super::config::{EntityKind, EntityRule, GeneratorConfig, NamingStyle, StatRange};
use super::equipment;
use super::templates::STORY_VARIABLES;
use crate::names::NameProvider;

pub const POTION_ID: &str = "potion_hp";
pub const ETHER_ID: &str = "ether";
pub const GOLD_KEY_ID: &str = "key_gold";

/// Everything a generated story refers to besides its nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    pub items: Vec<Item>,
    pub enemies: Vec<Enemy>,
    pub skills: Vec<Skill>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub factions: Vec<Faction>,
    pub clues: Vec<Clue>,
    pub events: Vec<GameEvent>,
    pub variables: BTreeMap<String, String>,
}
impl World {
    /// Items a generated item node may hand out or check for.
    pub fn stock_item_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.item_type != ItemType::Equipment)
            .map(|i| i.id.as_str())
            .collect()
    }
}

/// Default ranges for rolled combat stats, before difficulty scaling.
const ENEMY_RANGES: [(&str, StatRange); 5] = [
    ("maxHp", StatRange::new(40, 90)),
    ("attack", StatRange::new(6, 14)),
    ("defense", StatRange::new(2, 6)),
    ("speed", StatRange::new(6, 14)),
    ("luck", StatRange::new(1, 8)),
];

const CHARACTER_RANGES: [(&str, StatRange); 5] = [
    ("maxHp", StatRange::new(80, 140)),
    ("attack", StatRange::new(8, 16)),
    ("defense", StatRange::new(4, 9)),
    ("speed", StatRange::new(8, 14)),
    ("luck", StatRange::new(3, 10)),
];

/// Stats that grow with difficulty.
const SCALED_STATS: [&str; 3] = ["maxHp", "attack", "defense"];

/// Build the world for a run. Factions are generated before characters so characters can
/// belong to one; enemies come back sorted from weakest to strongest.
pub fn generate_world(config: &GeneratorConfig, names: &NameProvider, rng: &mut dyn RngCore) -> World {
    let mut world = World::default();
    world.items.extend(stock_items());
    world.items.extend(equipment::base_templates(names, rng));
    for var in STORY_VARIABLES {
        world.variables.insert((*var).to_string(), "0".to_string());
    }

    let order = [
        EntityKind::Faction,
        EntityKind::Location,
        EntityKind::Character,
        EntityKind::Item,
        EntityKind::Skill,
        EntityKind::Enemy,
        EntityKind::Clue,
        EntityKind::Event,
        EntityKind::Variable,
    ];
    for kind in order {
        for rule in config.rules.iter().filter(|r| r.kind == kind) {
            for _ in 0..rule.count {
                add_entity(&mut world, rule, config, names, rng);
            }
        }
    }

    world.enemies.sort_by(|a, b| {
        a.strength_score()
            .cmp(&b.strength_score())
            .then_with(|| a.id.cmp(&b.id))
    });
    debug!(
        "generated world: {} items, {} enemies, {} characters, {} locations, {} factions",
        world.items.len(),
        world.enemies.len(),
        world.characters.len(),
        world.locations.len(),
        world.factions.len()
    );
    world
}

/// Scatter characters and rule-generated items over the locations so free-roaming play has
/// someone to talk to and something to pick up. Stock items and gear stay out of the world.
pub fn place_residents(world: &mut World, rng: &mut dyn RngCore) {
    if world.locations.is_empty() {
        return;
    }
    let count = world.locations.len();
    for character in &world.characters {
        let at = rng.random_range(0..count);
        world.locations[at].npcs.push(character.id.clone());
    }
    for item in world.items.iter().filter(|i| i.id.starts_with("item_")) {
        let at = rng.random_range(0..count);
        world.locations[at].items.push(item.id.clone());
    }
}

fn add_entity(
    world: &mut World,
    rule: &EntityRule,
    config: &GeneratorConfig,
    names: &NameProvider,
    rng: &mut dyn RngCore,
) {
    let variables = custom_attributes(rule, rng);

    match rule.kind {
        EntityKind::Faction => {
            let n = world.factions.len() + 1;
            world.factions.push(Faction {
                id: format!("faction_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.faction_name(rng)),
                description: "A power with its own agenda.".into(),
                variables,
            });
        },
        EntityKind::Location => {
            let n = world.locations.len() + 1;
            world.locations.push(Location {
                id: format!("loc_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.place_name(rng)),
                description: String::new(),
                variables,
                ..Location::default()
            });
        },
        EntityKind::Character => {
            let n = world.characters.len() + 1;
            let gender = if rng.random_bool(0.5) { Gender::Male } else { Gender::Female };
            let chinese = match config.naming_style {
                NamingStyle::Chinese => true,
                NamingStyle::Western => false,
                NamingStyle::Mixed => rng.random_bool(0.5),
            };
            let name = overridden_name(rule, names, rng).unwrap_or_else(|| {
                if chinese {
                    names.chinese_name(gender, rng)
                } else {
                    names.western_name(gender, rng)
                }
            });
            let stats = roll_stats(&CHARACTER_RANGES, rule, config.difficulty_factor(), rng);
            let faction_id = if world.factions.is_empty() || rng.random_bool(0.3) {
                None
            } else {
                Some(world.factions[rng.random_range(0..world.factions.len())].id.clone())
            };
            world.characters.push(Character {
                id: format!("char_{n}"),
                name,
                description: String::new(),
                gender,
                stats,
                faction_id,
                variables,
            });
        },
        EntityKind::Item => {
            let n = world.items.iter().filter(|i| i.id.starts_with("item_")).count() + 1;
            let (kind, item_type, effect) = if rng.random_bool(0.5) {
                let effect = if rng.random_bool(0.7) {
                    ItemEffect::Heal {
                        hp: rng.random_range(20..=60),
                        mp: 0,
                    }
                } else {
                    ItemEffect::Buff {
                        attribute: "attack".into(),
                        value: rng.random_range(2..=5),
                        duration: 3,
                    }
                };
                ("consumable", ItemType::Consumable, Some(effect))
            } else {
                ("material", ItemType::Material, None)
            };
            let price = rule
                .stat_ranges
                .get("price")
                .map(|range| range.roll(rng))
                .unwrap_or_else(|| rng.random_range(5..=40));
            world.items.push(Item {
                id: format!("item_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.item_name(kind, rng)),
                description: String::new(),
                item_type,
                effect,
                price,
                variables,
                ..Item::default()
            });
        },
        EntityKind::Skill => {
            let n = world.skills.len() + 1;
            let effect = match world.skills.len() % 3 {
                0 => SkillEffect::Damage {
                    multiplier: 1.5,
                    element: Some("arcane".into()),
                },
                1 => SkillEffect::Heal {
                    amount: 30,
                    is_percentage: true,
                },
                _ => SkillEffect::StatusEffect {
                    status: if rng.random_bool(0.5) { "stun" } else { "poison" }.into(),
                    duration: 2,
                    chance: 0.6,
                },
            };
            world.skills.push(Skill {
                id: format!("skill_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.skill_name(rng)),
                description: String::new(),
                mp_cost: rng.random_range(5..=15),
                effect: Some(effect),
            });
        },
        EntityKind::Enemy => {
            let n = world.enemies.len() + 1;
            let factor = config.difficulty_factor();
            let stats = roll_stats(&ENEMY_RANGES, rule, factor, rng);
            let mut enemy = Enemy {
                id: format!("enemy_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.enemy_name(rng)),
                description: String::new(),
                stats,
                variables,
                ..Enemy::default()
            };
            let strength = enemy.strength_score() as f64;
            enemy.exp_reward = ((10.0 + strength / 8.0) * factor) as i32;
            enemy.gold_reward = ((5.0 + strength / 20.0) * factor) as i32;
            if rng.random_bool(0.5) {
                enemy.drops.push(EnemyDrop {
                    item_id: POTION_ID.into(),
                    chance: 0.3,
                    min_quantity: 1,
                    max_quantity: 2,
                });
            }
            if !world.skills.is_empty() && rng.random_bool(0.3) {
                enemy.skills.push(world.skills[rng.random_range(0..world.skills.len())].id.clone());
            }
            world.enemies.push(enemy);
        },
        EntityKind::Clue => {
            let n = world.clues.len() + 1;
            world.clues.push(Clue {
                id: format!("clue_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.generate("clue_name", rng)),
                description: String::new(),
                variables,
            });
        },
        EntityKind::Event => {
            let n = world.events.len() + 1;
            world.events.push(GameEvent {
                id: format!("event_{n}"),
                name: overridden_name(rule, names, rng).unwrap_or_else(|| names.generate("event_name", rng)),
                description: String::new(),
                variables,
            });
        },
        EntityKind::Variable => {
            let n = world.variables.keys().filter(|k| k.starts_with("var_")).count() + 1;
            let initial = rule.stat_ranges.get("initial").map_or(0, |range| range.roll(rng));
            world.variables.insert(format!("var_{n}"), initial.to_string());
        },
    }
}

fn overridden_name(rule: &EntityRule, names: &NameProvider, rng: &mut dyn RngCore) -> Option<String> {
    rule.template_id.as_deref().map(|template| names.generate(template, rng))
}

/// Roll a stat block: rule overrides first, then the default ranges. Max HP, attack and
/// defense are multiplied by the difficulty factor; current HP starts full.
fn roll_stats(
    defaults: &[(&str, StatRange)],
    rule: &EntityRule,
    difficulty_factor: f64,
    rng: &mut dyn RngCore,
) -> CharacterStats {
    let mut stats = CharacterStats::default();
    for (key, range) in defaults {
        let range = rule.stat_ranges.get(*key).copied().unwrap_or(*range);
        stats.set(key, range.roll(rng));
    }
    for (key, range) in &rule.stat_ranges {
        if !defaults.iter().any(|(k, _)| k == key) {
            stats.set(key, range.roll(rng));
        }
    }
    for key in SCALED_STATS {
        let scaled = (f64::from(stats.get(key)) * difficulty_factor) as i32;
        stats.set(key, scaled.max(1));
    }
    stats.set_current_hp(stats.max_hp());
    stats.set_current_mp(stats.max_mp());
    stats
}

fn custom_attributes(rule: &EntityRule, rng: &mut dyn RngCore) -> BTreeMap<String, String> {
    rule.custom_attributes
        .iter()
        .filter(|attr| !attr.name.trim().is_empty())
        .map(|attr| (attr.name.clone(), attr.range().roll(rng).to_string()))
        .collect()
}

fn stock_items() -> Vec<Item> {
    vec![
        Item {
            id: POTION_ID.into(),
            name: "Healing Potion".into(),
            description: "Restores 50 HP.".into(),
            item_type: ItemType::Consumable,
            effect: Some(ItemEffect::Heal { hp: 50, mp: 0 }),
            price: 25,
            ..Item::default()
        },
        Item {
            id: ETHER_ID.into(),
            name: "Ether".into(),
            description: "Restores 30 MP.".into(),
            item_type: ItemType::Consumable,
            effect: Some(ItemEffect::Heal { hp: 0, mp: 30 }),
            price: 40,
            ..Item::default()
        },
        Item {
            id: GOLD_KEY_ID.into(),
            name: "Golden Key".into(),
            description: "It must open something important.".into(),
            item_type: ItemType::KeyItem,
            price: 0,
            ..Item::default()
        },
    ]
}
