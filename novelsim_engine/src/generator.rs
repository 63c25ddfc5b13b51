//! Procedural story generation.
//!
//! A run builds the world first ([`entities`]), places and connects its locations
//! ([`layout`], [`graph`]) and then plans the node graph: a main sequence that opens at
//! `start`, choice nodes spliced into that sequence, and ending nodes after it. Every random
//! decision draws from one `StdRng` owned by the run, so a fixed seed reproduces the same
//! story byte for byte.
//!
//! Automatic nodes (condition, item, variable, random) only ever link forward along the
//! sequence or to a node that waits for the player, so a generated story can't trap the
//! engine in an automatic loop.

pub mod config;
pub mod entities;
pub mod equipment;
pub mod graph;
pub mod layout;
pub mod templates;

use std::collections::BTreeMap;

use log::{debug, info, warn};
use novelsim_data::{
    CharacterStats, ChoiceOption, Connection, Effect, EndingRewards, EndingType, EquipSlot, GameState, Id,
    ItemActionType, ItemGrant, ItemInstance, NodeContent, NodePosition, NodeType, RandomBranch, Story, StoryNode,
    VariableOperation, validate_story,
};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::names::NameProvider;
use crate::{effect, expression, idgen};
use config::GeneratorConfig;
use entities::{GOLD_KEY_ID, POTION_ID, World};
use layout::{CANVAS_HEIGHT, CANVAS_WIDTH};
use templates::{CONDITION_POOL, STORY_VARIABLES, ThemeText};

pub const START_NODE_ID: &str = "start";
/// Story variable holding the seed a story was generated from.
pub const SEED_VARIABLE: &str = "generator_seed";
const AUTHOR: &str = "NovelSim Generator";

/// Chance that an option past the first gets a guard.
const GUARD_PROBABILITY: f64 = 0.3;
/// Chance that an option carries an effect.
const EFFECT_PROBABILITY: f64 = 0.4;
/// Chance that a "give" item node hands out rolled equipment instead of a stock item.
const LOOT_PROBABILITY: f64 = 0.5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("invalid generator config: {0}")]
    InvalidConfig(String),
    #[error("generated story failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Generate a complete story from `config`.
///
/// The seed is `config.seed`, or a fresh one from the OS; either way it is recorded in the
/// story's `generator_seed` variable.
///
/// # Errors
/// Returns [`GeneratorError::InvalidConfig`] for inconsistent settings and
/// [`GeneratorError::Validation`] if the finished story doesn't pass [`verify_story`].
pub fn generate_story(config: &GeneratorConfig, names: &NameProvider) -> Result<Story, GeneratorError> {
    config.validate()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    info!("generating a {} story with seed {seed}", config.theme.label());
    let mut rng = StdRng::seed_from_u64(seed);

    let mut world = entities::generate_world(config, names, &mut rng);
    layout::place_locations(&mut world.locations, &mut rng);
    graph::connect_locations(&mut world.locations, &mut rng);
    entities::place_residents(&mut world, &mut rng);

    let (spine, ending_count) = plan_spine(config, &mut rng);
    let story = StoryBuilder {
        config,
        names,
        text: templates::theme_text(config.theme),
        rng,
        seed,
        world,
        spine,
        ending_count,
        endings: Vec::new(),
        instances: BTreeMap::new(),
    }
    .build();

    verify_story(&story)?;
    info!(
        "generated story '{}' with {} nodes, {} enemies and {} locations",
        story.id,
        story.nodes.len(),
        story.enemies.len(),
        story.locations.len()
    );
    Ok(story)
}

/// Post-generation checks: structural validation, every condition and guard parses, every
/// option effect applies to a fresh state, and the location graph is connected.
///
/// # Errors
/// Returns [`GeneratorError::Validation`] listing every problem found.
pub fn verify_story(story: &Story) -> Result<(), GeneratorError> {
    let mut problems: Vec<String> = validate_story(story).iter().map(ToString::to_string).collect();
    let mut scratch = GameState::for_story(story);

    for node in story.nodes.values() {
        match &node.content {
            NodeContent::Condition { expression: condition, .. } if !expression::is_well_formed(condition) => {
                problems.push(format!("node '{}' has malformed condition '{condition}'", node.id));
            },
            NodeContent::Choice { options, .. } => {
                for option in options {
                    if let Some(guard) = &option.condition
                        && !expression::is_well_formed(guard)
                    {
                        problems.push(format!("option '{}' has malformed guard '{guard}'", option.id));
                    }
                    for effect in &option.effects {
                        effect::apply_effect_in_place(&mut scratch, effect, story);
                    }
                }
            },
            _ => {},
        }
    }

    if !graph::is_connected(&story.locations) {
        problems.push("location graph is not connected".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        warn!("story '{}' failed {} generation checks", story.id, problems.len());
        Err(GeneratorError::Validation(problems))
    }
}

/// Index of the enemy a battle at `progress` (0..1 through the main sequence) draws from a
/// list of `count` enemies sorted weakest first.
pub fn enemy_index(progress: f64, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let index = (progress.clamp(0.0, 1.0) * (count - 1) as f64) as usize;
    index.min(count - 1)
}

/// A node position in the planned reading order.
#[derive(Debug, Clone)]
struct Planned {
    id: Id,
    node_type: NodeType,
    /// Position of the node (or of the main node a choice follows) in the main sequence, 0..1.
    progress: f64,
    /// Index among nodes of the same role (main node or choice).
    ordinal: usize,
}

/// Roll node counts and types and splice the choices into the main sequence. Also returns
/// the number of endings to create.
fn plan_spine(config: &GeneratorConfig, rng: &mut StdRng) -> (Vec<Planned>, usize) {
    let node_count = rng.random_range(config.min_nodes..=config.max_nodes);
    let choice_count = rng.random_range(config.min_choices..=config.max_choices);
    let ending_count = if config.generate_ending {
        rng.random_range(config.min_endings..=config.max_endings)
    } else {
        0
    };
    let main_count = node_count.saturating_sub(choice_count + ending_count).max(1);
    debug!("planning {main_count} main nodes, {choice_count} choices and {ending_count} endings");

    let mut after: Vec<Vec<usize>> = vec![Vec::new(); main_count];
    for j in 0..choice_count {
        let position = ((j + 1) * main_count / (choice_count + 1)).min(main_count - 1);
        after[position].push(j);
    }

    let mut spine = Vec::with_capacity(main_count + choice_count);
    for (i, choices) in after.iter().enumerate() {
        let progress = i as f64 / main_count as f64;
        let (id, node_type) = if i == 0 {
            (START_NODE_ID.to_string(), NodeType::Dialogue)
        } else {
            (format!("node_{i}"), roll_node_type(config, rng))
        };
        spine.push(Planned {
            id,
            node_type,
            progress,
            ordinal: i,
        });
        for &j in choices {
            spine.push(Planned {
                id: format!("choice_{}", j + 1),
                node_type: NodeType::Choice,
                progress,
                ordinal: j,
            });
        }
    }
    (spine, ending_count)
}

fn roll_node_type(config: &GeneratorConfig, rng: &mut StdRng) -> NodeType {
    let table = [
        (config.battle_probability, NodeType::Battle),
        (config.condition_probability, NodeType::Condition),
        (config.item_probability, NodeType::Item),
        (config.variable_probability, NodeType::Variable),
        (config.random_node_probability, NodeType::Random),
    ];
    table
        .into_iter()
        .find(|(p, _)| rng.random_bool(*p))
        .map_or(NodeType::Dialogue, |(_, node_type)| node_type)
}

struct StoryBuilder<'a> {
    config: &'a GeneratorConfig,
    names: &'a NameProvider,
    text: &'static ThemeText,
    rng: StdRng,
    seed: u64,
    world: World,
    /// Main nodes and choices in reading order.
    spine: Vec<Planned>,
    ending_count: usize,
    endings: Vec<(Id, EndingType)>,
    instances: BTreeMap<Id, ItemInstance>,
}

impl StoryBuilder<'_> {
    fn build(mut self) -> Story {
        let ending_nodes = self.ending_nodes();
        let mut nodes: Vec<StoryNode> = (0..self.spine.len()).map(|pos| self.spine_node(pos)).collect();
        nodes.extend(ending_nodes);
        let node_locations = self.place_nodes(&mut nodes);

        let title = if self.config.title.trim().is_empty() {
            format!("Tales of {}", self.names.place_name(&mut self.rng))
        } else {
            self.config.title.clone()
        };
        let mut variables = std::mem::take(&mut self.world.variables);
        variables.insert(SEED_VARIABLE.to_string(), self.seed.to_string());
        let world = self.world;

        Story {
            id: format!("story_{}", self.seed),
            title,
            author: AUTHOR.to_string(),
            description: format!("A generated {} story.", self.config.theme.label()),
            version: "1.0.0".to_string(),
            start_node_id: START_NODE_ID.to_string(),
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            variables,
            items: world.items,
            item_instances: self.instances,
            enemies: world.enemies,
            skills: world.skills,
            characters: world.characters,
            locations: world.locations,
            factions: world.factions,
            clues: world.clues,
            events: world.events,
            node_locations,
            interactions: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn ending_nodes(&mut self) -> Vec<StoryNode> {
        let count = self.ending_count;
        let table = self.text.endings;
        if count == 0 || table.is_empty() {
            return Vec::new();
        }
        let offset = self.rng.random_range(0..table.len());
        let factor = self.config.difficulty_factor();
        (0..count)
            .map(|k| {
                let (title, description, ending_type) = table[(offset + k) % table.len()];
                let id = format!("ending_{}", k + 1);
                self.endings.push((id.clone(), ending_type));
                StoryNode::new(
                    id,
                    NodeContent::Ending {
                        title: title.to_string(),
                        description: description.to_string(),
                        ending_type,
                        rewards: ending_rewards(ending_type, factor),
                    },
                )
            })
            .collect()
    }

    fn spine_node(&mut self, pos: usize) -> StoryNode {
        let content = match self.spine[pos].node_type {
            NodeType::Choice => self.choice_content(pos),
            NodeType::Condition => NodeContent::Condition {
                expression: self.pick(CONDITION_POOL).to_string(),
                true_next_node_id: self.link(pos),
                false_next_node_id: self.alternative(pos),
            },
            NodeType::Battle => self.battle_content(pos),
            NodeType::Item => self.item_content(pos),
            NodeType::Variable => self.variable_content(pos),
            NodeType::Random => self.random_content(pos),
            NodeType::Dialogue | NodeType::End => self.dialogue_content(pos),
        };
        let connections = connections_for(&content);
        StoryNode::new(self.spine[pos].id.clone(), content).with_connections(connections)
    }

    fn dialogue_content(&mut self, pos: usize) -> NodeContent {
        let (speaker, text) = if pos == 0 {
            ("", self.text.opening)
        } else {
            self.text.lines.choose(&mut self.rng).copied().unwrap_or(("", self.text.opening))
        };
        NodeContent::Dialogue {
            speaker: (!speaker.is_empty()).then(|| speaker.to_string()),
            text: text.to_string(),
            next_node_id: self.link(pos),
        }
    }

    /// Options spread out: the first continues the sequence, odd ones lead to endings and
    /// the rest skip ahead by their index.
    fn choice_content(&mut self, pos: usize) -> NodeContent {
        let own_id = self.spine[pos].id.clone();
        let ordinal = self.spine[pos].ordinal;
        let option_count = self
            .rng
            .random_range(self.config.min_options..=self.config.max_options)
            .max(1);
        let mut labels = self.text.options.to_vec();
        labels.shuffle(&mut self.rng);

        let mut options = Vec::with_capacity(option_count);
        for k in 0..option_count {
            let next_node_id = if k == 0 {
                self.link(pos)
            } else if k % 2 == 1 && !self.endings.is_empty() {
                self.endings[(ordinal + k / 2) % self.endings.len()].0.clone()
            } else {
                let target = &self.spine[(pos + 1 + k) % self.spine.len()].id;
                if *target == own_id { self.successor(pos) } else { target.clone() }
            };
            let condition = if k > 0 && self.rng.random_bool(GUARD_PROBABILITY) {
                Some(self.pick(CONDITION_POOL).to_string())
            } else {
                None
            };
            options.push(ChoiceOption {
                id: format!("{own_id}_opt_{}", k + 1),
                text: labels.get(k % labels.len().max(1)).copied().unwrap_or("Continue").to_string(),
                next_node_id,
                condition,
                effects: self.option_effects(),
            });
        }
        NodeContent::Choice {
            prompt: self.pick(self.text.prompts).to_string(),
            options,
        }
    }

    fn option_effects(&mut self) -> Vec<Effect> {
        if !self.rng.random_bool(EFFECT_PROBABILITY) {
            return Vec::new();
        }
        let delta = self.rng.random_range(-10..=10);
        let effect = match self.rng.random_range(0..8) {
            0 => Some(Effect::ModifyVariable {
                variable_name: self.pick(STORY_VARIABLES).to_string(),
                operation: VariableOperation::Add,
                value: self.rng.random_range(1..=10).to_string(),
            }),
            1 => self.world.factions.choose(&mut self.rng).map(|f| Effect::ModifyReputation {
                faction_id: f.id.clone(),
                delta,
            }),
            2 => self.world.characters.choose(&mut self.rng).map(|c| Effect::ModifyRelationship {
                character_id: c.id.clone(),
                delta,
            }),
            3 => self
                .world
                .clues
                .choose(&mut self.rng)
                .map(|c| Effect::AddClue { clue_id: c.id.clone() }),
            4 => self.world.locations.choose(&mut self.rng).map(|l| Effect::MoveToLocation {
                location_id: l.id.clone(),
            }),
            5 => self
                .world
                .events
                .choose(&mut self.rng)
                .map(|e| Effect::TriggerEvent { event_id: e.id.clone() }),
            6 => Some(Effect::GiveItem {
                item_id: POTION_ID.to_string(),
                quantity: 1,
            }),
            _ => Some(Effect::SetFlag {
                flag: "boss_defeated".to_string(),
            }),
        };
        effect.into_iter().collect()
    }

    /// Enemies come sorted weakest first, so early battles draw early entries. A world
    /// without enemies gets inline stats that grow along the sequence.
    fn battle_content(&mut self, pos: usize) -> NodeContent {
        let progress = self.spine[pos].progress;
        let win_next_node_id = self.link(pos);
        let lose_next_node_id = self
            .endings
            .iter()
            .find(|(_, ending_type)| *ending_type == EndingType::Bad)
            .map_or_else(|| self.successor(pos), |(id, _)| id.clone());

        if self.world.enemies.is_empty() {
            let factor = self.config.difficulty_factor() * (1.0 + progress);
            let mut stats = CharacterStats::default();
            stats.set_max_hp((50.0 * factor) as i32);
            stats.set_current_hp(stats.max_hp());
            stats.set_attack(((8.0 * factor) as i32).max(1));
            stats.set_defense((3.0 * factor) as i32);
            stats.set_speed(8);
            return NodeContent::Battle {
                enemy_id: String::new(),
                enemy_name: Some(self.names.enemy_name(&mut self.rng)),
                enemy_stats: Some(stats),
                win_next_node_id,
                lose_next_node_id,
            };
        }

        let index = enemy_index(progress, self.world.enemies.len());
        NodeContent::Battle {
            enemy_id: self.world.enemies[index].id.clone(),
            enemy_name: None,
            enemy_stats: None,
            win_next_node_id,
            lose_next_node_id,
        }
    }

    /// Give 60%, remove 20%, check 20%. Half of the gives hand out a rolled equipment
    /// instance whose level grows with progress and difficulty.
    fn item_content(&mut self, pos: usize) -> NodeContent {
        let progress = self.spine[pos].progress;
        let next_node_id = self.link(pos);
        let roll = self.rng.random_range(0..100);
        let (action, item_id, quantity) = if roll < 60 {
            match self.roll_loot(pos, progress) {
                Some(uid) => (ItemActionType::Give, uid, 1),
                None => (ItemActionType::Give, self.stock_item(), self.rng.random_range(1..=3)),
            }
        } else if roll < 80 {
            (ItemActionType::Remove, self.stock_item(), self.rng.random_range(1..=3))
        } else {
            (ItemActionType::Check, self.stock_item(), 1)
        };
        NodeContent::ItemAction {
            item_id,
            quantity,
            action,
            next_node_id,
        }
    }

    fn roll_loot(&mut self, pos: usize, progress: f64) -> Option<Id> {
        if !self.rng.random_bool(LOOT_PROBABILITY) {
            return None;
        }
        let slot = *EquipSlot::ALL.choose(&mut self.rng)?;
        let template_id = equipment::template_id(slot);
        let template = self.world.items.iter().find(|i| i.id == template_id)?;
        let level = 1 + (progress * 10.0 * self.config.difficulty_factor()) as i32;
        let uid = idgen::generated_instance_uid(self.seed, &self.spine[pos].id);
        let instance = equipment::roll_instance(template, uid.clone(), level, &mut self.rng);
        debug!("rolled {:?} '{}' for node '{}'", instance.rarity, instance.name, self.spine[pos].id);
        self.instances.insert(uid.clone(), instance);
        Some(uid)
    }

    fn stock_item(&mut self) -> Id {
        let ids = self.world.stock_item_ids();
        ids.choose(&mut self.rng).copied().unwrap_or(GOLD_KEY_ID).to_string()
    }

    fn variable_content(&mut self, pos: usize) -> NodeContent {
        let next_node_id = self.link(pos);
        let names: Vec<&String> = self.world.variables.keys().collect();
        let variable_name = names
            .choose(&mut self.rng)
            .map_or_else(|| STORY_VARIABLES[0].to_string(), |name| (*name).clone());
        let (operation, value) = match self.rng.random_range(0..3) {
            0 => (VariableOperation::Set, self.rng.random_range(0..=100)),
            1 => (VariableOperation::Add, self.rng.random_range(1..=10)),
            _ => (VariableOperation::Subtract, self.rng.random_range(1..=10)),
        };
        NodeContent::VariableAction {
            variable_name,
            operation,
            value: value.to_string(),
            next_node_id,
        }
    }

    fn random_content(&mut self, pos: usize) -> NodeContent {
        let count = self.rng.random_range(2..=3);
        let mut branches = Vec::with_capacity(count);
        for k in 0..count {
            let next_node_id = if k == 0 { self.link(pos) } else { self.alternative(pos) };
            branches.push(RandomBranch {
                next_node_id,
                weight: self.rng.random_range(1..=5),
            });
        }
        NodeContent::Random { branches }
    }

    /// Give every node a canvas position, top to bottom in reading order, and map it to
    /// the nearest location.
    fn place_nodes(&mut self, nodes: &mut [StoryNode]) -> BTreeMap<Id, Id> {
        let total = nodes.len().max(1) as f32;
        let spread = CANVAS_WIDTH / 3.0;
        let mut node_locations = BTreeMap::new();
        for (i, node) in nodes.iter_mut().enumerate() {
            let x = CANVAS_WIDTH / 2.0 + self.rng.random_range(-spread..=spread);
            let y = (i as f32 + 0.5) * CANVAS_HEIGHT / total;
            node.position = NodePosition::new(x, y);
            if let Some(location) = graph::nearest_location(&self.world.locations, x, y) {
                node_locations.insert(node.id.clone(), location.id.clone());
            }
        }
        node_locations
    }

    /// Where the sequence goes after `pos`: the next planned node, else the first ending,
    /// else back to the start.
    fn successor(&self, pos: usize) -> Id {
        self.spine
            .get(pos + 1)
            .map(|p| p.id.clone())
            .or_else(|| self.endings.first().map(|(id, _)| id.clone()))
            .unwrap_or_else(|| START_NODE_ID.to_string())
    }

    /// Targets a link out of `pos` may jump to. Automatic nodes only jump forward or to a
    /// node that waits for the player.
    fn eligible(&self, pos: usize) -> Vec<Id> {
        let automatic = self.spine[pos].node_type.is_auto_advancing();
        let mut targets: Vec<Id> = self
            .spine
            .iter()
            .enumerate()
            .filter(|(j, p)| *j != pos && (!automatic || *j > pos || !p.node_type.is_auto_advancing()))
            .map(|(_, p)| p.id.clone())
            .collect();
        targets.extend(self.endings.iter().map(|(id, _)| id.clone()));
        targets
    }

    /// The sequential link out of `pos`, replaced by a random jump with probability `chaos`.
    fn link(&mut self, pos: usize) -> Id {
        if self.rng.random_bool(self.config.chaos) {
            self.alternative(pos)
        } else {
            self.successor(pos)
        }
    }

    /// A random eligible target, or the successor when there is none.
    fn alternative(&mut self, pos: usize) -> Id {
        let targets = self.eligible(pos);
        targets
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| self.successor(pos))
    }

    fn pick(&mut self, pool: &'static [&'static str]) -> &'static str {
        pool.choose(&mut self.rng).copied().unwrap_or_default()
    }
}

/// Rewards by ending type, before the difficulty factor.
fn ending_rewards(ending_type: EndingType, factor: f64) -> EndingRewards {
    let scale = |amount: f64| (amount * factor) as i32;
    match ending_type {
        EndingType::Good => EndingRewards {
            exp: scale(50.0),
            gold: scale(30.0),
            items: vec![ItemGrant {
                item_id: POTION_ID.to_string(),
                quantity: 2,
            }],
        },
        EndingType::Secret => EndingRewards {
            exp: scale(80.0),
            gold: scale(50.0),
            items: vec![ItemGrant {
                item_id: GOLD_KEY_ID.to_string(),
                quantity: 1,
            }],
        },
        EndingType::Normal => EndingRewards {
            exp: scale(20.0),
            gold: scale(10.0),
            items: Vec::new(),
        },
        EndingType::Bad => EndingRewards::default(),
    }
}

/// Labelled connections mirroring every target the content names.
fn connections_for(content: &NodeContent) -> Vec<Connection> {
    match content {
        NodeContent::Dialogue { next_node_id, .. }
        | NodeContent::ItemAction { next_node_id, .. }
        | NodeContent::VariableAction { next_node_id, .. } => vec![Connection::to(next_node_id.clone())],
        NodeContent::Choice { options, .. } => options
            .iter()
            .map(|o| Connection::labelled(o.next_node_id.clone(), o.text.clone()))
            .collect(),
        NodeContent::Condition {
            true_next_node_id,
            false_next_node_id,
            ..
        } => vec![
            Connection::labelled(true_next_node_id.clone(), "true"),
            Connection::labelled(false_next_node_id.clone(), "false"),
        ],
        NodeContent::Battle {
            win_next_node_id,
            lose_next_node_id,
            ..
        } => vec![
            Connection::labelled(win_next_node_id.clone(), "win"),
            Connection::labelled(lose_next_node_id.clone(), "lose"),
        ],
        NodeContent::Random { branches } => branches
            .iter()
            .map(|b| Connection::labelled(b.next_node_id.clone(), format!("weight {}", b.weight)))
            .collect(),
        NodeContent::Ending { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn seeded(seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            seed: Some(seed),
            ..GeneratorConfig::default()
        }
    }

    fn generate(config: &GeneratorConfig) -> Story {
        generate_story(config, &NameProvider::builtin()).unwrap()
    }

    /// True if following only automatic nodes can never revisit a node.
    fn automatic_paths_terminate(story: &Story) -> bool {
        fn visit<'a>(
            story: &'a Story,
            id: &'a str,
            path: &mut BTreeSet<&'a str>,
            done: &mut BTreeSet<&'a str>,
        ) -> bool {
            let Some(node) = story.node(id) else {
                return true;
            };
            if !node.node_type.is_auto_advancing() || done.contains(id) {
                return true;
            }
            if !path.insert(id) {
                return false;
            }
            let ok = node
                .content
                .next_node_ids()
                .into_iter()
                .all(|next| visit(story, next, path, done));
            path.remove(id);
            done.insert(id);
            ok
        }
        let mut done = BTreeSet::new();
        story
            .nodes
            .keys()
            .all(|id| visit(story, id, &mut BTreeSet::new(), &mut done))
    }

    #[test]
    fn default_config_produces_a_valid_story() {
        for seed in 0..25 {
            let story = generate(&seeded(seed));
            assert!(verify_story(&story).is_ok());
            assert_eq!(story.start_node_id, START_NODE_ID);
            assert_eq!(story.variables[SEED_VARIABLE], seed.to_string());
            assert!((5..=15).contains(&story.nodes.len()), "{} nodes", story.nodes.len());
            assert_eq!(story.node_locations.len(), story.nodes.len());
        }
    }

    #[test]
    fn same_seed_same_story() {
        let config = seeded(77);
        assert_eq!(generate(&config), generate(&config));
        assert_ne!(generate(&config), generate(&seeded(78)));
    }

    #[test]
    fn automatic_nodes_never_loop() {
        let config = GeneratorConfig {
            min_nodes: 30,
            max_nodes: 40,
            condition_probability: 0.3,
            item_probability: 0.3,
            variable_probability: 0.3,
            random_node_probability: 0.5,
            chaos: 0.8,
            ..GeneratorConfig::default()
        };
        for seed in 0..20 {
            let story = generate(&GeneratorConfig {
                seed: Some(seed),
                ..config.clone()
            });
            assert!(automatic_paths_terminate(&story), "seed {seed}");
        }
    }

    #[test]
    fn infinite_mode_has_no_endings() {
        let config = GeneratorConfig {
            generate_ending: false,
            seed: Some(5),
            ..GeneratorConfig::default()
        };
        let story = generate(&config);
        assert!(story.nodes.values().all(|n| n.node_type != NodeType::End));
        assert!(story.nodes.values().all(|n| !n.referenced_node_ids().is_empty()));
    }

    #[test]
    fn choices_and_endings_are_present() {
        let config = GeneratorConfig {
            min_nodes: 20,
            max_nodes: 20,
            min_choices: 3,
            max_choices: 3,
            min_endings: 2,
            max_endings: 2,
            seed: Some(12),
            ..GeneratorConfig::default()
        };
        let story = generate(&config);
        assert_eq!(story.nodes.len(), 20);
        let count = |ty: NodeType| story.nodes.values().filter(|n| n.node_type == ty).count();
        assert_eq!(count(NodeType::Choice), 3);
        assert_eq!(count(NodeType::End), 2);
        for node in story.nodes.values() {
            if let NodeContent::Choice { options, .. } = &node.content {
                assert!(options[0].condition.is_none());
                assert_eq!(node.connections.len(), options.len());
            }
        }
    }

    #[test]
    fn battles_draw_from_sorted_enemies() {
        let config = GeneratorConfig {
            min_nodes: 30,
            max_nodes: 30,
            battle_probability: 1.0,
            seed: Some(3),
            ..GeneratorConfig::default()
        };
        let story = generate(&config);
        let battles: Vec<&StoryNode> = story.nodes.values().filter(|n| n.node_type == NodeType::Battle).collect();
        assert!(!battles.is_empty());
        for node in battles {
            let NodeContent::Battle { enemy_id, .. } = &node.content else {
                unreachable!()
            };
            assert!(story.enemy(enemy_id).is_some());
        }
    }

    #[test]
    fn enemyless_worlds_use_inline_stats() {
        let config = GeneratorConfig {
            min_nodes: 20,
            max_nodes: 20,
            battle_probability: 1.0,
            rules: Vec::new(),
            seed: Some(8),
            ..GeneratorConfig::default()
        };
        let story = generate(&config);
        assert!(story.enemies.is_empty());
        assert!(story.nodes.values().any(|n| matches!(
            &n.content,
            NodeContent::Battle { enemy_stats: Some(stats), enemy_name: Some(_), .. } if stats.max_hp() > 0
        )));
    }

    #[test]
    fn enemy_index_tracks_progress() {
        assert_eq!(enemy_index(0.0, 5), 0);
        assert_eq!(enemy_index(0.5, 5), 2);
        assert_eq!(enemy_index(0.99, 5), 3);
        assert_eq!(enemy_index(1.0, 5), 4);
        assert_eq!(enemy_index(0.7, 0), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GeneratorConfig {
            min_choices: 4,
            max_choices: 1,
            ..GeneratorConfig::default()
        };
        let err = generate_story(&config, &NameProvider::builtin()).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidConfig(_)));
    }

    #[test]
    fn verification_reports_broken_stories() {
        let mut story = generate(&seeded(1));
        story.insert_node(StoryNode::new(
            "broken",
            NodeContent::Condition {
                expression: "???".into(),
                true_next_node_id: "nowhere".into(),
                false_next_node_id: String::new(),
            },
        ));
        let Err(GeneratorError::Validation(problems)) = verify_story(&story) else {
            panic!("expected validation problems");
        };
        assert!(problems.iter().any(|p| p.contains("malformed condition")));
        assert!(problems.iter().any(|p| p.contains("nowhere")));
    }

    #[test]
    fn loot_nodes_reference_rolled_instances() {
        let config = GeneratorConfig {
            min_nodes: 40,
            max_nodes: 40,
            item_probability: 1.0,
            battle_probability: 0.0,
            condition_probability: 0.0,
            seed: Some(4),
            ..GeneratorConfig::default()
        };
        let story = generate(&config);
        assert!(!story.item_instances.is_empty());
        for (uid, instance) in &story.item_instances {
            assert_eq!(uid, &instance.uid);
            assert!(story.item(&instance.template_id).is_some());
        }
    }
}
