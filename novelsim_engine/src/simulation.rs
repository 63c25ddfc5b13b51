//! simulation.rs -- free-roaming interactions with the world around the player.
//!
//! Besides following the node graph, the player can act on whatever shares their current
//! location: the location itself, the characters and items placed there, and enemies.
//! Every object carries built-in interaction rules for its kind, plus any extra rules the
//! story attaches to its id. Rules are guarded by condition expressions and change the
//! game state through [`SimEffect`]s.
//!
//! Results are returned as stand-alone nodes that are not part of the story graph. A menu
//! of everything available is a choice node whose option targets use the
//! `SIM_ACTION:<target>:<rule>` form, see [`action_target`].

use std::cmp::Reverse;

use log::{debug, info};
use novelsim_data::{
    CURRENT_LOCATION_VAR, ChoiceOption, Effect, GLOBAL_TARGET, GameState, InteractionRule, InteractionType, ItemType,
    NodeContent, SimEffect, Story, StoryNode, VariableOperation, entity_variable_key,
};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::effect;
use crate::expression;

pub const SIM_ACTION_PREFIX: &str = "SIM_ACTION:";
pub const MOVE_RULE: &str = "move_to";
/// Speaker shown on interaction results.
pub const NARRATOR: &str = "System";
/// How many destinations are offered from a location without any connections.
const FREE_MOVE_CHOICES: usize = 2;

/// An interaction rule bound to a concrete target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAction {
    pub rule: InteractionRule,
    pub target_id: String,
    pub target_name: String,
}
impl SimAction {
    /// Text with `{target.name}` filled in.
    fn fill(&self, text: &str) -> String {
        text.replace("{target.name}", &self.target_name)
    }
}

/// A world object as the simulation sees it.
struct ObjectDefinition<'a> {
    kind: &'static str,
    id: &'a str,
    name: &'a str,
    rules: Vec<InteractionRule>,
}

/// Option target naming an interaction, `SIM_ACTION:<target>:<rule>`.
pub fn action_target(target_id: &str, rule_id: &str) -> String {
    format!("{SIM_ACTION_PREFIX}{target_id}:{rule_id}")
}

/// Split an option target made by [`action_target`] into target and rule ids.
pub fn parse_action_target(next_node_id: &str) -> Option<(&str, &str)> {
    next_node_id
        .strip_prefix(SIM_ACTION_PREFIX)?
        .rsplit_once(':')
        .filter(|(target, rule)| !target.is_empty() && !rule.is_empty())
}

/// The player's location: the tracked variable, else the current node's location, else the
/// start node's.
pub fn current_location<'a>(story: &'a Story, state: &'a GameState) -> Option<&'a str> {
    state
        .current_location()
        .or_else(|| story.node_locations.get(&state.current_node_id).map(String::as_str))
        .or_else(|| story.node_locations.get(&story.start_node_id).map(String::as_str))
}

/// Everything the player can do at their current location, highest priority first.
pub fn available_interactions(story: &Story, state: &GameState) -> Vec<SimAction> {
    let Some(location) = current_location(story, state).and_then(|id| story.location(id)) else {
        return Vec::new();
    };
    let objects = std::iter::once(&location.id)
        .chain(&location.npcs)
        .chain(&location.items)
        .chain(&location.enemies);

    let mut actions = Vec::new();
    for object_id in objects {
        let Some(definition) = object_definition(story, object_id) else {
            debug!("location '{}' lists unknown object '{object_id}'", location.id);
            continue;
        };
        for rule in definition.rules {
            if rule.id == MOVE_RULE && definition.id == location.id {
                continue;
            }
            if condition_holds(rule.condition.as_deref(), state, definition.kind, definition.id) {
                actions.push(SimAction {
                    rule,
                    target_id: definition.id.to_string(),
                    target_name: definition.name.to_string(),
                });
            }
        }
    }
    actions.sort_by_key(|action| Reverse(action.rule.priority));
    actions
}

/// Look up one action by target and rule. Moving to another location is always possible,
/// even though only the current location's objects are listed as interactions.
pub fn find_action(story: &Story, state: &GameState, target_id: &str, rule_id: &str) -> Option<SimAction> {
    if let Some(action) = available_interactions(story, state)
        .into_iter()
        .find(|action| action.target_id == target_id && action.rule.id == rule_id)
    {
        return Some(action);
    }
    if rule_id != MOVE_RULE || current_location(story, state) == Some(target_id) {
        return None;
    }
    let location = story.location(target_id)?;
    let rule = location_rules(&location.id, &location.description)
        .into_iter()
        .find(|rule| rule.id == MOVE_RULE)?;
    Some(SimAction {
        rule,
        target_id: location.id.clone(),
        target_name: location.name.clone(),
    })
}

/// Apply an action's effects and describe what happened.
///
/// The returned dialogue node leads back to the story node the player was on.
pub fn execute_interaction(story: &Story, state: &mut GameState, action: &SimAction) -> StoryNode {
    let kind = object_definition(story, &action.target_id).map_or("object", |d| d.kind);
    let mut text = action.fill(&action.rule.description);

    for sim_effect in &action.rule.effects {
        match sim_effect {
            SimEffect::ModifyState { key, value, target_id } => {
                let name = match target_id.as_deref() {
                    Some(GLOBAL_TARGET) => key.clone(),
                    Some(other) => {
                        let other_kind = object_definition(story, other).map_or("object", |d| d.kind);
                        entity_variable_key(other_kind, other, key)
                    },
                    None => entity_variable_key(kind, &action.target_id, key),
                };
                effect::apply_variable_operation(state, &name, VariableOperation::Set, value);
            },
            SimEffect::ModifyVariable { key, value, operation } => {
                effect::apply_variable_operation(state, key, *operation, value);
            },
            SimEffect::GiveItem { item_id, count } => {
                let give = Effect::GiveItem {
                    item_id: item_id.clone(),
                    quantity: *count,
                };
                effect::apply_effect_in_place(state, &give, story);
            },
            SimEffect::RemoveItem { item_id, count } => {
                let remove = Effect::RemoveItem {
                    item_id: item_id.clone(),
                    quantity: *count,
                };
                effect::apply_effect_in_place(state, &remove, story);
            },
            SimEffect::TriggerEvent { event_id } => {
                let trigger = Effect::TriggerEvent {
                    event_id: event_id.clone(),
                };
                effect::apply_effect_in_place(state, &trigger, story);
            },
            SimEffect::ShowMessage { message } => text = action.fill(message),
        }
    }
    info!("interaction '{}' on '{}'", action.rule.id, action.target_id);

    let id = format!("sim_{}", state.history.len());
    StoryNode::new(
        id,
        NodeContent::Dialogue {
            speaker: Some(NARRATOR.to_string()),
            text,
            next_node_id: state.current_node_id.clone(),
        },
    )
}

/// A choice node listing every available interaction followed by the places the player
/// can go. Locations with connections offer those; a location without any offers a couple
/// of random others.
pub fn choice_node(story: &Story, state: &GameState, rng: &mut impl Rng) -> StoryNode {
    let id = format!("sim_choice_{}", state.history.len());
    let actions = available_interactions(story, state);
    if actions.is_empty() {
        return StoryNode::new(
            id,
            NodeContent::Dialogue {
                speaker: Some(NARRATOR.to_string()),
                text: "All is still. There seems to be nothing to do here.".to_string(),
                next_node_id: state.current_node_id.clone(),
            },
        );
    }

    let here = current_location(story, state);
    let mut options: Vec<ChoiceOption> = actions
        .iter()
        .enumerate()
        .map(|(n, action)| {
            let text = if action.rule.interaction_type == InteractionType::Observe && Some(action.target_id.as_str()) == here
            {
                "Look around".to_string()
            } else {
                format!("{} {}", action.rule.name, action.target_name)
            };
            ChoiceOption {
                id: format!("opt_{n}"),
                text,
                next_node_id: action_target(&action.target_id, &action.rule.id),
                ..ChoiceOption::default()
            }
        })
        .collect();

    let others: Vec<_> = story.locations.iter().filter(|l| Some(l.id.as_str()) != here).collect();
    let connections = here
        .and_then(|id| story.location(id))
        .map(|l| l.connections.as_slice())
        .unwrap_or_default();
    let destinations: Vec<_> = if connections.is_empty() {
        others.choose_multiple(rng, FREE_MOVE_CHOICES).copied().collect()
    } else {
        others.into_iter().filter(|l| connections.contains(&l.id)).collect()
    };
    options.extend(destinations.iter().enumerate().map(|(n, location)| ChoiceOption {
        id: format!("move_{n}"),
        text: format!("Go to {}", location.name),
        next_node_id: action_target(&location.id, MOVE_RULE),
        ..ChoiceOption::default()
    }));

    StoryNode::new(
        id,
        NodeContent::Choice {
            prompt: "What will you do?".to_string(),
            options,
        },
    )
}

/// True when every `&&`-joined part of the condition holds. `this:` names the target's
/// own variables.
fn condition_holds(condition: Option<&str>, state: &GameState, kind: &str, id: &str) -> bool {
    let Some(condition) = condition.map(str::trim).filter(|c| !c.is_empty()) else {
        return true;
    };
    let scope = entity_variable_key(kind, id, "");
    condition
        .split("&&")
        .all(|part| expression::evaluate(&part.trim().replace("this:", &scope), state))
}

fn object_definition<'a>(story: &'a Story, id: &str) -> Option<ObjectDefinition<'a>> {
    let (kind, id, name, mut rules) = if let Some(character) = story.character(id) {
        (
            "character",
            character.id.as_str(),
            character.name.as_str(),
            character_rules(&character.description),
        )
    } else if let Some(item) = story.item(id) {
        ("item", item.id.as_str(), item.name.as_str(), item_rules(&item.id, item.item_type))
    } else if let Some(location) = story.location(id) {
        (
            "location",
            location.id.as_str(),
            location.name.as_str(),
            location_rules(&location.id, &location.description),
        )
    } else if let Some(enemy) = story.enemy(id) {
        ("enemy", enemy.id.as_str(), enemy.name.as_str(), Vec::new())
    } else {
        return None;
    };
    if let Some(extra) = story.interactions.get(id) {
        rules.extend(extra.iter().cloned());
    }
    Some(ObjectDefinition { kind, id, name, rules })
}

fn character_rules(description: &str) -> Vec<InteractionRule> {
    let observed = if description.is_empty() {
        "You take a good look at {target.name}.".to_string()
    } else {
        format!("You take a good look at {{target.name}}. {description}")
    };
    vec![
        InteractionRule {
            id: "talk".into(),
            name: "Talk to".into(),
            description: "You speak to {target.name}. They seem lost in thought.".into(),
            interaction_type: InteractionType::Talk,
            priority: 10,
            ..InteractionRule::default()
        },
        InteractionRule {
            id: "observe_char".into(),
            name: "Observe".into(),
            description: observed,
            interaction_type: InteractionType::Observe,
            priority: 5,
            ..InteractionRule::default()
        },
    ]
}

fn item_rules(item_id: &str, item_type: ItemType) -> Vec<InteractionRule> {
    let mut rules = vec![InteractionRule {
        id: "take".into(),
        name: "Pick up".into(),
        description: "You pick up {target.name}.".into(),
        condition: Some("this:owned != true".into()),
        effects: vec![
            SimEffect::GiveItem {
                item_id: item_id.to_string(),
                count: 1,
            },
            SimEffect::ModifyState {
                key: "owned".into(),
                value: "true".into(),
                target_id: None,
            },
            SimEffect::ShowMessage {
                message: "You put {target.name} in your bag.".into(),
            },
        ],
        interaction_type: InteractionType::Take,
        priority: 10,
    }];
    match item_type {
        ItemType::Consumable => rules.push(InteractionRule {
            id: "consume".into(),
            name: "Use".into(),
            description: "You use {target.name}.".into(),
            condition: Some(format!("has_item:{item_id}")),
            effects: vec![SimEffect::RemoveItem {
                item_id: item_id.to_string(),
                count: 1,
            }],
            interaction_type: InteractionType::Interact,
            priority: 20,
        }),
        ItemType::Equipment => rules.push(InteractionRule {
            id: "equip".into(),
            name: "Equip".into(),
            description: "You equip {target.name}.".into(),
            condition: Some(format!("has_item:{item_id} && this:equipped != true")),
            effects: vec![SimEffect::ModifyState {
                key: "equipped".into(),
                value: "true".into(),
                target_id: None,
            }],
            interaction_type: InteractionType::Interact,
            priority: 20,
        }),
        ItemType::KeyItem | ItemType::Material => {},
    }
    rules
}

fn location_rules(location_id: &str, description: &str) -> Vec<InteractionRule> {
    vec![
        InteractionRule {
            id: "observe".into(),
            name: "Look around".into(),
            description: format!("You look around {{target.name}}. {description}")
                .trim_end()
                .to_string(),
            interaction_type: InteractionType::Observe,
            priority: -10,
            ..InteractionRule::default()
        },
        InteractionRule {
            id: MOVE_RULE.into(),
            name: "Go to".into(),
            description: "After a while you arrive at {target.name}.".into(),
            effects: vec![SimEffect::ModifyState {
                key: CURRENT_LOCATION_VAR.into(),
                value: location_id.to_string(),
                target_id: Some(GLOBAL_TARGET.into()),
            }],
            interaction_type: InteractionType::Movement,
            priority: 0,
            ..InteractionRule::default()
        },
    ]
}
