use std::collections::HashSet;
use std::fmt;

use crate::*;

/// Validation error for malformed or missing references in a Story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateId { kind: &'static str, id: String },
    MissingReference { kind: &'static str, id: String, context: String },
    InvalidValue { context: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            },
            ValidationError::MissingReference { kind, id, context } => {
                write!(f, "missing {kind} '{id}' ({context})")
            },
            ValidationError::InvalidValue { context } => {
                write!(f, "invalid value ({context})")
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate graph references, entity references and basic invariants of a Story.
///
/// Empty node ids are accepted everywhere as "unresolved".
///
/// ```
/// use novelsim_data::{NodeContent, Story, StoryNode, validate_story};
///
/// let mut story = Story { id: "demo".into(), start_node_id: "start".into(), ..Story::default() };
/// story.insert_node(StoryNode::new(
///     "start",
///     NodeContent::Dialogue { speaker: None, text: "Hello.".into(), next_node_id: String::new() },
/// ));
/// assert!(validate_story(&story).is_empty());
/// ```
pub fn validate_story(story: &Story) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut items = HashSet::new();
    let mut enemies = HashSet::new();
    let mut skills = HashSet::new();
    let mut locations = HashSet::new();
    let mut scratch = HashSet::new();

    track_ids("item", story.items.iter().map(|i| i.id.as_str()), &mut items, &mut errors);
    track_ids(
        "enemy",
        story.enemies.iter().map(|e| e.id.as_str()),
        &mut enemies,
        &mut errors,
    );
    track_ids("skill", story.skills.iter().map(|s| s.id.as_str()), &mut skills, &mut errors);
    track_ids(
        "location",
        story.locations.iter().map(|l| l.id.as_str()),
        &mut locations,
        &mut errors,
    );
    track_ids(
        "character",
        story.characters.iter().map(|c| c.id.as_str()),
        &mut scratch,
        &mut errors,
    );
    scratch.clear();
    track_ids(
        "faction",
        story.factions.iter().map(|f| f.id.as_str()),
        &mut scratch,
        &mut errors,
    );
    scratch.clear();
    track_ids("clue", story.clues.iter().map(|c| c.id.as_str()), &mut scratch, &mut errors);
    scratch.clear();
    track_ids("event", story.events.iter().map(|e| e.id.as_str()), &mut scratch, &mut errors);

    // instances count as items wherever an item id is accepted
    let mut givable: HashSet<&str> = items.clone();
    for (uid, instance) in &story.item_instances {
        if uid != &instance.uid {
            errors.push(ValidationError::InvalidValue {
                context: format!("item instance key '{uid}' does not match uid '{}'", instance.uid),
            });
        }
        check_ref(
            "item",
            &instance.template_id,
            &items,
            format!("item instance '{uid}' template"),
            &mut errors,
        );
        givable.insert(uid.as_str());
    }

    let ids = IdSets {
        nodes: story.nodes.keys().map(String::as_str).collect(),
        items: givable,
        enemies,
        skills,
        locations,
    };

    if story.start_node_id.trim().is_empty() {
        errors.push(ValidationError::InvalidValue {
            context: "story start node missing".to_string(),
        });
    } else {
        check_ref(
            "node",
            &story.start_node_id,
            &ids.nodes,
            "story start node".to_string(),
            &mut errors,
        );
    }

    for (key, node) in &story.nodes {
        if key != &node.id {
            errors.push(ValidationError::InvalidValue {
                context: format!("node key '{key}' does not match node id '{}'", node.id),
            });
        }
        if node.node_type != node.content.node_type() {
            errors.push(ValidationError::InvalidValue {
                context: format!(
                    "node '{key}' tagged {:?} but carries {:?} content",
                    node.node_type,
                    node.content.node_type()
                ),
            });
        }
        validate_node(node, &ids, &mut errors);
    }

    for enemy in &story.enemies {
        for drop in &enemy.drops {
            check_ref(
                "item",
                &drop.item_id,
                &ids.items,
                format!("enemy '{}' drop", enemy.id),
                &mut errors,
            );
            if !(0.0..=1.0).contains(&drop.chance) {
                errors.push(ValidationError::InvalidValue {
                    context: format!("enemy '{}' drop chance out of range ({})", enemy.id, drop.chance),
                });
            }
        }
        for skill in &enemy.skills {
            check_ref(
                "skill",
                skill,
                &ids.skills,
                format!("enemy '{}' skills", enemy.id),
                &mut errors,
            );
        }
    }

    for location in &story.locations {
        for neighbour in &location.connections {
            check_ref(
                "location",
                neighbour,
                &ids.locations,
                format!("location '{}' connections", location.id),
                &mut errors,
            );
        }
    }

    for (node_id, location_id) in &story.node_locations {
        check_ref(
            "node",
            node_id,
            &ids.nodes,
            "node locations".to_string(),
            &mut errors,
        );
        check_ref(
            "location",
            location_id,
            &ids.locations,
            format!("node '{node_id}' location"),
            &mut errors,
        );
    }

    errors
}

struct IdSets<'a> {
    nodes: HashSet<&'a str>,
    items: HashSet<&'a str>,
    enemies: HashSet<&'a str>,
    skills: HashSet<&'a str>,
    locations: HashSet<&'a str>,
}

fn track_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
    seen: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
}

fn check_ref(
    kind: &'static str,
    id: &str,
    known: &HashSet<&str>,
    context: String,
    errors: &mut Vec<ValidationError>,
) {
    if !known.contains(id) {
        errors.push(ValidationError::MissingReference {
            kind,
            id: id.to_string(),
            context,
        });
    }
}

/// Node targets may be empty, meaning "unresolved".
fn check_target(id: &str, ids: &IdSets<'_>, context: String, errors: &mut Vec<ValidationError>) {
    if !id.is_empty() {
        check_ref("node", id, &ids.nodes, context, errors);
    }
}

fn validate_node(node: &StoryNode, ids: &IdSets<'_>, errors: &mut Vec<ValidationError>) {
    let ctx = |what: &str| format!("node '{}' {what}", node.id);

    for conn in &node.connections {
        check_target(&conn.target_node_id, ids, ctx("connection"), errors);
    }

    match &node.content {
        NodeContent::Dialogue { next_node_id, .. } => {
            check_target(next_node_id, ids, ctx("next"), errors);
        },
        NodeContent::Choice { options, .. } => {
            if options.is_empty() {
                errors.push(ValidationError::InvalidValue {
                    context: ctx("has no options"),
                });
            }
            for option in options {
                check_target(&option.next_node_id, ids, ctx(&format!("option '{}'", option.id)), errors);
                for effect in &option.effects {
                    validate_effect(effect, ids, &ctx(&format!("option '{}' effect", option.id)), errors);
                }
            }
        },
        NodeContent::Condition {
            true_next_node_id,
            false_next_node_id,
            ..
        } => {
            check_target(true_next_node_id, ids, ctx("true branch"), errors);
            check_target(false_next_node_id, ids, ctx("false branch"), errors);
        },
        NodeContent::Battle {
            enemy_id,
            enemy_stats,
            win_next_node_id,
            lose_next_node_id,
            ..
        } => {
            if enemy_stats.is_none() {
                check_ref("enemy", enemy_id, &ids.enemies, ctx("battle"), errors);
            }
            check_target(win_next_node_id, ids, ctx("win branch"), errors);
            check_target(lose_next_node_id, ids, ctx("lose branch"), errors);
        },
        NodeContent::ItemAction {
            item_id, next_node_id, ..
        } => {
            check_ref("item", item_id, &ids.items, ctx("item action"), errors);
            check_target(next_node_id, ids, ctx("next"), errors);
        },
        NodeContent::VariableAction {
            variable_name,
            next_node_id,
            ..
        } => {
            if variable_name.trim().is_empty() {
                errors.push(ValidationError::InvalidValue {
                    context: ctx("variable name empty"),
                });
            }
            check_target(next_node_id, ids, ctx("next"), errors);
        },
        NodeContent::Random { branches } => {
            if !branches.iter().any(|b| b.weight > 0) {
                errors.push(ValidationError::InvalidValue {
                    context: ctx("random node has no positive-weight branch"),
                });
            }
            for branch in branches {
                check_target(&branch.next_node_id, ids, ctx("random branch"), errors);
            }
        },
        NodeContent::Ending { rewards, .. } => {
            for grant in &rewards.items {
                check_ref("item", &grant.item_id, &ids.items, ctx("ending reward"), errors);
            }
        },
    }
}

fn validate_effect(effect: &Effect, ids: &IdSets<'_>, context: &str, errors: &mut Vec<ValidationError>) {
    match effect {
        Effect::GiveItem { item_id, .. } | Effect::RemoveItem { item_id, .. } => {
            check_ref("item", item_id, &ids.items, context.to_string(), errors);
        },
        Effect::MoveToLocation { location_id } => {
            check_ref("location", location_id, &ids.locations, context.to_string(), errors);
        },
        Effect::ModifyVariable { .. }
        | Effect::ModifyAttribute { .. }
        | Effect::PlaySound { .. }
        | Effect::AddClue { .. }
        | Effect::ModifyReputation { .. }
        | Effect::ModifyRelationship { .. }
        | Effect::TriggerEvent { .. }
        | Effect::SetFlag { .. }
        | Effect::ClearFlag { .. } => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue(id: &str, next: &str) -> StoryNode {
        StoryNode::new(
            id,
            NodeContent::Dialogue {
                speaker: None,
                text: format!("node {id}"),
                next_node_id: next.to_string(),
            },
        )
    }

    fn base_story() -> Story {
        let mut story = Story {
            id: "demo".into(),
            title: "Demo".into(),
            start_node_id: "start".into(),
            ..Story::default()
        };
        story.insert_node(dialogue("start", "end"));
        story.insert_node(StoryNode::new("end", NodeContent::default_for(NodeType::End)));
        story
    }

    #[test]
    fn valid_story_has_no_errors() {
        assert!(validate_story(&base_story()).is_empty());
    }

    #[test]
    fn dangling_next_is_reported() {
        let mut story = base_story();
        story.insert_node(dialogue("start", "nowhere"));
        let errors = validate_story(&story);
        assert!(errors.iter().any(
            |err| matches!(err, ValidationError::MissingReference { kind, id, .. } if *kind == "node" && id == "nowhere")
        ));
    }

    #[test]
    fn empty_targets_are_unresolved_not_errors() {
        let mut story = base_story();
        story.insert_node(dialogue("start", ""));
        assert!(validate_story(&story).is_empty());
    }

    #[test]
    fn missing_start_node_is_reported() {
        let mut story = base_story();
        story.start_node_id = String::new();
        assert!(
            validate_story(&story)
                .iter()
                .any(|err| matches!(err, ValidationError::InvalidValue { .. }))
        );
    }

    #[test]
    fn duplicate_items_are_reported() {
        let mut story = base_story();
        story.items = vec![
            Item {
                id: "potion".into(),
                ..Item::default()
            },
            Item {
                id: "potion".into(),
                ..Item::default()
            },
        ];
        let errors = validate_story(&story);
        assert!(
            errors
                .iter()
                .any(|err| matches!(err, ValidationError::DuplicateId { kind, id } if *kind == "item" && id == "potion"))
        );
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut story = base_story();
        if let Some(node) = story.nodes.get_mut("start") {
            node.node_type = NodeType::Battle;
        }
        let errors = validate_story(&story);
        assert!(errors.iter().any(|e| e.to_string().contains("tagged Battle")));
    }

    #[test]
    fn battle_without_enemy_or_inline_stats_is_reported() {
        let mut story = base_story();
        story.insert_node(StoryNode::new(
            "fight",
            NodeContent::Battle {
                enemy_id: "ghost".into(),
                enemy_name: None,
                enemy_stats: None,
                win_next_node_id: "end".into(),
                lose_next_node_id: "end".into(),
            },
        ));
        let errors = validate_story(&story);
        assert!(errors.iter().any(
            |err| matches!(err, ValidationError::MissingReference { kind, id, .. } if *kind == "enemy" && id == "ghost")
        ));

        if let Some(node) = story.nodes.get_mut("fight")
            && let NodeContent::Battle { enemy_stats, .. } = &mut node.content
        {
            *enemy_stats = Some(CharacterStats::default());
        }
        assert!(validate_story(&story).is_empty());
    }

    #[test]
    fn zero_weight_random_is_reported() {
        let mut story = base_story();
        story.insert_node(StoryNode::new(
            "roll",
            NodeContent::Random {
                branches: vec![RandomBranch {
                    next_node_id: "end".into(),
                    weight: 0,
                }],
            },
        ));
        assert_eq!(validate_story(&story).len(), 1);
    }

    #[test]
    fn effects_and_instances_count_as_items() {
        let mut story = base_story();
        story.items.push(Item {
            id: "sword".into(),
            stackable: false,
            ..Item::default()
        });
        story.item_instances.insert(
            "sword#1".into(),
            ItemInstance {
                uid: "sword#1".into(),
                template_id: "sword".into(),
                ..ItemInstance::default()
            },
        );
        story.insert_node(StoryNode::new(
            "pick",
            NodeContent::Choice {
                prompt: "Take it?".into(),
                options: vec![ChoiceOption {
                    id: "yes".into(),
                    text: "Yes".into(),
                    next_node_id: "end".into(),
                    condition: None,
                    effects: vec![
                        Effect::GiveItem {
                            item_id: "sword#1".into(),
                            quantity: 1,
                        },
                        Effect::RemoveItem {
                            item_id: "shield".into(),
                            quantity: 1,
                        },
                    ],
                }],
            },
        ));
        let errors = validate_story(&story);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("shield"));
    }
}
