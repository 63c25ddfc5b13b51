use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::interaction::InteractionRule;
use crate::rpg::{CharacterStats, Enemy, Item, ItemInstance, Skill};
use crate::world::{Character, Clue, Faction, GameEvent, Location};

/// Stable identifier used across story references.
pub type Id = String;

/// Type tag of a story node. Always agrees with the variant of the node's [`NodeContent`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    #[default]
    Dialogue,
    Choice,
    Condition,
    Battle,
    Item,
    Variable,
    Random,
    End,
}
impl NodeType {
    /// Nodes that stop automatic advancement and wait for the player.
    pub fn is_player_facing(self) -> bool {
        matches!(self, NodeType::Dialogue | NodeType::Choice | NodeType::End)
    }

    /// Nodes the engine resolves on its own and chains through.
    pub fn is_auto_advancing(self) -> bool {
        matches!(
            self,
            NodeType::Condition | NodeType::Variable | NodeType::Item | NodeType::Random
        )
    }
}

/// Authoring-canvas position of a node. Not used by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}
impl NodePosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Directed edge to another node, optionally labelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub target_node_id: Id,
    #[serde(default)]
    pub label: Option<String>,
}
impl Connection {
    pub fn to(target: impl Into<Id>) -> Self {
        Self {
            target_node_id: target.into(),
            label: None,
        }
    }

    pub fn labelled(target: impl Into<Id>, label: impl Into<String>) -> Self {
        Self {
            target_node_id: target.into(),
            label: Some(label.into()),
        }
    }
}

/// A single unit of story content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    #[serde(default)]
    pub id: Id,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub content: NodeContent,
    #[serde(default)]
    pub position: NodePosition,
    #[serde(default)]
    pub connections: Vec<Connection>,
}
impl StoryNode {
    /// Create a node whose type tag is taken from its content.
    pub fn new(id: impl Into<Id>, content: NodeContent) -> Self {
        Self {
            id: id.into(),
            node_type: content.node_type(),
            content,
            position: NodePosition::default(),
            connections: Vec::new(),
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = NodePosition::new(x, y);
        self
    }

    pub fn with_connections(mut self, connections: Vec<Connection>) -> Self {
        self.connections = connections;
        self
    }

    /// Target of the first outgoing connection, if any.
    pub fn first_connection(&self) -> Option<&str> {
        self.connections
            .first()
            .map(|c| c.target_node_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// The node's explicit single "next" field, falling back to its first connection.
    ///
    /// Branching content (choice, condition, battle, random) has no single next field,
    /// so only the connection fallback applies to it.
    pub fn default_next(&self) -> Option<&str> {
        let explicit = match &self.content {
            NodeContent::Dialogue { next_node_id, .. }
            | NodeContent::ItemAction { next_node_id, .. }
            | NodeContent::VariableAction { next_node_id, .. } => Some(next_node_id.as_str()),
            NodeContent::Choice { .. }
            | NodeContent::Condition { .. }
            | NodeContent::Battle { .. }
            | NodeContent::Random { .. }
            | NodeContent::Ending { .. } => None,
        };
        explicit.filter(|id| !id.is_empty()).or_else(|| self.first_connection())
    }

    /// Every node id this node refers to, from connections and content. Empty ids are skipped.
    pub fn referenced_node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.connections.iter().map(|c| c.target_node_id.as_str()).collect();
        ids.extend(self.content.next_node_ids());
        ids.retain(|id| !id.is_empty());
        ids
    }
}

/// Payload of a node, one case per [`NodeType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeContent {
    Dialogue {
        #[serde(default)]
        speaker: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        next_node_id: Id,
    },
    Choice {
        #[serde(default)]
        prompt: String,
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
    Condition {
        #[serde(default)]
        expression: String,
        #[serde(default)]
        true_next_node_id: Id,
        #[serde(default)]
        false_next_node_id: Id,
    },
    Battle {
        #[serde(default)]
        enemy_id: Id,
        #[serde(default)]
        enemy_name: Option<String>,
        #[serde(default)]
        enemy_stats: Option<CharacterStats>,
        #[serde(default)]
        win_next_node_id: Id,
        #[serde(default)]
        lose_next_node_id: Id,
    },
    ItemAction {
        #[serde(default)]
        item_id: Id,
        #[serde(default)]
        quantity: i32,
        #[serde(default)]
        action: ItemActionType,
        #[serde(default)]
        next_node_id: Id,
    },
    VariableAction {
        #[serde(default)]
        variable_name: String,
        #[serde(default)]
        operation: VariableOperation,
        #[serde(default)]
        value: String,
        #[serde(default)]
        next_node_id: Id,
    },
    Random {
        #[serde(default)]
        branches: Vec<RandomBranch>,
    },
    Ending {
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        ending_type: EndingType,
        #[serde(default)]
        rewards: EndingRewards,
    },
}
impl Default for NodeContent {
    fn default() -> Self {
        NodeContent::default_for(NodeType::Dialogue)
    }
}
impl NodeContent {
    /// The type tag matching this content.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeContent::Dialogue { .. } => NodeType::Dialogue,
            NodeContent::Choice { .. } => NodeType::Choice,
            NodeContent::Condition { .. } => NodeType::Condition,
            NodeContent::Battle { .. } => NodeType::Battle,
            NodeContent::ItemAction { .. } => NodeType::Item,
            NodeContent::VariableAction { .. } => NodeType::Variable,
            NodeContent::Random { .. } => NodeType::Random,
            NodeContent::Ending { .. } => NodeType::End,
        }
    }

    /// Empty payload of the given type, used when stored content cannot be decoded.
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Dialogue => NodeContent::Dialogue {
                speaker: None,
                text: String::new(),
                next_node_id: String::new(),
            },
            NodeType::Choice => NodeContent::Choice {
                prompt: String::new(),
                options: Vec::new(),
            },
            NodeType::Condition => NodeContent::Condition {
                expression: String::new(),
                true_next_node_id: String::new(),
                false_next_node_id: String::new(),
            },
            NodeType::Battle => NodeContent::Battle {
                enemy_id: String::new(),
                enemy_name: None,
                enemy_stats: None,
                win_next_node_id: String::new(),
                lose_next_node_id: String::new(),
            },
            NodeType::Item => NodeContent::ItemAction {
                item_id: String::new(),
                quantity: 0,
                action: ItemActionType::default(),
                next_node_id: String::new(),
            },
            NodeType::Variable => NodeContent::VariableAction {
                variable_name: String::new(),
                operation: VariableOperation::default(),
                value: String::new(),
                next_node_id: String::new(),
            },
            NodeType::Random => NodeContent::Random { branches: Vec::new() },
            NodeType::End => NodeContent::Ending {
                title: String::new(),
                description: String::new(),
                ending_type: EndingType::default(),
                rewards: EndingRewards::default(),
            },
        }
    }

    /// Node ids named by the payload itself (not by connections). May contain empty strings.
    pub fn next_node_ids(&self) -> Vec<&str> {
        match self {
            NodeContent::Dialogue { next_node_id, .. }
            | NodeContent::ItemAction { next_node_id, .. }
            | NodeContent::VariableAction { next_node_id, .. } => vec![next_node_id.as_str()],
            NodeContent::Choice { options, .. } => options.iter().map(|o| o.next_node_id.as_str()).collect(),
            NodeContent::Condition {
                true_next_node_id,
                false_next_node_id,
                ..
            } => vec![true_next_node_id.as_str(), false_next_node_id.as_str()],
            NodeContent::Battle {
                win_next_node_id,
                lose_next_node_id,
                ..
            } => vec![win_next_node_id.as_str(), lose_next_node_id.as_str()],
            NodeContent::Random { branches } => branches.iter().map(|b| b.next_node_id.as_str()).collect(),
            NodeContent::Ending { .. } => Vec::new(),
        }
    }

    /// Short text suitable for history entries and save previews.
    pub fn summary(&self) -> String {
        match self {
            NodeContent::Dialogue { speaker, text, .. } => match speaker {
                Some(name) if !name.is_empty() => format!("{name}: {text}"),
                _ => text.clone(),
            },
            NodeContent::Choice { prompt, .. } => prompt.clone(),
            NodeContent::Condition { expression, .. } => format!("if {expression}"),
            NodeContent::Battle {
                enemy_id, enemy_name, ..
            } => format!("battle: {}", enemy_name.as_deref().unwrap_or(enemy_id)),
            NodeContent::ItemAction {
                item_id,
                quantity,
                action,
                ..
            } => format!("{action:?} {quantity} x {item_id}"),
            NodeContent::VariableAction {
                variable_name,
                operation,
                value,
                ..
            } => format!("{variable_name} {operation:?} {value}"),
            NodeContent::Random { branches } => format!("random ({} branches)", branches.len()),
            NodeContent::Ending { title, .. } => title.clone(),
        }
    }
}

/// One option offered by a choice node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub next_node_id: Id,
    /// Guard expression; the option is only selectable when it evaluates to true.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

/// A weighted outgoing branch of a random node. Weight zero makes the branch unreachable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomBranch {
    #[serde(default)]
    pub next_node_id: Id,
    #[serde(default)]
    pub weight: u32,
}

/// Rewards granted once when an ending is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndingRewards {
    #[serde(default)]
    pub exp: i32,
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub items: Vec<ItemGrant>,
}
impl EndingRewards {
    pub fn is_empty(&self) -> bool {
        self.exp == 0 && self.gold == 0 && self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemGrant {
    #[serde(default)]
    pub item_id: Id,
    #[serde(default)]
    pub quantity: i32,
}

/// Atomic game-state mutation attached to a choice option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Effect {
    ModifyVariable {
        #[serde(default)]
        variable_name: String,
        #[serde(default)]
        operation: VariableOperation,
        #[serde(default)]
        value: String,
    },
    GiveItem {
        #[serde(default)]
        item_id: Id,
        #[serde(default)]
        quantity: i32,
    },
    RemoveItem {
        #[serde(default)]
        item_id: Id,
        #[serde(default)]
        quantity: i32,
    },
    ModifyAttribute {
        #[serde(default)]
        attribute: String,
        #[serde(default)]
        value: i32,
    },
    PlaySound {
        #[serde(default)]
        sound_id: String,
    },
    AddClue {
        #[serde(default)]
        clue_id: Id,
    },
    ModifyReputation {
        #[serde(default)]
        faction_id: Id,
        #[serde(default)]
        delta: i32,
    },
    ModifyRelationship {
        #[serde(default)]
        character_id: Id,
        #[serde(default)]
        delta: i32,
    },
    MoveToLocation {
        #[serde(default)]
        location_id: Id,
    },
    TriggerEvent {
        #[serde(default)]
        event_id: Id,
    },
    SetFlag {
        #[serde(default)]
        flag: String,
    },
    ClearFlag {
        #[serde(default)]
        flag: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableOperation {
    #[default]
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemActionType {
    #[default]
    Give,
    Remove,
    Check,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndingType {
    Good,
    #[default]
    Normal,
    Bad,
    Secret,
}

/// A complete story: node graph plus every entity the nodes refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub start_node_id: Id,
    #[serde(default)]
    pub nodes: BTreeMap<Id, StoryNode>,
    /// Initial values of global story variables.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Pre-rolled equipment instances handed out by item-reward nodes.
    #[serde(default)]
    pub item_instances: BTreeMap<Id, ItemInstance>,
    #[serde(default)]
    pub enemies: Vec<Enemy>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub factions: Vec<Faction>,
    #[serde(default)]
    pub clues: Vec<Clue>,
    #[serde(default)]
    pub events: Vec<GameEvent>,
    /// Node id to the id of the location it takes place in.
    #[serde(default)]
    pub node_locations: BTreeMap<Id, Id>,
    /// Extra interaction rules per object id, on top of the built-in ones.
    #[serde(default)]
    pub interactions: BTreeMap<Id, Vec<InteractionRule>>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Story {
    pub fn node(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.get(id)
    }

    pub fn start_node(&self) -> Option<&StoryNode> {
        self.nodes.get(&self.start_node_id)
    }

    /// Insert a node keyed by its own id, replacing any node with the same id.
    pub fn insert_node(&mut self, node: StoryNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn enemy(&self, id: &str) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.id == id)
    }

    pub fn skill(&self, id: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.id == id)
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn location(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn instance(&self, uid: &str) -> Option<&ItemInstance> {
        self.item_instances.get(uid)
    }
}
