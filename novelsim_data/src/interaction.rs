//! Interaction rules for free-roaming play: what the player can do to the characters,
//! items and places around them, and what each action changes.

use serde::{Deserialize, Serialize};

use crate::story::{Id, VariableOperation};

/// Grouping of an interaction, used for ordering and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Observe,
    #[default]
    Interact,
    Combat,
    Movement,
    Talk,
    Take,
}

/// One thing the player may do to an object.
///
/// `description` and message texts may contain `{target.name}`. In `condition`, the
/// prefix `this:` stands for the target's own variables, so `this:opened == true` reads
/// the `opened` variable of whatever the rule is attached to. Several conditions can be
/// joined with `&&`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRule {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub effects: Vec<SimEffect>,
    #[serde(default, rename = "type")]
    pub interaction_type: InteractionType,
    /// Higher priorities are listed first.
    #[serde(default)]
    pub priority: i32,
}

/// A state change made by an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SimEffect {
    /// Set a variable on the interaction target, or on `target_id` when given.
    /// A `target_id` of `"GLOBAL"` writes a global variable instead.
    ModifyState {
        #[serde(default)]
        key: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        target_id: Option<Id>,
    },
    ModifyVariable {
        #[serde(default)]
        key: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        operation: VariableOperation,
    },
    GiveItem {
        #[serde(default)]
        item_id: Id,
        #[serde(default = "one")]
        count: i32,
    },
    RemoveItem {
        #[serde(default)]
        item_id: Id,
        #[serde(default = "one")]
        count: i32,
    },
    TriggerEvent {
        #[serde(default)]
        event_id: Id,
    },
    /// Replace the rule's description in the result text.
    ShowMessage {
        #[serde(default)]
        message: String,
    },
}

fn one() -> i32 {
    1
}

/// `target_id` of a [`SimEffect::ModifyState`] that addresses global variables.
pub const GLOBAL_TARGET: &str = "GLOBAL";
