//! Narrative entities that stories reference by id: characters, locations, factions, clues
//! and events. Each carries an open `variables` bag for custom attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::rpg::CharacterStats;
use crate::story::Id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub stats: CharacterStats,
    #[serde(default)]
    pub faction_id: Option<Id>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// A place on the world map, drawn as a circle on a 2D canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub radius: f32,
    /// Ids of directly reachable neighbour locations. Links are stored on both ends.
    #[serde(default)]
    pub connections: Vec<Id>,
    /// Characters found here.
    #[serde(default)]
    pub npcs: Vec<Id>,
    /// Item templates lying around here.
    #[serde(default)]
    pub items: Vec<Id>,
    #[serde(default)]
    pub enemies: Vec<Id>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}
impl Location {
    pub fn distance_sq_to(&self, x: f32, y: f32) -> f32 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faction {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clue {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}
