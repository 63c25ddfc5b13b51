//! Run-time play state and save records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::rpg::{CharacterStats, EquipSlot, ItemInstance};
use crate::story::{Id, Story};

/// Global variable that tracks the player's current location id.
pub const CURRENT_LOCATION_VAR: &str = "current_location";

/// Build the key of an entity-scoped variable (`"type:id:key"`).
pub fn entity_variable_key(kind: &str, id: &str, key: &str) -> String {
    format!("{kind}:{id}:{key}")
}

/// One inventory stack. Slots holding an instance always have quantity 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySlot {
    #[serde(default)]
    pub item_id: Id,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub instance_id: Option<Id>,
}

/// Equipped items per slot. Values are instance uids, or template ids for uninstanced gear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    #[serde(default)]
    pub weapon: Option<Id>,
    #[serde(default)]
    pub armor: Option<Id>,
    #[serde(default)]
    pub accessory: Option<Id>,
    #[serde(default)]
    pub head: Option<Id>,
    #[serde(default)]
    pub boots: Option<Id>,
}
impl Equipment {
    pub fn get(&self, slot: EquipSlot) -> Option<&Id> {
        match slot {
            EquipSlot::Weapon => self.weapon.as_ref(),
            EquipSlot::Armor => self.armor.as_ref(),
            EquipSlot::Accessory => self.accessory.as_ref(),
            EquipSlot::Head => self.head.as_ref(),
            EquipSlot::Boots => self.boots.as_ref(),
        }
    }

    /// Put `value` into `slot`, returning whatever was there before.
    pub fn replace(&mut self, slot: EquipSlot, value: Option<Id>) -> Option<Id> {
        let field = match slot {
            EquipSlot::Weapon => &mut self.weapon,
            EquipSlot::Armor => &mut self.armor,
            EquipSlot::Accessory => &mut self.accessory,
            EquipSlot::Head => &mut self.head,
            EquipSlot::Boots => &mut self.boots,
        };
        std::mem::replace(field, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EquipSlot, &Id)> {
        EquipSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|id| (slot, id)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    #[default]
    Node,
    Choice,
    Battle,
}

/// Append-only log entry. `timestamp` is the play time in milliseconds when it was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(default)]
    pub node_id: Id,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: HistoryKind,
    #[serde(default)]
    pub timestamp: u64,
}

/// Everything that changes while a story is played.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(default)]
    pub story_id: Id,
    #[serde(default)]
    pub current_node_id: Id,
    #[serde(default)]
    pub player_stats: CharacterStats,
    #[serde(default)]
    pub inventory: Vec<InventorySlot>,
    /// Instance uid to the rolled instance held (or equipped) by the player.
    #[serde(default)]
    pub item_instances: BTreeMap<Id, ItemInstance>,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub learned_skills: Vec<Id>,
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub play_time_ms: u64,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Entity-scoped variables keyed `"type:id:key"`.
    #[serde(default)]
    pub entity_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub flags: BTreeSet<String>,
    #[serde(default)]
    pub collected_clues: BTreeSet<Id>,
    #[serde(default)]
    pub faction_reputations: BTreeMap<Id, i32>,
    #[serde(default)]
    pub character_relationships: BTreeMap<Id, i32>,
    #[serde(default)]
    pub triggered_events: BTreeSet<Id>,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

impl GameState {
    /// Fresh state positioned at the story's start node, with the story's global variables
    /// and every entity's variable bag copied in.
    pub fn for_story(story: &Story) -> Self {
        let mut entity_variables = BTreeMap::new();
        let mut seed = |kind: &str, id: &str, vars: &BTreeMap<String, String>| {
            for (key, value) in vars {
                entity_variables.insert(entity_variable_key(kind, id, key), value.clone());
            }
        };
        for item in &story.items {
            seed("item", &item.id, &item.variables);
        }
        for enemy in &story.enemies {
            seed("enemy", &enemy.id, &enemy.variables);
        }
        for character in &story.characters {
            seed("character", &character.id, &character.variables);
        }
        for location in &story.locations {
            seed("location", &location.id, &location.variables);
        }
        for faction in &story.factions {
            seed("faction", &faction.id, &faction.variables);
        }
        for clue in &story.clues {
            seed("clue", &clue.id, &clue.variables);
        }
        for event in &story.events {
            seed("event", &event.id, &event.variables);
        }

        Self {
            story_id: story.id.clone(),
            current_node_id: story.start_node_id.clone(),
            variables: story.variables.clone(),
            entity_variables,
            ..Self::default()
        }
    }

    pub fn current_location(&self) -> Option<&str> {
        self.variables
            .get(CURRENT_LOCATION_VAR)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn record(&mut self, node_id: &str, text: impl Into<String>, kind: HistoryKind) {
        self.history.push(HistoryItem {
            node_id: node_id.to_string(),
            text: text.into(),
            kind,
            timestamp: self.play_time_ms,
        });
    }
}

/// A game state snapshot stored in a save slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub slot_index: u32,
    #[serde(default)]
    pub story_id: Id,
    #[serde(default)]
    pub story_title: String,
    #[serde(default)]
    pub game_state: GameState,
    /// Wall-clock seconds since the Unix epoch when the save was written.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub play_time: u64,
    #[serde(default)]
    pub current_node_preview: Option<String>,
}
impl SaveData {
    /// Play time as `HH:MM:SS`.
    ///
    /// ```
    /// use novelsim_data::SaveData;
    ///
    /// let save = SaveData { play_time: 3_723_000, ..SaveData::default() };
    /// assert_eq!(save.formatted_play_time(), "01:02:03");
    /// ```
    pub fn formatted_play_time(&self) -> String {
        let hours = self.play_time / 3_600_000;
        let minutes = (self.play_time % 3_600_000) / 60_000;
        let seconds = (self.play_time % 60_000) / 1000;
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpg::Item;
    use crate::world::Faction;

    #[test]
    fn for_story_seeds_variables_and_start() {
        let mut story = Story {
            id: "s".into(),
            start_node_id: "start".into(),
            ..Story::default()
        };
        story.variables.insert("chapter".into(), "1".into());
        story.items.push(Item {
            id: "sword".into(),
            variables: BTreeMap::from([("origin".to_string(), "north".to_string())]),
            ..Item::default()
        });
        story.factions.push(Faction {
            id: "guild".into(),
            variables: BTreeMap::from([("rank".to_string(), "3".to_string())]),
            ..Faction::default()
        });

        let state = GameState::for_story(&story);
        assert_eq!(state.current_node_id, "start");
        assert_eq!(state.variables.get("chapter").map(String::as_str), Some("1"));
        assert_eq!(
            state.entity_variables.get("item:sword:origin").map(String::as_str),
            Some("north")
        );
        assert_eq!(
            state.entity_variables.get("faction:guild:rank").map(String::as_str),
            Some("3")
        );
    }

    #[test]
    fn equipment_replace_returns_previous() {
        let mut eq = Equipment::default();
        assert_eq!(eq.replace(EquipSlot::Head, Some("helm".into())), None);
        assert_eq!(eq.replace(EquipSlot::Head, Some("crown".into())), Some("helm".into()));
        assert_eq!(eq.get(EquipSlot::Head).map(String::as_str), Some("crown"));
        assert_eq!(eq.iter().count(), 1);
    }

    #[test]
    fn history_uses_play_time() {
        let mut state = GameState {
            play_time_ms: 4200,
            ..GameState::default()
        };
        state.record("n1", "hello", HistoryKind::Node);
        assert_eq!(state.history[0].timestamp, 4200);
        assert_eq!(state.history[0].kind, HistoryKind::Node);
    }

    #[test]
    fn play_time_formats_past_a_day() {
        let save = SaveData {
            play_time: 90_061_000,
            ..SaveData::default()
        };
        assert_eq!(save.formatted_play_time(), "25:01:01");
    }
}
