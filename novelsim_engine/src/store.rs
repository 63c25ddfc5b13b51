//! Story and save persistence.
//!
//! The engine only sees the [`StoryRepository`] and [`SaveRepository`] traits. Stories are
//! stored as JSON and decoded leniently: a node or entity whose payload no longer matches
//! the current model is replaced by a typed default instead of failing the whole load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use novelsim_data::{NodeContent, NodeType, SaveData, Story, StoryNode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron parse error: {0}")]
    RonDe(#[from] ron::error::SpannedError),
    #[error("ron write error: {0}")]
    RonSer(#[from] ron::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Load and store whole stories by id.
pub trait StoryRepository {
    /// # Errors
    /// [`StoreError::NotFound`] if no story has this id, or an I/O / decode error.
    fn load_story(&self, id: &str) -> Result<Story, StoreError>;
    /// # Errors
    /// I/O or encode failures.
    fn save_story(&mut self, story: &Story) -> Result<(), StoreError>;
    /// # Errors
    /// I/O failures while listing.
    fn list_stories(&self) -> Result<Vec<String>, StoreError>;
}

/// Load and store game-state snapshots in numbered slots.
pub trait SaveRepository {
    /// # Errors
    /// [`StoreError::NotFound`] for an empty slot, or an I/O / decode error.
    fn load_slot(&self, slot: u32) -> Result<SaveData, StoreError>;
    /// Write `save` into the slot named by `save.slot_index`, replacing what was there.
    ///
    /// # Errors
    /// I/O or encode failures.
    fn save_slot(&mut self, save: &SaveData) -> Result<(), StoreError>;
    /// # Errors
    /// [`StoreError::NotFound`] for an empty slot, or an I/O error.
    fn delete_slot(&mut self, slot: u32) -> Result<(), StoreError>;
    /// Every readable save, ordered by slot.
    ///
    /// # Errors
    /// I/O failures while listing.
    fn list_slots(&self) -> Result<Vec<SaveData>, StoreError>;
}

/// In-memory repository for generated sessions and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    stories: BTreeMap<String, Story>,
    saves: BTreeMap<u32, SaveData>,
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_story(mut self, story: Story) -> Self {
        self.stories.insert(story.id.clone(), story);
        self
    }
}

impl StoryRepository for MemoryStore {
    fn load_story(&self, id: &str) -> Result<Story, StoreError> {
        self.stories
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("story '{id}'")))
    }

    fn save_story(&mut self, story: &Story) -> Result<(), StoreError> {
        self.stories.insert(story.id.clone(), story.clone());
        Ok(())
    }

    fn list_stories(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.stories.keys().cloned().collect())
    }
}

impl SaveRepository for MemoryStore {
    fn load_slot(&self, slot: u32) -> Result<SaveData, StoreError> {
        self.saves
            .get(&slot)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("save slot {slot}")))
    }

    fn save_slot(&mut self, save: &SaveData) -> Result<(), StoreError> {
        self.saves.insert(save.slot_index, save.clone());
        Ok(())
    }

    fn delete_slot(&mut self, slot: u32) -> Result<(), StoreError> {
        self.saves
            .remove(&slot)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("save slot {slot}")))
    }

    fn list_slots(&self) -> Result<Vec<SaveData>, StoreError> {
        Ok(self.saves.values().cloned().collect())
    }
}

/// A directory holding one `<id>.json` file per story.
#[derive(Debug, Clone)]
pub struct JsonStoryDir {
    root: PathBuf,
}
impl JsonStoryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

impl StoryRepository for JsonStoryDir {
    fn load_story(&self, id: &str) -> Result<Story, StoreError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("story '{id}' at {}", path.display())));
        }
        load_story_file(&path)
    }

    fn save_story(&mut self, story: &Story) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(&story.id);
        fs::write(&path, export_story_json(story)?)?;
        info!("saved story '{}' to {}", story.id, path.display());
        Ok(())
    }

    fn list_stories(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Read and leniently decode a story JSON file.
///
/// # Errors
/// Fails if the file can't be read or isn't a JSON object.
pub fn load_story_file(path: &Path) -> Result<Story, StoreError> {
    let raw = fs::read_to_string(path)?;
    import_story_json(&raw)
}

/// Serialize a story as pretty-printed JSON.
///
/// # Errors
/// Propagates serializer failures.
pub fn export_story_json(story: &Story) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(story)?)
}

/// Decode story JSON, substituting typed defaults for any node or entity that fails to decode.
///
/// Only input that isn't a JSON object at all is rejected.
///
/// # Errors
/// [`StoreError::Json`] for invalid JSON, [`StoreError::Malformed`] if the top level isn't an object.
pub fn import_story_json(raw: &str) -> Result<Story, StoreError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(mut obj) = value else {
        return Err(StoreError::Malformed("story JSON must be an object".to_string()));
    };

    let nodes = obj.remove("nodes");
    let items = obj.remove("items");
    let enemies = obj.remove("enemies");
    let skills = obj.remove("skills");
    let characters = obj.remove("characters");
    let locations = obj.remove("locations");
    let factions = obj.remove("factions");
    let clues = obj.remove("clues");
    let events = obj.remove("events");
    let instances = obj.remove("itemInstances");

    let mut story = match serde_json::from_value::<Story>(Value::Object(obj.clone())) {
        Ok(story) => story,
        Err(err) => {
            warn!("story metadata did not decode ({err}); keeping readable fields only");
            scalar_fallback(&obj)
        },
    };

    story.nodes = decode_nodes(nodes);
    story.items = decode_entities("item", items);
    story.enemies = decode_entities("enemy", enemies);
    story.skills = decode_entities("skill", skills);
    story.characters = decode_entities("character", characters);
    story.locations = decode_entities("location", locations);
    story.factions = decode_entities("faction", factions);
    story.clues = decode_entities("clue", clues);
    story.events = decode_entities("event", events);
    if let Some(Value::Object(map)) = instances {
        for (uid, raw) in map {
            match serde_json::from_value(raw) {
                Ok(instance) => {
                    story.item_instances.insert(uid, instance);
                },
                Err(err) => warn!("dropping undecodable item instance '{uid}': {err}"),
            }
        }
    }
    Ok(story)
}

fn scalar_fallback(obj: &Map<String, Value>) -> Story {
    let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    Story {
        id: text("id"),
        title: text("title"),
        author: text("author"),
        description: text("description"),
        start_node_id: text("startNodeId"),
        ..Story::default()
    }
}

fn decode_nodes(value: Option<Value>) -> BTreeMap<String, StoryNode> {
    let mut nodes = BTreeMap::new();
    let Some(Value::Object(map)) = value else {
        if value.is_some() {
            warn!("story nodes are not an object; loading no nodes");
        }
        return nodes;
    };
    for (key, raw) in map {
        let node = decode_node(&key, raw);
        nodes.insert(key, node);
    }
    nodes
}

fn decode_node(key: &str, raw: Value) -> StoryNode {
    let mut node = match serde_json::from_value::<StoryNode>(raw.clone()) {
        Ok(node) => node,
        Err(err) => {
            let node_type = raw
                .get("type")
                .and_then(|t| serde_json::from_value::<NodeType>(t.clone()).ok())
                .unwrap_or_default();
            warn!("node '{key}' did not decode ({err}); using an empty {node_type:?} node");
            let content = raw
                .get("content")
                .and_then(|c| serde_json::from_value::<NodeContent>(c.clone()).ok())
                .filter(|c| c.node_type() == node_type)
                .unwrap_or_else(|| NodeContent::default_for(node_type));
            let mut node = StoryNode::new(key, content);
            if let Some(position) = raw.get("position").and_then(|p| serde_json::from_value(p.clone()).ok()) {
                node.position = position;
            }
            node.connections = decode_entities("connection", raw.get("connections").cloned());
            node
        },
    };
    if node.id.is_empty() {
        node.id = key.to_string();
    }
    if node.node_type != node.content.node_type() {
        warn!(
            "node '{key}' tagged {:?} carries {:?} content; using the content's type",
            node.node_type,
            node.content.node_type()
        );
        node.node_type = node.content.node_type();
    }
    node
}

/// Decode a list elementwise. An element that fails is replaced by a default carrying
/// only its `id`, or dropped if even that fails.
fn decode_entities<T: DeserializeOwned>(kind: &str, value: Option<Value>) -> Vec<T> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Value::Array(elements) = value else {
        warn!("{kind} list is not an array; ignoring it");
        return Vec::new();
    };
    let mut out = Vec::with_capacity(elements.len());
    for raw in elements {
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(entity) => out.push(entity),
            Err(err) => {
                let id = raw.get("id").cloned().unwrap_or(Value::String(String::new()));
                let mut stub = Map::new();
                stub.insert("id".to_string(), id);
                match serde_json::from_value::<T>(Value::Object(stub)) {
                    Ok(entity) => {
                        warn!("{kind} did not decode ({err}); substituting a default");
                        out.push(entity);
                    },
                    Err(_) => warn!("dropping undecodable {kind}: {err}"),
                }
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use novelsim_data::{Connection, Effect, Item};
    use tempfile::tempdir;

    fn sample_story() -> Story {
        let mut story = Story {
            id: "tale".into(),
            title: "A Tale".into(),
            start_node_id: "start".into(),
            ..Story::default()
        };
        story.insert_node(
            StoryNode::new(
                "start",
                NodeContent::Dialogue {
                    speaker: Some("Guide".into()),
                    text: "Welcome.".into(),
                    next_node_id: "end".into(),
                },
            )
            .with_connections(vec![Connection::to("end")]),
        );
        story.insert_node(StoryNode::new("end", NodeContent::default_for(NodeType::End)));
        story.items.push(Item {
            id: "potion".into(),
            name: "Potion".into(),
            ..Item::default()
        });
        story
    }

    #[test]
    fn export_then_import_preserves_story() {
        let story = sample_story();
        let json = export_story_json(&story).unwrap();
        assert_eq!(import_story_json(&json).unwrap(), story);
    }

    #[test]
    fn story_files_are_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tale.json");
        fs::write(&path, export_story_json(&sample_story()).unwrap()).unwrap();
        assert_eq!(load_story_file(&path).unwrap(), sample_story());

        let ron_path = dir.path().join("tale.ron");
        fs::write(&ron_path, r#"(id: "tale", startNodeId: "start")"#).unwrap();
        assert!(matches!(load_story_file(&ron_path), Err(StoreError::Json(_))));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let json = r#"{"id":"x","startNodeId":"a","shinyNewField":true,
            "nodes":{"a":{"id":"a","type":"END","content":{"type":"ending","title":"Fin","extra":1}}}}"#;
        let story = import_story_json(json).unwrap();
        assert_eq!(story.nodes["a"].node_type, NodeType::End);
    }

    #[test]
    fn broken_node_content_becomes_typed_default() {
        let json = r#"{"id":"x","startNodeId":"a","nodes":{
            "a":{"id":"a","type":"CHOICE","content":{"type":"choice","options":"not a list"},
                 "connections":[{"targetNodeId":"b"},{"targetNodeId":7}]},
            "b":{"id":"b","type":"DIALOGUE","content":{"type":"dialogue","text":"ok"}}}}"#;
        let story = import_story_json(json).unwrap();
        let a = &story.nodes["a"];
        assert_eq!(a.node_type, NodeType::Choice);
        assert_eq!(a.content, NodeContent::default_for(NodeType::Choice));
        assert_eq!(a.connections.len(), 2);
        assert_eq!(a.connections[0].target_node_id, "b");
        assert!(matches!(&story.nodes["b"].content, NodeContent::Dialogue { text, .. } if text == "ok"));
    }

    #[test]
    fn mismatched_tag_follows_content() {
        let json = r#"{"nodes":{"a":{"type":"BATTLE","content":{"type":"dialogue","text":"hi"}}}}"#;
        let story = import_story_json(json).unwrap();
        assert_eq!(story.nodes["a"].node_type, NodeType::Dialogue);
        assert_eq!(story.nodes["a"].id, "a");
    }

    #[test]
    fn broken_entities_keep_their_ids() {
        let json = r#"{"id":"x","items":[{"id":"good","name":"Good"},{"id":"bad","price":"lots"},42]}"#;
        let story = import_story_json(json).unwrap();
        let ids: Vec<_> = story.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "bad", ""]);
    }

    #[test]
    fn effects_decode_with_defaults() {
        let json = r#"{"type":"giveItem","itemId":"potion"}"#;
        let effect: Effect = serde_json::from_str(json).unwrap();
        assert_eq!(
            effect,
            Effect::GiveItem {
                item_id: "potion".into(),
                quantity: 0
            }
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(import_story_json("[1,2]"), Err(StoreError::Malformed(_))));
        assert!(matches!(import_story_json("{oops"), Err(StoreError::Json(_))));
    }

    #[test]
    fn json_dir_round_trip() {
        let dir = tempdir().unwrap();
        let mut repo = JsonStoryDir::new(dir.path());
        assert!(repo.list_stories().unwrap().is_empty());
        repo.save_story(&sample_story()).unwrap();
        assert_eq!(repo.list_stories().unwrap(), vec!["tale".to_string()]);
        assert_eq!(repo.load_story("tale").unwrap(), sample_story());
        assert!(matches!(repo.load_story("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn memory_store_slots() {
        let mut store = MemoryStore::new().with_story(sample_story());
        assert!(store.load_story("tale").is_ok());
        let save = SaveData {
            slot_index: 2,
            ..SaveData::default()
        };
        store.save_slot(&save).unwrap();
        assert_eq!(store.list_slots().unwrap().len(), 1);
        store.delete_slot(2).unwrap();
        assert!(matches!(store.load_slot(2), Err(StoreError::NotFound(_))));
        assert!(store.delete_slot(2).is_err());
    }
}
