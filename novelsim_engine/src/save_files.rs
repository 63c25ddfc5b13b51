//! Save-slot files.
//!
//! Each slot is a RON file `slot_<n>.ron` holding a [`SaveData`] record. Saves for
//! different stories live in per-story subdirectories of [`SAVE_DIR`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{info, warn};
use novelsim_data::SaveData;
use ron::ser::PrettyConfig;

use crate::store::{SaveRepository, StoreError};

pub const SAVE_DIR: &str = "saved_games";

/// A directory of RON save slots.
#[derive(Debug, Clone)]
pub struct SaveDir {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveFileStatus {
    Ready,
    Corrupted { message: String },
}

/// A discovered save slot, readable or not.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveFileEntry {
    pub slot: u32,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    pub save: Option<SaveData>,
    pub status: SaveFileStatus,
}

impl SaveDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Save directory for one story under [`SAVE_DIR`].
    pub fn for_story(story_id: &str) -> Self {
        Self::new(PathBuf::from(SAVE_DIR).join(sanitize_slug(story_id)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, slot: u32) -> PathBuf {
        self.root.join(format!("slot_{slot}.ron"))
    }

    /// Every slot file in the directory, including unreadable ones, ordered by slot.
    ///
    /// # Errors
    /// Returns an error if the directory can't be enumerated.
    pub fn entries(&self) -> Result<Vec<SaveFileEntry>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let Some(slot) = slot_from_path(&path) else {
                continue;
            };
            let modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
            let (save, status) = match read_save(&path) {
                Ok(save) => (Some(save), SaveFileStatus::Ready),
                Err(err) => {
                    warn!("failed to read save slot {slot} ({}): {err}", path.display());
                    (
                        None,
                        SaveFileStatus::Corrupted {
                            message: trim_error(&err),
                        },
                    )
                },
            };
            entries.push(SaveFileEntry {
                slot,
                path,
                modified,
                save,
                status,
            });
        }
        entries.sort_by_key(|e| e.slot);
        Ok(entries)
    }
}

impl SaveRepository for SaveDir {
    fn load_slot(&self, slot: u32) -> Result<SaveData, StoreError> {
        let path = self.path_for(slot);
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("save slot {slot}")));
        }
        read_save(&path)
    }

    fn save_slot(&mut self, save: &SaveData) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(save.slot_index);
        let ron = ron::ser::to_string_pretty(save, PrettyConfig::default())?;
        fs::write(&path, ron)?;
        info!("wrote save slot {} to {}", save.slot_index, path.display());
        Ok(())
    }

    fn delete_slot(&mut self, slot: u32) -> Result<(), StoreError> {
        let path = self.path_for(slot);
        if !path.is_file() {
            return Err(StoreError::NotFound(format!("save slot {slot}")));
        }
        fs::remove_file(&path)?;
        Ok(())
    }

    fn list_slots(&self) -> Result<Vec<SaveData>, StoreError> {
        Ok(self.entries()?.into_iter().filter_map(|entry| entry.save).collect())
    }
}

fn read_save(path: &Path) -> Result<SaveData, StoreError> {
    let raw = fs::read_to_string(path)?;
    Ok(ron::from_str::<SaveData>(&raw)?)
}

fn slot_from_path(path: &Path) -> Option<u32> {
    if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("ron") {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix("slot_"))
        .and_then(|n| n.parse().ok())
}

/// Normalize a story id into a filesystem-safe directory name.
pub fn sanitize_slug(raw: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else if ch == '-' || ch == '_' {
            if !slug.is_empty() {
                slug.push(ch);
            }
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    let trimmed = slug.trim_matches(&['-', '_'][..]).to_string();
    if trimmed.is_empty() { "story".to_string() } else { trimmed }
}

/// Format a human-friendly modified time relative to now.
pub fn format_modified(modified: SystemTime) -> String {
    match SystemTime::now().duration_since(modified) {
        Ok(delta) => format_duration(delta),
        Err(_) => "in the future".to_string(),
    }
}

/// Convert a duration into a compact "time ago" string.
fn format_duration(duration: Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = MINUTE * 60;
    const DAY: u64 = HOUR * 24;
    const WEEK: u64 = DAY * 7;

    let secs = duration.as_secs();
    if secs < 30 {
        "just now".to_string()
    } else if secs < MINUTE {
        format!("{secs}s ago")
    } else if secs < HOUR {
        format!("{}m ago", secs / MINUTE)
    } else if secs < DAY {
        format!("{}h ago", secs / HOUR)
    } else if secs < WEEK {
        format!("{}d ago", secs / DAY)
    } else {
        format!("{}w ago", secs / WEEK)
    }
}

/// Clamp verbose error messages to a readable length.
fn trim_error(err: &impl ToString) -> String {
    let message = err.to_string();
    if message.chars().count() <= 120 {
        return message;
    }
    let mut trimmed: String = message.chars().take(117).collect();
    trimmed.push_str("...");
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use novelsim_data::GameState;
    use tempfile::tempdir;

    fn save_in(slot: u32) -> SaveData {
        SaveData {
            id: format!("save-{slot}"),
            slot_index: slot,
            story_id: "tale".into(),
            story_title: "A Tale".into(),
            game_state: GameState {
                story_id: "tale".into(),
                current_node_id: "start".into(),
                gold: 12,
                ..GameState::default()
            },
            timestamp: 1_700_000_000,
            play_time: 61_000,
            current_node_preview: Some("Welcome.".into()),
        }
    }

    #[test]
    fn missing_directory_lists_nothing() -> Result<()> {
        let dir = tempdir()?;
        let saves = SaveDir::new(dir.path().join("missing"));
        assert!(saves.entries()?.is_empty());
        Ok(())
    }

    #[test]
    fn save_load_delete() -> Result<()> {
        let dir = tempdir()?;
        let mut saves = SaveDir::new(dir.path());
        saves.save_slot(&save_in(3))?;
        saves.save_slot(&save_in(1))?;
        assert_eq!(saves.load_slot(3)?, save_in(3));
        let listed: Vec<u32> = saves.list_slots()?.iter().map(|s| s.slot_index).collect();
        assert_eq!(listed, vec![1, 3]);
        saves.delete_slot(3)?;
        assert!(matches!(saves.load_slot(3), Err(StoreError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn corrupted_slots_are_reported_not_fatal() -> Result<()> {
        let dir = tempdir()?;
        let mut saves = SaveDir::new(dir.path());
        saves.save_slot(&save_in(1))?;
        fs::write(dir.path().join("slot_2.ron"), "this is not ron")?;
        fs::write(dir.path().join("notes.txt"), "ignore me")?;

        let entries = saves.entries()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, SaveFileStatus::Ready);
        assert!(matches!(entries[1].status, SaveFileStatus::Corrupted { .. }));
        assert_eq!(saves.list_slots()?.len(), 1);
        Ok(())
    }

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(sanitize_slug("story_12345"), "story_12345");
        assert_eq!(sanitize_slug("  My Great/Tale! "), "my-great-tale");
        assert_eq!(sanitize_slug("???"), "story");
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_secs(5)), "just now");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600)), "3h ago");
    }
}
