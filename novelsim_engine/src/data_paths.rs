//! Locating the runtime data directory (name templates, generator config).
//!
//! `NOVELSIM_DATA_DIR` wins when set. Otherwise the first existing candidate among the
//! workspace layout, a flattened `data/` directory, and the same two next to the binary.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Environment variable that overrides data directory discovery.
pub const DATA_DIR_VAR: &str = "NOVELSIM_DATA_DIR";

static DATA_ROOT: LazyLock<PathBuf> = LazyLock::new(|| detect_data_root(env::var_os(DATA_DIR_VAR).map(PathBuf::from)));

/// Construct a data path relative to the resolved data root.
pub fn data_path(relative: impl AsRef<Path>) -> PathBuf {
    DATA_ROOT.join(relative)
}

fn detect_data_root(overridden: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = overridden {
        return dir;
    }
    let mut candidates = vec![PathBuf::from("novelsim_engine/data"), PathBuf::from("data")];

    if let Ok(exe_path) = env::current_exe()
        && let Some(dir) = exe_path.parent()
    {
        candidates.push(dir.join("novelsim_engine/data"));
        candidates.push(dir.join("data"));
        if let Some(parent) = dir.parent() {
            candidates.push(parent.join("novelsim_engine/data"));
            candidates.push(parent.join("data"));
        }
    }

    candidates
        .into_iter()
        .find(|candidate| candidate.join("names.toml").is_file())
        .unwrap_or_else(|| PathBuf::from("novelsim_engine/data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let dir = PathBuf::from("/opt/novelsim/data");
        assert_eq!(detect_data_root(Some(dir.clone())), dir);
    }

    #[test]
    fn finds_bundled_names() {
        // tests run from the crate directory, where `data/names.toml` ships
        let root = detect_data_root(None);
        assert!(root.join("names.toml").is_file(), "resolved {}", root.display());
    }
}
