use crate::error::ModError;
use crate::mod_info::strip_relaxed_json;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The game's own list of enabled mod ids, maintained by the game process.
/// This file lives in the mods folder and is read-only to us.
pub const ENABLED_MODS_FILE: &str = "enabled_mods.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnabledModsFile {
    #[serde(default)]
    enabled_mods: Vec<String>,
}

/// Resolved locations inside one game install.
#[derive(Debug, Clone)]
pub struct GamePaths {
    pub game_root: PathBuf,
    pub mods_dir: PathBuf,
}

impl GamePaths {
    pub fn new(game_root: impl Into<PathBuf>) -> Self {
        let game_root = game_root.into();
        let mods_dir = game_root.join("mods");
        Self {
            game_root,
            mods_dir,
        }
    }

    pub fn enabled_mods_path(&self) -> PathBuf {
        self.mods_dir.join(ENABLED_MODS_FILE)
    }
}

/// A path looks like a game root when it has a mods folder inside it.
/// Deliberately loose; the config layer can override.
pub fn looks_like_game_root(path: &Path) -> bool {
    path.is_dir() && path.join("mods").is_dir()
}

/// Reads the game's enabled-mod-id list. A missing file means an untouched
/// install: nothing enabled.
pub fn read_enabled_mods(paths: &GamePaths) -> Result<Vec<String>, ModError> {
    let path = paths.enabled_mods_path();
    if !path.exists() {
        warn!("no {ENABLED_MODS_FILE} at {path:?}, treating all mods as disabled");
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path)
        .map_err(|err| ModError::io("read enabled mods list", &path, err))?;
    let sanitized = strip_relaxed_json(&raw);
    let parsed: EnabledModsFile =
        serde_json::from_str(&sanitized).map_err(|err| ModError::Parse {
            path,
            message: err.to_string(),
        })?;
    Ok(parsed.enabled_mods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_list_means_nothing_enabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mods")).unwrap();
        let paths = GamePaths::new(dir.path());
        assert!(read_enabled_mods(&paths).unwrap().is_empty());
    }

    #[test]
    fn reads_relaxed_list() {
        let dir = tempfile::tempdir().unwrap();
        let mods = dir.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        fs::write(
            mods.join(ENABLED_MODS_FILE),
            "{\n  // written by the game\n  \"enabledMods\": [\"alpha\", \"beta\",]\n}",
        )
        .unwrap();
        let paths = GamePaths::new(dir.path());
        assert_eq!(read_enabled_mods(&paths).unwrap(), vec!["alpha", "beta"]);
    }
}
