use crate::error::ModError;
use crate::model::{ModId, SmolId, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Estimated graphics-memory cost of one variant's image assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VramEstimate {
    pub mod_id: ModId,
    pub version: Version,
    pub bytes_for_mod: u64,
    pub image_count: u64,
}

/// Persisted VRAM estimates keyed by smol id. Rewritten wholesale, same as
/// the version cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VramCheckerCache {
    #[serde(default)]
    pub estimates: HashMap<SmolId, VramEstimate>,
}

impl VramCheckerCache {
    pub fn load(path: &PathBuf) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(cache) => cache,
            Err(err) => {
                warn!("discarding unreadable vram cache {path:?}: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<(), ModError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ModError::io("create cache dir", parent, err))?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|err| ModError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        fs::write(path, raw).map_err(|err| ModError::io("write vram cache", path, err))
    }

    pub fn estimate(&self, smol_id: &str) -> Option<&VramEstimate> {
        self.estimates.get(smol_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_survive_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vram.json");
        let mut cache = VramCheckerCache::default();
        cache.estimates.insert(
            "alpha-1.0.0-123".to_string(),
            VramEstimate {
                mod_id: "alpha".to_string(),
                version: Version::new("1.0.0"),
                bytes_for_mod: 64 * 1024 * 1024,
                image_count: 42,
            },
        );
        cache.save(&path).unwrap();

        let loaded = VramCheckerCache::load(&path);
        let estimate = loaded.estimate("alpha-1.0.0-123").unwrap();
        assert_eq!(estimate.image_count, 42);
        assert_eq!(estimate.bytes_for_mod, 64 * 1024 * 1024);
    }

    #[test]
    fn missing_cache_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = VramCheckerCache::load(&dir.path().join("not-there.json"));
        assert!(loaded.estimates.is_empty());
    }
}
