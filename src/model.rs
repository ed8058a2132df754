use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

pub type ModId = String;
pub type SmolId = String;

/// A mod version as written by mod authors: `major.minor.patch` with an
/// optional build/qualifier tail. Kept verbatim as entered, compared
/// component-wise so "highest version" is well-defined even when components
/// are missing (a missing component sorts below a present one).
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Version {
    raw: String,
}

impl Version {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn segments(&self) -> Vec<&str> {
        self.raw
            .split(['.', '-', '_'])
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.segments();
        let right = other.segments();
        let len = left.len().max(right.len());
        for i in 0..len {
            let ordering = match (left.get(i), right.get(i)) {
                (Some(a), Some(b)) => compare_segment(a, b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        // Segment-equal versions ("1.0" vs "1.00") still need a total order.
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        // Plain numbers sort above qualifiers like "RC3".
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// Version-check files and newer manifests write the version as an object
// with major/minor/patch fields; older manifests use a plain string.
impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        version_from_value(&value)
            .ok_or_else(|| de::Error::custom("version must be a string, number, or object"))
    }
}

pub(crate) fn version_from_value(value: &serde_json::Value) -> Option<Version> {
    match value {
        serde_json::Value::String(raw) => Some(Version::new(raw.trim())),
        serde_json::Value::Number(number) => Some(Version::new(number.to_string())),
        serde_json::Value::Object(map) => {
            let mut parts = Vec::new();
            for key in ["major", "minor", "patch", "build"] {
                match map.get(key) {
                    Some(serde_json::Value::String(part)) if !part.trim().is_empty() => {
                        parts.push(part.trim().to_string());
                    }
                    Some(serde_json::Value::Number(part)) => parts.push(part.to_string()),
                    _ => {}
                }
            }
            if parts.is_empty() {
                None
            } else {
                Some(Version::new(parts.join(".")))
            }
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<Version>,
}

/// Immutable manifest, normalized from either historical schema shape.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModInfo {
    pub id: ModId,
    pub name: String,
    pub author: String,
    pub version: Version,
    pub description: String,
    pub game_version: String,
    pub jars: Vec<String>,
    pub dependencies: Vec<Dependency>,
}

/// Optional sibling descriptor pointing at a remote copy of itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckerInfo {
    #[serde(default)]
    pub mod_version: Option<Version>,
    #[serde(default)]
    pub master_version_file: Option<String>,
    #[serde(default)]
    pub mod_thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModsFolderInfo {
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StagingInfo {
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub folder: PathBuf,
}

/// One concrete build of a mod. A location marker is present iff a copy
/// exists in that storage location; a variant with no marker at all is
/// invalid and never published.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModVariant {
    pub mod_info: ModInfo,
    pub version_checker_info: Option<VersionCheckerInfo>,
    pub mods_folder_info: Option<ModsFolderInfo>,
    pub staging_info: Option<StagingInfo>,
    pub archive_info: Option<ArchiveInfo>,
}

impl ModVariant {
    /// Composite key: mod id + version. Equality of smol ids is the sole
    /// criterion for "same variant" across reconciliation passes.
    pub fn smol_id(&self) -> SmolId {
        create_smol_id(&self.mod_info.id, &self.mod_info.version)
    }

    pub fn exists_somewhere(&self) -> bool {
        self.mods_folder_info.is_some() || self.staging_info.is_some() || self.archive_info.is_some()
    }

    /// Filesystem-safe folder name for this variant; different variants of
    /// one mod must never collide, so the smol id is part of the name.
    pub fn folder_name(&self) -> String {
        variant_folder_name(&self.mod_info)
    }
}

/// Folder name for a variant of `info`, safe for any filesystem.
pub fn variant_folder_name(info: &ModInfo) -> String {
    format!(
        "{}_{}",
        sanitize(&info.name, true),
        create_smol_id(&info.id, &info.version)
    )
}

pub fn create_smol_id(id: &str, version: &Version) -> SmolId {
    let id_part: String = sanitize(id, false).chars().take(6).collect();
    let version_part: String = sanitize(version.raw(), false).chars().take(9).collect();
    let mut hasher = blake3::Hasher::new();
    hasher.update(id.as_bytes());
    hasher.update(b"\n");
    hasher.update(version.raw().as_bytes());
    let digest = hasher.finalize();
    let hash = u32::from_le_bytes(digest.as_bytes()[..4].try_into().unwrap_or([0; 4]));
    format!("{id_part}-{version_part}-{hash}")
}

fn sanitize(raw: &str, allow_spaces: bool) -> String {
    raw.chars()
        .filter(|c| {
            c.is_ascii_alphanumeric()
                || *c == '.'
                || *c == '-'
                || *c == '_'
                || (allow_spaces && *c == ' ')
        })
        .collect()
}

/// Aggregate of all discovered variants of one mod id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Mod {
    pub id: ModId,
    pub is_enabled_in_game: bool,
    /// Ascending by version.
    pub variants: Vec<ModVariant>,
}

impl Mod {
    /// A variant is enabled iff the mod is in the game's enabled list AND
    /// the variant is physically present in the mods folder. Not "the
    /// latest": presence on disk is what counts.
    pub fn is_enabled(&self, variant: &ModVariant) -> bool {
        self.is_enabled_in_game && variant.mods_folder_info.is_some()
    }

    pub fn enabled_variants(&self) -> Vec<&ModVariant> {
        self.variants
            .iter()
            .filter(|variant| self.is_enabled(variant))
            .collect()
    }

    pub fn find_first_enabled(&self) -> Option<&ModVariant> {
        self.variants.iter().find(|variant| self.is_enabled(variant))
    }

    pub fn find_highest_version(&self) -> Option<&ModVariant> {
        self.variants
            .iter()
            .max_by(|a, b| a.mod_info.version.cmp(&b.mod_info.version))
    }

    pub fn has_enabled_variant(&self) -> bool {
        self.find_first_enabled().is_some()
    }

    pub fn variant_by_smol_id(&self, smol_id: &str) -> Option<&ModVariant> {
        self.variants
            .iter()
            .find(|variant| variant.smol_id() == smol_id)
    }
}

/// Result of one reconciliation pass. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Default)]
pub struct ModListUpdate {
    pub mods: Vec<Mod>,
    pub added: Vec<ModVariant>,
    pub removed: Vec<ModVariant>,
}

impl ModListUpdate {
    pub fn mod_by_id(&self, id: &str) -> Option<&Mod> {
        self.mods.iter().find(|m| m.id == id)
    }
}
