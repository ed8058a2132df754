use crate::error::ModError;
use crate::model::{version_from_value, Dependency, ModInfo, Version, VersionCheckerInfo};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Manifest file name, matched case-insensitively.
pub const MOD_INFO_FILE: &str = "mod_info.json";

/// Version-check descriptors end with this; the rest of the name is free.
pub const VERSION_CHECKER_FILE_ENDING: &str = ".version";

/// Manifest plus its optional sibling version-check descriptor.
#[derive(Debug, Clone)]
pub struct ModDataFiles {
    pub mod_info: ModInfo,
    pub version_checker_info: Option<VersionCheckerInfo>,
}

// Older manifests carry the version as a plain string and no format tag.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyManifest {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    author: Option<String>,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    game_version: Option<String>,
    #[serde(default)]
    jars: Vec<String>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

// Newer manifests write the version as a major/minor/patch object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredManifest {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    author: Option<String>,
    version: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    game_version: Option<String>,
    #[serde(default)]
    jars: Vec<String>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// Parses a manifest, accepting both historical schema shapes.
///
/// The schema is picked by probing whether `version` is an object or a
/// scalar; old files carry no declared format version to dispatch on.
pub fn parse_mod_info(raw: &str, path: &Path) -> Result<ModInfo, ModError> {
    let sanitized = strip_relaxed_json(raw);
    let value: Value = serde_json::from_str(&sanitized).map_err(|err| ModError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let is_structured = value
        .get("version")
        .map(Value::is_object)
        .unwrap_or(false);

    let info = if is_structured {
        let manifest: StructuredManifest =
            serde_json::from_value(value).map_err(|err| ModError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let version = version_from_value(&manifest.version).ok_or_else(|| ModError::Parse {
            path: path.to_path_buf(),
            message: "version object has no usable components".to_string(),
        })?;
        normalize(
            manifest.id,
            manifest.name,
            manifest.author,
            version,
            manifest.description,
            manifest.game_version,
            manifest.jars,
            manifest.dependencies,
        )
    } else {
        let manifest: LegacyManifest =
            serde_json::from_value(value).map_err(|err| ModError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let version = Version::new(manifest.version.trim());
        normalize(
            manifest.id,
            manifest.name,
            manifest.author,
            version,
            manifest.description,
            manifest.game_version,
            manifest.jars,
            manifest.dependencies,
        )
    };

    if info.id.trim().is_empty() {
        return Err(ModError::Parse {
            path: path.to_path_buf(),
            message: "manifest has an empty id".to_string(),
        });
    }

    Ok(info)
}

#[allow(clippy::too_many_arguments)]
fn normalize(
    id: String,
    name: Option<String>,
    author: Option<String>,
    version: Version,
    description: Option<String>,
    game_version: Option<String>,
    jars: Vec<String>,
    dependencies: Vec<Dependency>,
) -> ModInfo {
    let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| id.clone());
    ModInfo {
        id,
        name,
        author: author.unwrap_or_default(),
        version,
        description: description.unwrap_or_default(),
        game_version: game_version.unwrap_or_default(),
        jars,
        dependencies,
    }
}

/// Parses a version-check descriptor (local sibling file or a fetched
/// remote copy). Same relaxed syntax as manifests.
pub fn parse_version_checker(raw: &str, path: &Path) -> Result<VersionCheckerInfo, ModError> {
    let sanitized = strip_relaxed_json(raw);
    serde_json::from_str(&sanitized).map_err(|err| ModError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Finds the manifest directly inside a mod folder (not recursive).
pub fn find_manifest(folder: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(folder).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path
            .file_name()
            .map(|name| name.to_string_lossy().eq_ignore_ascii_case(MOD_INFO_FILE))
            .unwrap_or(false)
        {
            return Some(path);
        }
    }
    None
}

fn find_version_checker_file(folder: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(folder).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(VERSION_CHECKER_FILE_ENDING) {
            return Some(path);
        }
    }
    None
}

/// Loads the manifest (required) and version-check file (optional, failure
/// tolerated) from one mod folder.
pub fn load_mod_folder(folder: &Path) -> Result<ModDataFiles, ModError> {
    let manifest_path = find_manifest(folder)
        .ok_or_else(|| ModError::not_found(MOD_INFO_FILE, folder))?;
    let raw = fs::read_to_string(&manifest_path)
        .map_err(|err| ModError::io("read manifest", &manifest_path, err))?;
    let mod_info = parse_mod_info(&raw, &manifest_path)?;

    let version_checker_info = find_version_checker_file(folder).and_then(|path| {
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("could not read version file {path:?}: {err}");
                return None;
            }
        };
        match parse_version_checker(&raw, &path) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!("ignoring unparseable version file: {err}");
                None
            }
        }
    });

    debug!(
        id = %mod_info.id,
        version = %mod_info.version,
        "loaded manifest from {folder:?}"
    );
    Ok(ModDataFiles {
        mod_info,
        version_checker_info,
    })
}

/// Strips the legacy format's relaxed syntax so serde_json can parse it:
/// `//` and `#` line comments, `/* */` block comments, and trailing commas.
/// String contents are left untouched.
pub fn strip_relaxed_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => {
                skip_line(&mut chars);
                out.push('\n');
            }
            '/' => match chars.peek() {
                Some('/') => {
                    skip_line(&mut chars);
                    out.push('\n');
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    strip_trailing_commas(&out)
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn strip_trailing_commas(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            // Consume escapes pairwise; peeking backwards misreads a string
            // that ends in an escaped backslash.
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 2;
                    continue;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        # A mod for testing.
        "id": "lw_lazylib", // comments everywhere
        "name": "LazyLib",
        "author": "LazyWizard",
        "version": "2.7b",
        "gameVersion": "0.95.1a-RC6",
        "jars": ["jars/LazyLib.jar",],
        "dependencies": [],
    }"#;

    const STRUCTURED: &str = r#"{
        "id": "lw_lazylib",
        "name": "LazyLib",
        "author": "LazyWizard",
        /* the new shape */
        "version": { "major": "2", "minor": "7", "patch": "b" },
        "gameVersion": "0.95.1a-RC6"
    }"#;

    #[test]
    fn parses_legacy_schema() {
        let info = parse_mod_info(LEGACY, Path::new("mod_info.json")).unwrap();
        assert_eq!(info.id, "lw_lazylib");
        assert_eq!(info.version.raw(), "2.7b");
        assert_eq!(info.jars, vec!["jars/LazyLib.jar".to_string()]);
    }

    #[test]
    fn parses_structured_schema() {
        let info = parse_mod_info(STRUCTURED, Path::new("mod_info.json")).unwrap();
        assert_eq!(info.id, "lw_lazylib");
        assert_eq!(info.version.raw(), "2.7.b");
    }

    #[test]
    fn both_schemas_yield_the_same_identity() {
        let legacy = parse_mod_info(LEGACY, Path::new("a")).unwrap();
        let structured = parse_mod_info(STRUCTURED, Path::new("b")).unwrap();
        assert_eq!(legacy.id, structured.id);
        assert_eq!(legacy.name, structured.name);
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = parse_mod_info(r#"{"id": " ", "version": "1.0"}"#, Path::new("x"));
        assert!(err.is_err());
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let raw = r#"{"id": "a//b", "version": "1.0", "description": "see http://example.com /*not a comment*/"}"#;
        let info = parse_mod_info(raw, Path::new("x")).unwrap();
        assert_eq!(info.id, "a//b");
        assert!(info.description.contains("http://example.com"));
    }

    #[test]
    fn string_ending_in_escaped_backslash_does_not_swallow_the_closing_quote() {
        // Windows paths on the wire end in `\\"`; the character before the
        // closing quote is a backslash, but an escaped one.
        let raw = r#"{
            "id": "a",
            "description": "C:\\mods\\",
            "version": "1.0",
        }"#;
        let info = parse_mod_info(raw, Path::new("x")).unwrap();
        assert_eq!(info.description, r"C:\mods\");
        assert_eq!(info.version.raw(), "1.0");
    }

    #[test]
    fn trailing_commas_are_tolerated_in_nested_structures() {
        let raw = r#"{"id": "a", "version": "1.0", "dependencies": [{"id": "b",},],}"#;
        let info = parse_mod_info(raw, Path::new("x")).unwrap();
        assert_eq!(info.dependencies.len(), 1);
        assert_eq!(info.dependencies[0].id, "b");
    }

    #[test]
    fn parses_version_checker_descriptor() {
        let raw = r#"{
            "masterVersionFile": "https://example.com/mod.version",
            "modThreadId": "12345",
            "modVersion": { "major": 1, "minor": 2, "patch": 0 }
        }"#;
        let info = parse_version_checker(raw, Path::new("mod.version")).unwrap();
        assert_eq!(
            info.master_version_file.as_deref(),
            Some("https://example.com/mod.version")
        );
        assert_eq!(info.mod_version.unwrap().raw(), "1.2.0");
    }
}
