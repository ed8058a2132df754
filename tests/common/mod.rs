#![allow(dead_code)]

use modstage::access::Access;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A throwaway game install with empty mods, staging and archive folders.
pub struct TestEnv {
    pub tmp: TempDir,
    pub game_root: PathBuf,
    pub mods_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub archives_dir: PathBuf,
    pub cache_dir: PathBuf,
}

pub fn setup_test_env() -> TestEnv {
    let tmp = tempfile::tempdir().unwrap();
    let game_root = tmp.path().join("game");
    let mods_dir = game_root.join("mods");
    let staging_dir = tmp.path().join("staging");
    let archives_dir = tmp.path().join("archives");
    let cache_dir = tmp.path().join("cache");
    for dir in [&mods_dir, &staging_dir, &archives_dir, &cache_dir] {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(mods_dir.join("enabled_mods.json"), r#"{"enabledMods": []}"#).unwrap();
    TestEnv {
        tmp,
        game_root,
        mods_dir,
        staging_dir,
        archives_dir,
        cache_dir,
    }
}

impl TestEnv {
    pub fn access(&self) -> Access {
        Access::with_paths(
            &self.game_root,
            &self.staging_dir,
            &self.archives_dir,
            &self.cache_dir,
            Duration::from_secs(300),
        )
    }

    pub fn set_enabled_mods(&self, ids: &[&str]) {
        let doc = serde_json::json!({ "enabledMods": ids });
        fs::write(self.mods_dir.join("enabled_mods.json"), doc.to_string()).unwrap();
    }
}

/// Manifests in the wild carry comments and trailing commas; the fixtures
/// do too so every test exercises the relaxed parser.
pub fn manifest_json(id: &str, version: &str) -> String {
    format!(
        r#"{{
    # test fixture
    "id": "{id}",
    "name": "{id} display name",
    "author": "someone", // inline comment
    "version": "{version}",
    "gameVersion": "0.97a",
}}"#
    )
}

pub fn write_mod_folder(parent: &Path, folder_name: &str, id: &str, version: &str) -> PathBuf {
    let dir = parent.join(folder_name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("mod_info.json"), manifest_json(id, version)).unwrap();
    dir
}

pub fn write_version_file(mod_folder: &Path, url: &str) {
    let raw = format!(r#"{{"masterVersionFile": "{url}"}}"#);
    fs::write(mod_folder.join("mod.version"), raw).unwrap();
}

/// Builds a zip from (entry name, contents) pairs; names ending in `/`
/// become directories.
pub fn build_archive(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(name.trim_end_matches('/'), options)
                .unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap();
}
