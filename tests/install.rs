mod common;

use common::{build_archive, manifest_json, setup_test_env, write_mod_folder};
use modstage::ModError;
use std::fs;

#[test]
fn installs_a_plain_mod_folder() {
    let env = setup_test_env();
    let source = write_mod_folder(env.tmp.path(), "downloaded", "alpha", "1.0.0");
    fs::write(source.join("readme.txt"), "hello").unwrap();

    let access = env.access();
    let installed = access.install_from_unknown_source(&source).unwrap();
    assert!(installed.starts_with(&env.archives_dir));
    assert!(installed.join("mod_info.json").is_file());
    assert!(installed.join("readme.txt").is_file());
    // The source folder is untouched.
    assert!(source.join("mod_info.json").is_file());

    let update = access.mods().unwrap();
    assert!(update.mod_by_id("alpha").is_some());
}

#[test]
fn installs_from_a_manifest_file_path() {
    let env = setup_test_env();
    let source = write_mod_folder(env.tmp.path(), "downloaded", "alpha", "1.0.0");

    let access = env.access();
    let installed = access
        .install_from_unknown_source(&source.join("mod_info.json"))
        .unwrap();
    assert!(installed.join("mod_info.json").is_file());
}

#[test]
fn installs_from_a_folder_with_a_nested_manifest() {
    let env = setup_test_env();
    let outer = env.tmp.path().join("download");
    let inner = outer.join("wrapper").join("alpha");
    fs::create_dir_all(&inner).unwrap();
    fs::write(inner.join("mod_info.json"), manifest_json("alpha", "1.0.0")).unwrap();

    let access = env.access();
    let installed = access.install_from_unknown_source(&outer).unwrap();
    assert!(installed.join("mod_info.json").is_file());
}

#[test]
fn installs_an_archive_and_flattens_wrapper_folders() {
    let env = setup_test_env();
    let archive = env.tmp.path().join("alpha.zip");
    let manifest = manifest_json("alpha", "1.0.0");
    build_archive(
        &archive,
        &[
            ("alpha-release/", ""),
            ("alpha-release/mod_info.json", manifest.as_str()),
            ("alpha-release/data/settings.json", "{}"),
        ],
    );

    let access = env.access();
    let installed = access.install_from_unknown_source(&archive).unwrap();
    // The wrapper folder from the zip is gone; content sits at the top.
    assert!(installed.join("mod_info.json").is_file());
    assert!(installed.join("data").join("settings.json").is_file());
    assert!(!installed.join("alpha-release").exists());

    let update = access.mods().unwrap();
    let alpha = update.mod_by_id("alpha").unwrap();
    assert!(alpha.variants[0].archive_info.is_some());
}

#[test]
fn installing_the_same_archive_twice_equals_installing_once() {
    let env = setup_test_env();
    let archive = env.tmp.path().join("alpha.zip");
    let manifest = manifest_json("alpha", "1.0.0");
    build_archive(
        &archive,
        &[
            ("wrapper/mod_info.json", manifest.as_str()),
            ("wrapper/data/file.txt", "contents"),
        ],
    );

    let access = env.access();
    let first = access.install_from_unknown_source(&archive).unwrap();
    let second = access.install_from_unknown_source(&archive).unwrap();
    assert_eq!(first, second);
    assert!(second.join("mod_info.json").is_file());
    assert!(second.join("data").join("file.txt").is_file());
    assert!(!second.join("wrapper").exists());

    let update = access.mods().unwrap();
    assert_eq!(update.mod_by_id("alpha").unwrap().variants.len(), 1);
}

#[test]
fn archive_without_a_manifest_is_rejected() {
    let env = setup_test_env();
    let archive = env.tmp.path().join("not-a-mod.zip");
    build_archive(&archive, &[("docs/readme.txt", "no manifest here")]);

    let access = env.access();
    let err = access.install_from_unknown_source(&archive).unwrap_err();
    assert!(matches!(err, ModError::NotFound { .. }));
}

#[test]
fn missing_input_is_rejected_without_touching_anything() {
    let env = setup_test_env();
    let access = env.access();
    let err = access
        .install_from_unknown_source(&env.tmp.path().join("nope.zip"))
        .unwrap_err();
    assert!(matches!(err, ModError::Validation(_)));
    assert!(fs::read_dir(&env.archives_dir).unwrap().next().is_none());
}
