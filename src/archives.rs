use crate::error::ModError;
use crate::locks::{IoLocks, MOD_FILES, Region};
use crate::mod_info::{
    self, ModDataFiles, MOD_INFO_FILE, VERSION_CHECKER_FILE_ENDING,
};
use crate::model::variant_folder_name;
use filetime::{set_file_mtime, FileTime};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use std::{fs, io};
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// How deep to look for a manifest inside a folder or extracted archive.
/// Archives from forums routinely nest the real mod a few levels down.
pub const MANIFEST_SCAN_DEPTH: usize = 6;

/// One entry of an archive listing. `index` addresses the entry for
/// targeted extraction.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub index: usize,
    pub path: String,
    pub is_dir: bool,
}

/// Opens, probes, and extracts mod archives, and ingests mods from
/// arbitrary sources into a destination folder.
pub struct Archives {
    locks: Arc<IoLocks>,
}

impl Archives {
    pub fn new(locks: Arc<IoLocks>) -> Self {
        Self { locks }
    }

    /// Lists archive entries without extracting anything. Re-opens the
    /// archive on every call.
    pub fn list_entries(&self, archive: &Path) -> Result<Vec<ArchiveEntry>, ModError> {
        self.locks.read(&[Region::Archives], || {
            let file = fs::File::open(archive)
                .map_err(|err| ModError::io("open archive", archive, err))?;
            let mut zip = ZipArchive::new(file).map_err(|err| ModError::Parse {
                path: archive.to_path_buf(),
                message: err.to_string(),
            })?;
            let mut entries = Vec::with_capacity(zip.len());
            for index in 0..zip.len() {
                let entry = zip.by_index(index).map_err(|err| ModError::Parse {
                    path: archive.to_path_buf(),
                    message: err.to_string(),
                })?;
                entries.push(ArchiveEntry {
                    index,
                    path: entry.name().replace('\\', "/"),
                    is_dir: entry.is_dir(),
                });
            }
            Ok(entries)
        })
    }

    /// Extracts the selected entries into memory. Used to probe an archive
    /// for a valid manifest before committing to a full extraction.
    pub fn extract_entries(
        &self,
        archive: &Path,
        indices: &[usize],
    ) -> Result<HashMap<usize, Vec<u8>>, ModError> {
        self.locks.read(&[Region::Archives], || {
            let file = fs::File::open(archive)
                .map_err(|err| ModError::io("open archive", archive, err))?;
            let mut zip = ZipArchive::new(file).map_err(|err| ModError::Parse {
                path: archive.to_path_buf(),
                message: err.to_string(),
            })?;
            let mut out = HashMap::with_capacity(indices.len());
            for &index in indices {
                let mut entry = zip.by_index(index).map_err(|err| ModError::Parse {
                    path: archive.to_path_buf(),
                    message: err.to_string(),
                })?;
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                io::Read::read_to_end(&mut entry, &mut bytes)
                    .map_err(|err| ModError::io("read archive entry", archive, err))?;
                out.insert(index, bytes);
            }
            Ok(out)
        })
    }

    /// Extracts the whole archive into `dest`, creating directories as
    /// needed and overwriting existing files.
    pub fn extract_all(&self, archive: &Path, dest: &Path) -> Result<PathBuf, ModError> {
        self.locks
            .write(MOD_FILES, || extract_all_unlocked(archive, dest))
    }

    /// Unified ingestion entry point: a manifest file, a mod folder, or an
    /// archive. Places the mod into `destination_folder` (the parent of the
    /// final mod folder, for example the mods folder itself) and returns
    /// the installed mod folder.
    pub fn install_from_unknown_source(
        &self,
        input: &Path,
        destination_folder: &Path,
    ) -> Result<PathBuf, ModError> {
        info!("installing {input:?} into {destination_folder:?}");
        if !input.exists() {
            return Err(ModError::Validation(format!(
                "input does not exist: {input:?}"
            )));
        }
        if !destination_folder.exists() {
            return Err(ModError::Validation(format!(
                "destination does not exist: {destination_folder:?}"
            )));
        }

        if input.is_file() {
            let is_manifest = input
                .file_name()
                .map(|name| name.to_string_lossy().eq_ignore_ascii_case(MOD_INFO_FILE))
                .unwrap_or(false);
            if is_manifest {
                let mod_folder = input.parent().ok_or_else(|| {
                    ModError::Validation(format!("manifest has no parent folder: {input:?}"))
                })?;
                return self.copy_mod_folder(mod_folder, destination_folder);
            }
            return self.install_from_archive(input, destination_folder);
        }

        if input.is_dir() {
            let manifest = find_manifest_in_folder(input).ok_or_else(|| {
                ModError::not_found(MOD_INFO_FILE, input)
            })?;
            let mod_folder = manifest
                .parent()
                .ok_or_else(|| ModError::not_found("manifest parent folder", input))?;
            return self.copy_mod_folder(mod_folder, destination_folder);
        }

        Err(ModError::Validation(format!(
            "not recognized as file or folder: {input:?}"
        )))
    }

    /// Probes an archive for manifest and version-check entries and parses
    /// them from memory, without extracting the rest.
    pub fn find_data_files_in_archive(
        &self,
        archive: &Path,
    ) -> Result<Option<ModDataFiles>, ModError> {
        let entries = self.list_entries(archive)?;
        let manifest_entry = entries.iter().find(|entry| {
            !entry.is_dir
                && entry
                    .path
                    .rsplit('/')
                    .next()
                    .map(|name| name.eq_ignore_ascii_case(MOD_INFO_FILE))
                    .unwrap_or(false)
        });
        let Some(manifest_entry) = manifest_entry else {
            return Ok(None);
        };
        let version_entry = entries.iter().find(|entry| {
            !entry.is_dir
                && entry
                    .path
                    .to_lowercase()
                    .ends_with(VERSION_CHECKER_FILE_ENDING)
        });

        let mut wanted = vec![manifest_entry.index];
        if let Some(version_entry) = version_entry {
            wanted.push(version_entry.index);
        }
        let extracted = self.extract_entries(archive, &wanted)?;

        let manifest_bytes = extracted
            .get(&manifest_entry.index)
            .ok_or_else(|| ModError::not_found(MOD_INFO_FILE, archive))?;
        let manifest_raw = String::from_utf8_lossy(manifest_bytes);
        let mod_info = mod_info::parse_mod_info(&manifest_raw, archive)?;

        let version_checker_info = version_entry
            .and_then(|entry| extracted.get(&entry.index))
            .and_then(|bytes| {
                match mod_info::parse_version_checker(&String::from_utf8_lossy(bytes), archive) {
                    Ok(info) => Some(info),
                    Err(err) => {
                        warn!("ignoring unparseable version file in archive: {err}");
                        None
                    }
                }
            });

        Ok(Some(ModDataFiles {
            mod_info,
            version_checker_info,
        }))
    }

    fn install_from_archive(
        &self,
        archive: &Path,
        destination_folder: &Path,
    ) -> Result<PathBuf, ModError> {
        let data_files = self
            .find_data_files_in_archive(archive)?
            .ok_or_else(|| ModError::not_found(MOD_INFO_FILE, archive))?;

        // Name the mod folder after id + version so two variants of the
        // same mod never collide.
        let mod_folder = destination_folder.join(variant_folder_name(&data_files.mod_info));

        self.locks.write(MOD_FILES, || {
            // A previous partial or complete extraction is replaced, not
            // merged with; re-installing the same archive is idempotent.
            if mod_folder.exists() {
                fs::remove_dir_all(&mod_folder)
                    .map_err(|err| ModError::io("clear existing mod folder", &mod_folder, err))?;
            }
            extract_all_unlocked(archive, &mod_folder)?;
            remove_nested_folders(&mod_folder)?;
            Ok(mod_folder.clone())
        })
    }

    fn copy_mod_folder(
        &self,
        mod_folder: &Path,
        destination_folder: &Path,
    ) -> Result<PathBuf, ModError> {
        // Prefer the variant name derived from the manifest; fall back to
        // the source folder's own name when the manifest will not parse.
        let target_name = match mod_info::load_mod_folder(mod_folder) {
            Ok(data_files) => variant_folder_name(&data_files.mod_info),
            Err(err) => {
                warn!("using source folder name, manifest unusable: {err}");
                mod_folder
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .ok_or_else(|| {
                        ModError::Validation(format!("mod folder has no name: {mod_folder:?}"))
                    })?
            }
        };
        let target = destination_folder.join(target_name);

        if target == mod_folder {
            info!("not copying {mod_folder:?} onto itself");
            return Ok(target);
        }

        self.locks.write(MOD_FILES, || {
            if target.exists() {
                fs::remove_dir_all(&target)
                    .map_err(|err| ModError::io("clear existing mod folder", &target, err))?;
            }
            copy_dir_recursive(mod_folder, &target)?;
            Ok(target.clone())
        })
    }
}

/// Finds a manifest anywhere inside `folder`, up to [`MANIFEST_SCAN_DEPTH`]
/// levels down. Shallowest match wins.
pub fn find_manifest_in_folder(folder: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<(usize, PathBuf)> = Vec::new();
    for entry in WalkDir::new(folder).max_depth(MANIFEST_SCAN_DEPTH) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(MOD_INFO_FILE)
        {
            candidates.push((entry.depth(), entry.path().to_path_buf()));
        }
    }
    candidates.sort_by_key(|(depth, _)| *depth);
    candidates.into_iter().next().map(|(_, path)| path)
}

/// Rearranges an extracted archive so the manifest sits at
/// `folder/mod_info.json` instead of one or more levels deeper.
///
/// The move goes through a randomly named temp sibling: rename the inner
/// mod folder to the temp, delete the emptied outer structure, then move
/// the temp's contents up. Moving the inner folder directly onto `folder`
/// would be a directory-into-itself move and is invalid.
pub fn remove_nested_folders(folder: &Path) -> Result<(), ModError> {
    if !folder.is_dir() {
        return Err(ModError::Validation(format!(
            "not a folder: {folder:?}"
        )));
    }
    let manifest = find_manifest_in_folder(folder)
        .ok_or_else(|| ModError::not_found(MOD_INFO_FILE, folder))?;
    let inner = manifest
        .parent()
        .ok_or_else(|| ModError::not_found("manifest parent folder", folder))?;
    if inner == folder {
        // Manifest already at the top level, nothing to flatten.
        return Ok(());
    }
    debug!("flattening nested mod folder {inner:?} into {folder:?}");

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp = folder.join(format!("unnest-{nanos}"));
    fs::rename(inner, &temp).map_err(|err| ModError::io("move to temp folder", inner, err))?;

    // Delete the outer wrapper the inner folder used to live in, unless
    // the inner folder sat directly under `folder` (then the rename
    // already emptied it).
    let relative = inner
        .strip_prefix(folder)
        .map_err(|_| ModError::Validation(format!("manifest escaped {folder:?}")))?;
    if let Some(Component::Normal(outer_name)) = relative.components().next() {
        let outer = folder.join(outer_name);
        if outer != temp && outer.exists() {
            fs::remove_dir_all(&outer)
                .map_err(|err| ModError::io("remove emptied wrapper", &outer, err))?;
        }
    }

    for entry in
        fs::read_dir(&temp).map_err(|err| ModError::io("list temp folder", &temp, err))?
    {
        let entry = entry.map_err(|err| ModError::io("list temp folder", &temp, err))?;
        let target = folder.join(entry.file_name());
        if target.exists() {
            if target.is_dir() {
                fs::remove_dir_all(&target)
                    .map_err(|err| ModError::io("clear flatten target", &target, err))?;
            } else {
                fs::remove_file(&target)
                    .map_err(|err| ModError::io("clear flatten target", &target, err))?;
            }
        }
        fs::rename(entry.path(), &target)
            .map_err(|err| ModError::io("move out of temp folder", &entry.path(), err))?;
    }
    fs::remove_dir(&temp).map_err(|err| ModError::io("remove temp folder", &temp, err))?;
    Ok(())
}

fn extract_all_unlocked(archive: &Path, dest: &Path) -> Result<PathBuf, ModError> {
    let file =
        fs::File::open(archive).map_err(|err| ModError::io("open archive", archive, err))?;
    let mut zip = ZipArchive::new(file).map_err(|err| ModError::Parse {
        path: archive.to_path_buf(),
        message: err.to_string(),
    })?;
    fs::create_dir_all(dest).map_err(|err| ModError::io("create destination", dest, err))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|err| ModError::Parse {
            path: archive.to_path_buf(),
            message: err.to_string(),
        })?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };

        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|err| ModError::io("create extracted dir", &out_path, err))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ModError::io("create extracted dir", parent, err))?;
        }
        let mut out_file = fs::File::create(&out_path)
            .map_err(|err| ModError::io("write extracted file", &out_path, err))?;
        io::copy(&mut entry, &mut out_file)
            .map_err(|err| ModError::io("extract entry", &out_path, err))?;
        if let Some(dt) = entry.last_modified() {
            if let Some(mtime) = zip_time_to_unix(dt) {
                let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
            }
        }
    }

    Ok(dest.to_path_buf())
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

/// Copies a directory tree, overwriting files already present at the
/// destination.
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), ModError> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|err| ModError::Io {
            op: "walk source folder",
            path: source.to_path_buf(),
            source: err
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed")),
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| ModError::Validation(format!("walk escaped {source:?}")))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| ModError::io("create dir", &target, err))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| ModError::io("create dir", parent, err))?;
            }
            fs::copy(entry.path(), &target)
                .map_err(|err| ModError::io("copy file", &target, err))?;
        }
    }
    Ok(())
}

/// Moves a directory, falling back to copy-and-delete across filesystems.
pub fn move_dir(source: &Path, dest: &Path) -> Result<(), ModError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| ModError::io("create dir", parent, err))?;
    }
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_recursive(source, dest)?;
            fs::remove_dir_all(source)
                .map_err(|err| ModError::io("remove moved folder", source, err))
        }
    }
}
