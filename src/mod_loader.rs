use crate::error::ModError;
use crate::game::{self, GamePaths};
use crate::locks::{IoLocks, MOD_FILES};
use crate::mod_info;
use crate::model::{
    ArchiveInfo, Mod, ModId, ModListUpdate, ModVariant, ModsFolderInfo, SmolId, StagingInfo,
};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The three storage locations variants are discovered in.
#[derive(Debug, Clone)]
pub struct ModFolders {
    pub game: GamePaths,
    pub staging_dir: PathBuf,
    pub archives_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    ModsFolder,
    Staging,
    Archives,
}

/// Scans the mod folders, merges what it finds with the previous snapshot,
/// and publishes the current mod list.
///
/// Snapshots are immutable: every pass builds fresh `Mod`/`ModVariant`
/// values and replaces the published list wholesale.
pub struct ModLoader {
    locks: Arc<IoLocks>,
    folders: ModFolders,
    published: RwLock<Option<Arc<ModListUpdate>>>,
    is_loading: AtomicBool,
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ModLoader {
    pub fn new(locks: Arc<IoLocks>, folders: ModFolders) -> Self {
        Self {
            locks,
            folders,
            published: RwLock::new(None),
            is_loading: AtomicBool::new(false),
        }
    }

    pub fn folders(&self) -> &ModFolders {
        &self.folders
    }

    /// The published mod list: absent until the first successful pass,
    /// then replaced atomically on each one.
    pub fn mods(&self) -> Option<Arc<ModListUpdate>> {
        self.published.read().clone()
    }

    /// True strictly while a reconciliation pass is running.
    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    /// Re-scans disk and publishes a fresh snapshot.
    ///
    /// Single-flight: if a pass is already running the call declines and
    /// returns the current snapshot unchanged. With `mod_ids` given, only
    /// those mods are re-read and patched into the previous list. On
    /// internal failure the previous snapshot is left untouched and `None`
    /// is returned.
    pub fn reload(&self, mod_ids: Option<&[ModId]>) -> Option<Arc<ModListUpdate>> {
        if self
            .is_loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("mod reload requested but declined; already reloading");
            return self.mods();
        }
        let _guard = LoadingGuard(&self.is_loading);

        let previous = self.mods();
        match self.reload_inner(mod_ids, previous.as_deref()) {
            Ok(update) => {
                let update = Arc::new(update);
                info!(
                    mods = update.mods.len(),
                    added = update.added.len(),
                    removed = update.removed.len(),
                    "mod list updated"
                );
                *self.published.write() = Some(Arc::clone(&update));
                Some(update)
            }
            Err(err) => {
                error!("mod reload failed, keeping previous list: {err}");
                None
            }
        }
    }

    fn reload_inner(
        &self,
        mod_ids: Option<&[ModId]>,
        previous: Option<&ModListUpdate>,
    ) -> Result<ModListUpdate, ModError> {
        let (enabled_ids, candidates) = self.locks.read(MOD_FILES, || {
            let enabled_ids = game::read_enabled_mods(&self.folders.game)?;
            let mut candidates = Vec::new();
            collect_mod_folders(&self.folders.game.mods_dir, Location::ModsFolder, &mut candidates);
            collect_mod_folders(&self.folders.staging_dir, Location::Staging, &mut candidates);
            collect_mod_folders(&self.folders.archives_dir, Location::Archives, &mut candidates);
            Ok::<_, ModError>((enabled_ids, candidates))
        })?;

        // Parse manifests in parallel; a broken manifest skips that folder
        // only, never the whole pass.
        let discovered: Vec<ModVariant> = candidates
            .par_iter()
            .filter_map(|(folder, location)| match mod_info::load_mod_folder(folder) {
                Ok(data_files) => Some(ModVariant {
                    mod_info: data_files.mod_info,
                    version_checker_info: data_files.version_checker_info,
                    mods_folder_info: (*location == Location::ModsFolder).then(|| ModsFolderInfo {
                        folder: folder.clone(),
                    }),
                    staging_info: (*location == Location::Staging).then(|| StagingInfo {
                        folder: folder.clone(),
                    }),
                    archive_info: (*location == Location::Archives).then(|| ArchiveInfo {
                        folder: folder.clone(),
                    }),
                }),
                Err(err) => {
                    debug!("skipping {folder:?}: {err}");
                    None
                }
            })
            .filter(|variant| match mod_ids {
                Some(ids) => ids.contains(&variant.mod_info.id),
                None => true,
            })
            .collect();

        // Group by mod id, merging physical copies of the same variant by
        // backfilling absent fields with the first non-null seen.
        let enabled_set: HashSet<&str> = enabled_ids.iter().map(String::as_str).collect();
        let mut by_id: HashMap<ModId, Vec<ModVariant>> = HashMap::new();
        for variant in discovered {
            let variants = by_id.entry(variant.mod_info.id.clone()).or_default();
            match variants
                .iter_mut()
                .find(|existing| existing.smol_id() == variant.smol_id())
            {
                Some(existing) => merge_variant(existing, variant),
                None => variants.push(variant),
            }
        }

        let mut reloaded: Vec<Mod> = by_id
            .into_iter()
            .map(|(id, mut variants)| {
                variants.sort_by(|a, b| a.mod_info.version.cmp(&b.mod_info.version));
                Mod {
                    is_enabled_in_game: enabled_set.contains(id.as_str()),
                    id,
                    variants,
                }
            })
            .collect();
        reloaded.sort_by(|a, b| a.id.cmp(&b.id));

        for m in &reloaded {
            let in_mods_folder = m
                .variants
                .iter()
                .filter(|variant| variant.mods_folder_info.is_some())
                .count();
            if in_mods_folder > 1 {
                warn!(
                    mod_id = %m.id,
                    copies = in_mods_folder,
                    "mod has more than one variant in the mods folder"
                );
            }
        }

        // A filtered pass patches the selected mods into the previous full
        // list instead of replacing everything.
        let mods = match mod_ids {
            None => reloaded,
            Some(ids) => {
                let mut patched: Vec<Mod> = previous
                    .map(|p| p.mods.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|m| !ids.contains(&m.id))
                    .collect();
                patched.extend(reloaded);
                patched.sort_by(|a, b| a.id.cmp(&b.id));
                patched
            }
        };

        let previous_variants: Vec<ModVariant> = previous
            .map(|p| p.mods.iter().flat_map(|m| m.variants.clone()).collect())
            .unwrap_or_default();
        let previous_ids: HashSet<SmolId> =
            previous_variants.iter().map(ModVariant::smol_id).collect();
        let current_variants: Vec<ModVariant> =
            mods.iter().flat_map(|m| m.variants.clone()).collect();
        let current_ids: HashSet<SmolId> =
            current_variants.iter().map(ModVariant::smol_id).collect();

        let added = current_variants
            .iter()
            .filter(|variant| !previous_ids.contains(&variant.smol_id()))
            .cloned()
            .collect();
        let removed = previous_variants
            .into_iter()
            .filter(|variant| !current_ids.contains(&variant.smol_id()))
            .collect();

        Ok(ModListUpdate {
            mods,
            added,
            removed,
        })
    }
}

fn collect_mod_folders(root: &PathBuf, location: Location, out: &mut Vec<(PathBuf, Location)>) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("cannot list {root:?}: {err}");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.push((path, location));
        }
    }
}

fn merge_variant(existing: &mut ModVariant, other: ModVariant) {
    if existing.mods_folder_info.is_none() {
        existing.mods_folder_info = other.mods_folder_info;
    }
    if existing.staging_info.is_none() {
        existing.staging_info = other.staging_info;
    }
    if existing.archive_info.is_none() {
        existing.archive_info = other.archive_info;
    }
    if existing.version_checker_info.is_none() {
        existing.version_checker_info = other.version_checker_info;
    }
}
