use crate::archives::{copy_dir_recursive, move_dir};
use crate::error::ModError;
use crate::locks::{IoLocks, MOD_FILES, Region};
use crate::mod_loader::ModLoader;
use crate::model::{Mod, ModId, ModVariant};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Moves variant folders between the archive, staging and mods locations.
///
/// The game's enabled-mods list is never written here; a variant counts as
/// enabled when its mod is in that list and its folder sits in the mods
/// folder, so every transition is a directory move.
pub struct Staging {
    locks: Arc<IoLocks>,
    loader: Arc<ModLoader>,
}

/// Fires a filtered reconciliation pass when dropped, so disk state and the
/// published list are brought back in line on every exit path.
struct ReloadOnExit<'a> {
    loader: &'a ModLoader,
    mod_id: ModId,
}

impl Drop for ReloadOnExit<'_> {
    fn drop(&mut self) {
        let _ = self.loader.reload(Some(std::slice::from_ref(&self.mod_id)));
    }
}

impl Staging {
    pub fn new(locks: Arc<IoLocks>, loader: Arc<ModLoader>) -> Self {
        Self { locks, loader }
    }

    fn reload_on_exit(&self, mod_id: &str) -> ReloadOnExit<'_> {
        ReloadOnExit {
            loader: &self.loader,
            mod_id: mod_id.to_string(),
        }
    }

    fn mods_path_for(&self, variant: &ModVariant) -> PathBuf {
        variant
            .mods_folder_info
            .as_ref()
            .map(|marker| marker.folder.clone())
            .unwrap_or_else(|| {
                self.loader
                    .folders()
                    .game
                    .mods_dir
                    .join(variant.folder_name())
            })
    }

    fn staging_path_for(&self, variant: &ModVariant) -> PathBuf {
        variant
            .staging_info
            .as_ref()
            .map(|marker| marker.folder.clone())
            .unwrap_or_else(|| {
                self.loader
                    .folders()
                    .staging_dir
                    .join(variant.folder_name())
            })
    }

    /// Copies a variant from its archive folder into staging. No-op when a
    /// staged copy already exists.
    pub fn stage(&self, variant: &ModVariant) -> Result<PathBuf, ModError> {
        let _reload = self.reload_on_exit(&variant.mod_info.id);
        self.locks.write(MOD_FILES, || {
            let staging_path = self.staging_path_for(variant);
            if staging_path.exists() {
                debug!("already staged at {staging_path:?}");
                return Ok(staging_path);
            }
            let archive_folder = variant
                .archive_info
                .as_ref()
                .map(|marker| marker.folder.clone())
                .filter(|folder| folder.exists())
                .ok_or_else(|| {
                    ModError::Validation(format!(
                        "no archive copy of {} to stage from",
                        variant.smol_id()
                    ))
                })?;
            info!("staging {} from {archive_folder:?}", variant.smol_id());
            copy_dir_recursive(&archive_folder, &staging_path)?;
            Ok(staging_path)
        })
    }

    /// Removes the staging copies of every variant of `mod_to_unstage`.
    ///
    /// Refused while any variant is enabled. A staged variant without an
    /// archive copy is kept and a warning logged; deleting it would destroy
    /// the last copy.
    pub fn unstage(&self, mod_to_unstage: &Mod) -> Result<(), ModError> {
        let _reload = self.reload_on_exit(&mod_to_unstage.id);
        if mod_to_unstage.has_enabled_variant() {
            return Err(ModError::Validation(format!(
                "cannot unstage '{}' while a variant is enabled",
                mod_to_unstage.id
            )));
        }
        self.locks.write(&[Region::Staging], || {
            for variant in &mod_to_unstage.variants {
                let staging_path = self.staging_path_for(variant);
                if !staging_path.exists() {
                    continue;
                }
                if variant.archive_info.is_none() {
                    warn!(
                        "keeping staged {}: it has no archive copy",
                        variant.smol_id()
                    );
                    continue;
                }
                info!("removing staged copy {staging_path:?}");
                fs::remove_dir_all(&staging_path)
                    .map_err(|err| ModError::io("remove staged copy", &staging_path, err))?;
            }
            Ok(())
        })
    }

    /// Moves a staged variant into the mods folder, first moving any other
    /// variant of the same mod out of it.
    pub fn enable(&self, variant: &ModVariant) -> Result<PathBuf, ModError> {
        let _reload = self.reload_on_exit(&variant.mod_info.id);
        let siblings = self.known_variants_of(&variant.mod_info.id);
        self.locks.write(MOD_FILES, || {
            for sibling in &siblings {
                if sibling.smol_id() != variant.smol_id() {
                    self.disable_in_lock(sibling)?;
                }
            }
            self.enable_in_lock(variant)
        })
    }

    /// Moves a variant out of the mods folder, back into staging. No-op when
    /// the variant is not physically in the mods folder.
    pub fn disable(&self, variant: &ModVariant) -> Result<(), ModError> {
        let _reload = self.reload_on_exit(&variant.mod_info.id);
        self.locks
            .write(MOD_FILES, || self.disable_in_lock(variant))
    }

    /// Makes `variant` the only variant of `subject` in the mods folder, or
    /// empties the mods folder of the mod entirely when `None`.
    pub fn change_active_variant(
        &self,
        subject: &Mod,
        variant: Option<&ModVariant>,
    ) -> Result<(), ModError> {
        let _reload = self.reload_on_exit(&subject.id);
        if let Some(target) = variant {
            if target.mod_info.id != subject.id {
                return Err(ModError::Validation(format!(
                    "variant {} does not belong to mod '{}'",
                    target.smol_id(),
                    subject.id
                )));
            }
            let enabled = subject.enabled_variants();
            if enabled.len() == 1 && enabled[0].smol_id() == target.smol_id() {
                debug!("{} is already the sole active variant", target.smol_id());
                return Ok(());
            }
        }
        self.locks.write(MOD_FILES, || {
            // Disk state is checked again here rather than trusting the
            // snapshot the caller selected from; another pass may have run
            // in between.
            for existing in &subject.variants {
                let is_target = variant
                    .map(|target| target.smol_id() == existing.smol_id())
                    .unwrap_or(false);
                if !is_target {
                    self.disable_in_lock(existing)?;
                }
            }
            match variant {
                Some(target) => self.enable_in_lock(target).map(|_| ()),
                None => Ok(()),
            }
        })
    }

    fn known_variants_of(&self, mod_id: &str) -> Vec<ModVariant> {
        self.loader
            .mods()
            .and_then(|list| list.mod_by_id(mod_id).map(|m| m.variants.clone()))
            .unwrap_or_default()
    }

    fn enable_in_lock(&self, variant: &ModVariant) -> Result<PathBuf, ModError> {
        let mods_path = self.mods_path_for(variant);
        if mods_path.exists() {
            debug!("{} is already in the mods folder", variant.smol_id());
            return Ok(mods_path);
        }
        let staging_path = self.staging_path_for(variant);
        if !staging_path.exists() {
            return Err(ModError::Validation(format!(
                "no staged copy of {} to enable",
                variant.smol_id()
            )));
        }
        info!("moving {staging_path:?} into the mods folder");
        move_dir(&staging_path, &mods_path)?;
        Ok(mods_path)
    }

    fn disable_in_lock(&self, variant: &ModVariant) -> Result<(), ModError> {
        let mods_path = self.mods_path_for(variant);
        if !mods_path.exists() {
            return Ok(());
        }
        let staging_path = self.staging_path_for(variant);
        if staging_path.exists() {
            info!("removing {mods_path:?}; a staged copy already exists");
            fs::remove_dir_all(&mods_path)
                .map_err(|err| ModError::io("remove mods folder copy", &mods_path, err))?;
        } else {
            info!("moving {mods_path:?} back to staging");
            move_dir(&mods_path, &staging_path)?;
        }
        Ok(())
    }
}
