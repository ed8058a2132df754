use crate::archives::Archives;
use crate::config::{self, AppConfig};
use crate::error::ModError;
use crate::game::{self, GamePaths};
use crate::locks::IoLocks;
use crate::mod_loader::{ModFolders, ModLoader};
use crate::model::{Mod, ModId, ModListUpdate, ModVariant, VersionCheckerInfo};
use crate::staging::Staging;
use crate::version_checker::VersionChecker;
use crate::vram::{VramCheckerCache, VramEstimate};
use anyhow::{ensure, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const VERSION_CACHE_FILE: &str = "version_cache.json";
const VRAM_CACHE_FILE: &str = "vram_cache.json";

/// Entry point wiring the collaborators together: one lock table, one
/// loader, one staging machine, the archive engine and the caches.
pub struct Access {
    archives: Archives,
    loader: Arc<ModLoader>,
    staging: Staging,
    version_checker: VersionChecker,
    vram: VramCheckerCache,
}

impl Access {
    /// Builds from the persisted app config, filling in default staging and
    /// archive paths under the app data dir when unset.
    pub fn from_config() -> Result<Self> {
        let mut config = AppConfig::load_or_create()?;
        config.check_and_set_default_paths()?;

        let game_root = config
            .game_path
            .clone()
            .context("game path is not configured; set game_path in config.json")?;
        ensure!(
            game::looks_like_game_root(&game_root),
            "{game_root:?} does not look like a game install (no mods folder)"
        );
        let staging_dir = config
            .staging_path
            .clone()
            .context("staging path missing after defaulting")?;
        let archives_dir = config
            .archives_path
            .clone()
            .context("archives path missing after defaulting")?;
        let cache_dir = config::data_dir()?;

        Ok(Self::with_paths(
            &game_root,
            &staging_dir,
            &archives_dir,
            &cache_dir,
            config.version_check_interval(),
        ))
    }

    /// Builds against explicit folders, bypassing the persisted config.
    pub fn with_paths(
        game_root: &Path,
        staging_dir: &Path,
        archives_dir: &Path,
        cache_dir: &Path,
        version_check_interval: Duration,
    ) -> Self {
        let locks = Arc::new(IoLocks::new());
        let folders = ModFolders {
            game: GamePaths::new(game_root),
            staging_dir: staging_dir.to_path_buf(),
            archives_dir: archives_dir.to_path_buf(),
        };
        let loader = Arc::new(ModLoader::new(Arc::clone(&locks), folders));
        Self {
            archives: Archives::new(Arc::clone(&locks)),
            staging: Staging::new(locks, Arc::clone(&loader)),
            loader,
            version_checker: VersionChecker::new(
                cache_dir.join(VERSION_CACHE_FILE),
                version_check_interval,
            ),
            vram: VramCheckerCache::load(&cache_dir.join(VRAM_CACHE_FILE)),
        }
    }

    pub fn mods(&self) -> Option<Arc<ModListUpdate>> {
        self.loader.mods()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn reload(&self, mod_ids: Option<&[ModId]>) -> Option<Arc<ModListUpdate>> {
        self.loader.reload(mod_ids)
    }

    /// Ingests a manifest file, mod folder or archive into the archive
    /// store, then refreshes the mod list.
    pub fn install_from_unknown_source(&self, input: &Path) -> Result<PathBuf, ModError> {
        let archives_dir = self.loader.folders().archives_dir.clone();
        let installed = self
            .archives
            .install_from_unknown_source(input, &archives_dir)?;
        info!("installed into {installed:?}");
        self.loader.reload(None);
        Ok(installed)
    }

    pub fn stage(&self, variant: &ModVariant) -> Result<PathBuf, ModError> {
        self.staging.stage(variant)
    }

    pub fn unstage(&self, subject: &Mod) -> Result<(), ModError> {
        self.staging.unstage(subject)
    }

    pub fn enable(&self, variant: &ModVariant) -> Result<PathBuf, ModError> {
        self.staging.enable(variant)
    }

    pub fn disable(&self, variant: &ModVariant) -> Result<(), ModError> {
        self.staging.disable(variant)
    }

    pub fn change_active_variant(
        &self,
        subject: &Mod,
        variant: Option<&ModVariant>,
    ) -> Result<(), ModError> {
        self.staging.change_active_variant(subject, variant)
    }

    /// Fetches remote version files for the current mod list. Returns how
    /// many lookups succeeded.
    pub fn check_for_mod_updates(&self, force: bool) -> Result<usize, ModError> {
        let mods = self
            .mods()
            .map(|list| list.mods.clone())
            .unwrap_or_default();
        self.version_checker.look_up_versions(&mods, force)
    }

    pub fn get_online_version(&self, mod_id: &str) -> Option<VersionCheckerInfo> {
        self.version_checker.get_online_version(mod_id)
    }

    pub fn vram_estimate(&self, smol_id: &str) -> Option<&VramEstimate> {
        self.vram.estimate(smol_id)
    }
}
