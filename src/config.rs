use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

const DEFAULT_VERSION_CHECK_INTERVAL_SECS: u64 = 60 * 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root of the game install; its `mods` subfolder is the active folder.
    pub game_path: Option<PathBuf>,
    /// Where disabled-but-installed variants live.
    pub staging_path: Option<PathBuf>,
    /// Long-term store for variants not currently staged.
    pub archives_path: Option<PathBuf>,
    #[serde(default = "default_check_interval_secs")]
    pub version_check_interval_secs: u64,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig {
            game_path: None,
            staging_path: None,
            archives_path: None,
            version_check_interval_secs: DEFAULT_VERSION_CHECK_INTERVAL_SECS,
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let base_dir = base_data_dir()?;
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    /// Fills in staging and archive paths under the app data dir when the
    /// configured ones are missing or gone from disk.
    pub fn check_and_set_default_paths(&mut self) -> Result<()> {
        let base_dir = base_data_dir()?;

        let staging_missing = self
            .staging_path
            .as_ref()
            .map(|path| !path.exists())
            .unwrap_or(true);
        if staging_missing {
            self.staging_path = Some(base_dir.join("staging"));
        }

        let archives_missing = self
            .archives_path
            .as_ref()
            .map(|path| !path.exists())
            .unwrap_or(true);
        if archives_missing {
            self.archives_path = Some(base_dir.join("archives"));
        }

        if let Some(staging) = &self.staging_path {
            fs::create_dir_all(staging).context("create staging dir")?;
        }
        if let Some(archives) = &self.archives_path {
            fs::create_dir_all(archives).context("create archives dir")?;
        }

        self.save()
    }

    pub fn version_check_interval(&self) -> Duration {
        Duration::from_secs(self.version_check_interval_secs)
    }
}

pub fn data_dir() -> Result<PathBuf> {
    base_data_dir()
}

fn default_check_interval_secs() -> u64 {
    DEFAULT_VERSION_CHECK_INTERVAL_SECS
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("modstage"))
}
