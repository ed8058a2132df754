use crate::error::ModError;
use crate::mod_info::strip_relaxed_json;
use crate::model::{Mod, ModId, VersionCheckerInfo};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = concat!("modstage/", env!("CARGO_PKG_VERSION"));

/// Persisted remote-version lookups, rewritten wholesale on each update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionCheckerCache {
    #[serde(default)]
    pub online_versions: HashMap<ModId, VersionCheckerInfo>,
    #[serde(default)]
    pub last_check_timestamp_ms: i64,
}

/// Fetches each mod's remote version file and caches the results.
///
/// Failures never evict: a mod whose fetch failed keeps whatever the cache
/// last held for it.
pub struct VersionChecker {
    cache_path: PathBuf,
    interval: Duration,
    cache: RwLock<VersionCheckerCache>,
}

impl VersionChecker {
    pub fn new(cache_path: PathBuf, interval: Duration) -> Self {
        let cache = load_cache(&cache_path);
        Self {
            cache_path,
            interval,
            cache: RwLock::new(cache),
        }
    }

    /// The cached remote version info for a mod, if any lookup has ever
    /// succeeded for it.
    pub fn get_online_version(&self, mod_id: &str) -> Option<VersionCheckerInfo> {
        self.cache.read().online_versions.get(mod_id).cloned()
    }

    pub fn last_check_timestamp_ms(&self) -> i64 {
        self.cache.read().last_check_timestamp_ms
    }

    /// Fetches remote version files for every mod that advertises one and
    /// merges the successes into the cache. Returns how many lookups
    /// succeeded, or 0 when the check interval has not yet elapsed and
    /// `force` is not set.
    pub fn look_up_versions(&self, mods: &[Mod], force: bool) -> Result<usize, ModError> {
        let now_ms = now_ms();
        if !force && !self.due(now_ms) {
            debug!("skipping version check; interval has not elapsed");
            return Ok(0);
        }

        let targets: Vec<(ModId, String)> = mods
            .iter()
            .filter_map(|m| {
                let url = m
                    .find_highest_version()?
                    .version_checker_info
                    .as_ref()?
                    .master_version_file
                    .clone()?;
                Some((m.id.clone(), url))
            })
            .collect();
        info!("checking remote versions for {} mods", targets.len());

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();

        let fetched: Vec<(ModId, VersionCheckerInfo)> = targets
            .par_iter()
            .filter_map(|(mod_id, url)| match fetch_version_file(&agent, url) {
                Ok(remote) => Some((mod_id.clone(), remote)),
                Err(err) => {
                    warn!(mod_id = %mod_id, "version check failed: {err}");
                    None
                }
            })
            .collect();
        let succeeded = fetched.len();

        let snapshot = {
            let mut cache = self.cache.write();
            for (mod_id, remote) in fetched {
                cache.online_versions.insert(mod_id, remote);
            }
            cache.last_check_timestamp_ms = now_ms;
            cache.clone()
        };
        save_cache(&self.cache_path, &snapshot)?;
        Ok(succeeded)
    }

    fn due(&self, now_ms: i64) -> bool {
        let elapsed_ms = now_ms.saturating_sub(self.cache.read().last_check_timestamp_ms);
        elapsed_ms >= self.interval.as_millis() as i64
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn fetch_version_file(agent: &ureq::Agent, url: &str) -> Result<VersionCheckerInfo, ModError> {
    let response = agent.get(url).call().map_err(|err| ModError::Network {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    let raw = response.into_string().map_err(|err| ModError::Network {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    // Remote version files use the same relaxed JSON dialect as manifests.
    serde_json::from_str(&strip_relaxed_json(&raw)).map_err(|err| ModError::Parse {
        path: PathBuf::from(url),
        message: err.to_string(),
    })
}

fn load_cache(path: &PathBuf) -> VersionCheckerCache {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return VersionCheckerCache::default(),
    };
    match serde_json::from_str(&raw) {
        Ok(cache) => cache,
        Err(err) => {
            warn!("discarding unreadable version cache {path:?}: {err}");
            VersionCheckerCache::default()
        }
    }
}

fn save_cache(path: &PathBuf, cache: &VersionCheckerCache) -> Result<(), ModError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ModError::io("create cache dir", parent, err))?;
    }
    let raw = serde_json::to_string_pretty(cache).map_err(|err| ModError::Parse {
        path: path.clone(),
        message: err.to_string(),
    })?;
    fs::write(path, raw).map_err(|err| ModError::io("write version cache", path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArchiveInfo, ModInfo, ModVariant, Version};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn info(version: &str) -> VersionCheckerInfo {
        VersionCheckerInfo {
            mod_version: Some(Version::new(version)),
            master_version_file: Some("https://example.invalid/mod.version".to_string()),
            mod_thread_id: None,
        }
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches").join("versions.json");
        let mut cache = VersionCheckerCache::default();
        cache.online_versions.insert("alpha".to_string(), info("2.0.0"));
        cache.last_check_timestamp_ms = 1_700_000_000_000;
        save_cache(&path, &cache).unwrap();

        let loaded = load_cache(&path);
        assert_eq!(loaded.last_check_timestamp_ms, 1_700_000_000_000);
        assert_eq!(
            loaded.online_versions["alpha"].mod_version,
            Some(Version::new("2.0.0"))
        );
    }

    #[test]
    fn unreadable_cache_is_replaced_with_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.json");
        fs::write(&path, "not json").unwrap();
        let loaded = load_cache(&path);
        assert!(loaded.online_versions.is_empty());
    }

    #[test]
    fn interval_gates_checks_until_elapsed() {
        let dir = tempfile::tempdir().unwrap();
        let checker = VersionChecker::new(
            dir.path().join("versions.json"),
            Duration::from_secs(300),
        );
        {
            let mut cache = checker.cache.write();
            cache.last_check_timestamp_ms = now_ms();
        }
        assert!(!checker.due(now_ms()));
        assert!(checker.due(now_ms() + 301 * 1000));
    }

    fn mod_with_version_url(id: &str, url: &str) -> Mod {
        Mod {
            id: id.to_string(),
            is_enabled_in_game: false,
            variants: vec![ModVariant {
                mod_info: ModInfo {
                    id: id.to_string(),
                    name: id.to_string(),
                    author: String::new(),
                    version: Version::new("1.0.0"),
                    description: String::new(),
                    game_version: String::new(),
                    jars: Vec::new(),
                    dependencies: Vec::new(),
                },
                version_checker_info: Some(VersionCheckerInfo {
                    mod_version: Some(Version::new("1.0.0")),
                    master_version_file: Some(url.to_string()),
                    mod_thread_id: None,
                }),
                mods_folder_info: None,
                staging_info: None,
                archive_info: Some(ArchiveInfo {
                    folder: PathBuf::from("/tmp/none"),
                }),
            }],
        }
    }

    /// Answers exactly one HTTP request with `body`, then shuts down.
    fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/remote.version")
    }

    #[test]
    fn successful_fetch_merges_and_failed_fetch_keeps_prior_entry() {
        let dir = tempfile::tempdir().unwrap();
        let checker = VersionChecker::new(
            dir.path().join("versions.json"),
            Duration::from_secs(300),
        );
        {
            let mut cache = checker.cache.write();
            cache.online_versions.insert("flaky".to_string(), info("1.5.0"));
        }

        // Remote version files carry the same relaxed syntax as manifests.
        let good_url = serve_once(
            "{\n  // served for testing\n  \"modVersion\": { \"major\": \"2\", \"minor\": \"0\", \"patch\": \"0\" },\n}",
        );
        let mods = [
            mod_with_version_url("good", &good_url),
            mod_with_version_url("flaky", "http://127.0.0.1:1/unreachable.version"),
        ];

        let succeeded = checker.look_up_versions(&mods, true).unwrap();
        assert_eq!(succeeded, 1);
        assert_eq!(
            checker.get_online_version("good").unwrap().mod_version,
            Some(Version::new("2.0.0"))
        );
        // The failed lookup did not evict what the cache last held.
        assert_eq!(
            checker.get_online_version("flaky").unwrap().mod_version,
            Some(Version::new("1.5.0"))
        );
        assert!(checker.last_check_timestamp_ms() > 0);
    }

    #[test]
    fn skipped_check_reports_zero_and_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let checker = VersionChecker::new(
            dir.path().join("versions.json"),
            Duration::from_secs(300),
        );
        {
            let mut cache = checker.cache.write();
            cache.last_check_timestamp_ms = now_ms();
            cache.online_versions.insert("alpha".to_string(), info("1.0.0"));
        }
        let fetched = checker.look_up_versions(&[], false).unwrap();
        assert_eq!(fetched, 0);
        assert!(checker.get_online_version("alpha").is_some());
    }
}
