use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::config_directory;
use crate::error::{AppError, AppResult};

const CACHE_FILE_NAME: &str = "sync_cursors.json";
const CACHE_LIMIT: usize = 512;

#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<CacheEntry>,
}

#[derive(Serialize, Deserialize, Clone)]
struct CacheEntry {
    key: String,
    cursor: SyncCursor,
}

/// Newest delivered event time for one issue, plus the fingerprints of the
/// events delivered at exactly that time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub since: DateTime<Utc>,
    #[serde(default)]
    pub delivered: BTreeSet<String>,
}

pub struct SyncCursorCache {
    file_path: PathBuf,
    file: CacheFile,
}

impl SyncCursorCache {
    pub fn load() -> AppResult<Self> {
        let dir = config_directory()?;
        Self::load_from(&dir.join(CACHE_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let file = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<CacheFile>(&contents)
                .map_err(|err| AppError::Configuration(format!("invalid cursor file: {err}")))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(err) => return Err(AppError::Io(err)),
        };

        Ok(Self {
            file_path: path.to_path_buf(),
            file,
        })
    }

    pub fn get(&self, key: &str) -> Option<&SyncCursor> {
        self.file
            .entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.cursor)
    }

    pub fn insert(&mut self, key: String, cursor: SyncCursor) {
        self.file.entries.retain(|entry| entry.key != key);
        self.file.entries.push(CacheEntry { key, cursor });

        if self.file.entries.len() > CACHE_LIMIT {
            let overflow = self.file.entries.len() - CACHE_LIMIT;
            self.file.entries.drain(0..overflow);
        }
    }

    pub fn save(&self) -> AppResult<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.file)
            .map_err(|err| AppError::Configuration(format!("failed to write cursors: {err}")))?;
        fs::write(&self.file_path, data)?;
        Ok(())
    }

    /// Cursors are scoped to the game project so the same tracker key mapped
    /// into two projects does not share one.
    pub fn compute_key(project_id: &uuid::Uuid, issue_id: &str) -> String {
        format!("{project_id}/{issue_id}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn cursor(hour: u32, fingerprints: &[&str]) -> SyncCursor {
        SyncCursor {
            since: Utc.with_ymd_and_hms(2024, 5, 6, hour, 0, 0).unwrap(),
            delivered: fingerprints.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SyncCursorCache::load_from(&dir.path().join("cursors.json")).unwrap();
        assert!(cache.get("anything").is_none());
    }

    #[test]
    fn persists_and_reloads_cursors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cursors.json");

        let mut cache = SyncCursorCache::load_from(&path).unwrap();
        cache.insert("p/SG-1".to_string(), cursor(9, &["a"]));
        cache.insert("p/SG-1".to_string(), cursor(10, &["b", "c"]));
        cache.save().unwrap();

        let reloaded = SyncCursorCache::load_from(&path).unwrap();
        assert_eq!(reloaded.get("p/SG-1"), Some(&cursor(10, &["b", "c"])));
    }

    #[test]
    fn evicts_oldest_entries_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SyncCursorCache::load_from(&dir.path().join("c.json")).unwrap();
        for index in 0..=CACHE_LIMIT {
            cache.insert(format!("p/SG-{index}"), cursor(9, &[]));
        }
        assert!(cache.get("p/SG-0").is_none());
        assert!(cache.get(&format!("p/SG-{CACHE_LIMIT}")).is_some());
    }

    #[test]
    fn rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursors.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SyncCursorCache::load_from(&path),
            Err(AppError::Configuration(_))
        ));
    }
}
