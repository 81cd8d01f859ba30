//! File-backed catalog store
//!
//! Persists one JSON document per provider and catalog key, stamped with the
//! time it was written, so stale entries can be found and evicted by a scan.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{CatalogRecord, Provider};

/// Sub-directory holding one document per record
const RECORDS_DIR: &str = "records";

/// Sub-directory holding one document per name alias
const ALIASES_DIR: &str = "aliases";

/// Errors raised by the local store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read/write failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be encoded or decoded
    #[error("Corrupt cache entry '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistent store of catalog records keyed by provider and catalog key
///
/// Each provider has its own key space: the same key string from two
/// providers names two unrelated entries. Every operation is single-key or
/// a full scan; implementations only need per-entry atomicity.
pub trait CacheStore: Send + Sync {
    /// Returns the record `provider` stored under `key`, if any
    fn get(&self, provider: Provider, key: &str) -> Result<Option<CatalogRecord>, StoreError>;

    /// Inserts or replaces the record under `record.provider` and
    /// `record.key`, stamping `last_refreshed` with the current time.
    /// Returns the stored copy.
    fn put(&self, record: CatalogRecord) -> Result<CatalogRecord, StoreError>;

    /// Removes the record under `provider` and `key`; absent keys are not an
    /// error
    fn delete(&self, provider: Provider, key: &str) -> Result<(), StoreError>;

    /// Every record whose `last_refreshed` is strictly before `older_than`
    fn list_stale(&self, older_than: DateTime<Utc>) -> Result<Vec<CatalogRecord>, StoreError>;

    /// Removes every record whose `last_refreshed` is strictly before
    /// `older_than` and returns how many were removed
    fn delete_stale(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Catalog key previously resolved for a free-text name. Names are
    /// always resolved by one provider, so the key is in its key space.
    fn alias(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Records that `name` resolved to `key`
    fn set_alias(&self, name: &str, key: &str) -> Result<(), StoreError>;
}

/// Alias document stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct AliasEntry {
    name: String,
    key: String,
}

/// Stores records as JSON files in a cache directory
///
/// Layout: `<dir>/records/<provider>.<encoded key>.json` and
/// `<dir>/aliases/<encoded name>.json`. Writes land in a temporary file that
/// is renamed into place, so readers never observe a partial document.
#[derive(Debug)]
pub struct FileStore {
    cache_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Creates a FileStore in the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/gamecache/` on Linux, or the platform equivalent.
    /// Returns `None` if no home directory can be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "gamecache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn record_path(&self, provider: Provider, key: &str) -> PathBuf {
        self.cache_dir.join(RECORDS_DIR).join(format!(
            "{}.{}.json",
            provider.as_str(),
            encode_file_stem(key)
        ))
    }

    fn alias_path(&self, name: &str) -> PathBuf {
        self.cache_dir
            .join(ALIASES_DIR)
            .join(format!("{}.json", encode_file_stem(&normalize_name(name))))
    }

    /// Writes `contents` to `path` via a sibling temp file and rename
    fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StoreError> {
        let dir = path
            .parent()
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"))?;
        fs::create_dir_all(dir)?;

        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".tmp-{}-{}", std::process::id(), seq));
        fs::write(&tmp, contents)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads and decodes a record file; missing files are `None`
    fn read_record(&self, path: &Path, key: &str) -> Result<Option<CatalogRecord>, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(record))
    }

    /// Walks every record file, yielding (path, record)
    ///
    /// Files that vanish mid-scan are skipped. Undecodable files are logged
    /// and skipped so one bad entry cannot block maintenance.
    fn scan(&self) -> Result<Vec<(PathBuf, CatalogRecord)>, StoreError> {
        let dir = self.cache_dir.join(RECORDS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let label = path.display().to_string();
            match self.read_record(&path, &label) {
                Ok(Some(record)) => records.push((path, record)),
                Ok(None) => {}
                Err(StoreError::Corrupt { key, source }) => {
                    warn!(file = %key, error = %source, "skipping unreadable cache entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

impl CacheStore for FileStore {
    fn get(&self, provider: Provider, key: &str) -> Result<Option<CatalogRecord>, StoreError> {
        self.read_record(&self.record_path(provider, key), key)
    }

    fn put(&self, mut record: CatalogRecord) -> Result<CatalogRecord, StoreError> {
        record.last_refreshed = Some(Utc::now());

        let json = serde_json::to_string_pretty(&record).map_err(|source| StoreError::Corrupt {
            key: record.key.clone(),
            source,
        })?;
        self.write_atomic(&self.record_path(record.provider, &record.key), &json)?;

        debug!(provider = %record.provider, key = %record.key, "stored catalog record");
        Ok(record)
    }

    fn delete(&self, provider: Provider, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(provider, key)) {
            Ok(()) => {
                debug!(%provider, key, "deleted catalog record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_stale(&self, older_than: DateTime<Utc>) -> Result<Vec<CatalogRecord>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| is_older_than(record, older_than))
            .collect())
    }

    fn delete_stale(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for (path, record) in self.scan()? {
            if !is_older_than(&record, older_than) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(removed, "deleted stale catalog records");
        Ok(removed)
    }

    fn alias(&self, name: &str) -> Result<Option<String>, StoreError> {
        let content = match fs::read_to_string(self.alias_path(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: AliasEntry =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                key: name.to_string(),
                source,
            })?;
        Ok(Some(entry.key))
    }

    fn set_alias(&self, name: &str, key: &str) -> Result<(), StoreError> {
        let entry = AliasEntry {
            name: normalize_name(name),
            key: key.to_string(),
        };
        let json = serde_json::to_string(&entry).map_err(|source| StoreError::Corrupt {
            key: name.to_string(),
            source,
        })?;
        self.write_atomic(&self.alias_path(name), &json)
    }
}

/// Records without a timestamp count as infinitely old
fn is_older_than(record: &CatalogRecord, threshold: DateTime<Utc>) -> bool {
    record
        .last_refreshed
        .map_or(true, |refreshed| refreshed < threshold)
}

/// Case- and whitespace-insensitive form of a free-text name
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Percent-encodes everything outside `[A-Za-z0-9_-]`
///
/// Injective, so distinct keys never share a file, and never produces
/// path separators or dots. The provider prefix in a file name therefore
/// ends at the first dot.
fn encode_file_stem(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::fixtures::sample_record;
    use std::thread;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_put_creates_file_in_records_directory() {
        let (store, temp_dir) = create_test_store();
        store
            .put(sample_record("com.example.farm", "Farm"))
            .expect("Put should succeed");

        let expected = temp_dir
            .path()
            .join("records")
            .join("storefront.com%2Eexample%2Efarm.json");
        assert!(expected.exists(), "Record file should exist");

        let content = fs::read_to_string(&expected).expect("Should read file");
        assert!(content.contains("\"title\": \"Farm\""));
        assert!(content.contains("\"last_refreshed\""));
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get(Provider::Storefront, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_put_then_get_round_trips_all_fields() {
        let (store, _temp_dir) = create_test_store();
        let original = sample_record("com.example.farm", "Farm");

        let stored = store.put(original.clone()).expect("Put should succeed");
        let mut loaded = store
            .get(Provider::Storefront, "com.example.farm")
            .unwrap()
            .expect("Record should exist");

        assert_eq!(loaded.last_refreshed, stored.last_refreshed);
        loaded.last_refreshed = None;
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_put_stamps_last_refreshed_and_ignores_caller_value() {
        let (store, _temp_dir) = create_test_store();
        let mut record = sample_record("com.example.farm", "Farm");
        record.last_refreshed = Some(Utc::now() - chrono::Duration::days(30));

        let before = Utc::now();
        let stored = store.put(record).unwrap();
        let after = Utc::now();

        let refreshed = stored.last_refreshed.expect("put should stamp the record");
        assert!(refreshed >= before);
        assert!(refreshed <= after);
    }

    #[test]
    fn test_put_replaces_existing_record() {
        let (store, temp_dir) = create_test_store();
        store.put(sample_record("k", "First")).unwrap();
        store.put(sample_record("k", "Second")).unwrap();

        let loaded = store.get(Provider::Storefront, "k").unwrap().unwrap();
        assert_eq!(loaded.title, "Second");

        let files = fs::read_dir(temp_dir.path().join("records")).unwrap().count();
        assert_eq!(files, 1, "Upsert should not leave duplicates or temp files");
    }

    #[test]
    fn test_same_key_from_two_providers_is_two_entries() {
        let (store, _temp_dir) = create_test_store();
        let mut game_db = sample_record("3498", "Metadata Record");
        game_db.provider = Provider::GameDb;
        store.put(game_db).unwrap();

        assert!(store.get(Provider::Storefront, "3498").unwrap().is_none());

        store.put(sample_record("3498", "Storefront Record")).unwrap();
        let loaded = store.get(Provider::GameDb, "3498").unwrap().unwrap();
        assert_eq!(loaded.title, "Metadata Record");
        let loaded = store.get(Provider::Storefront, "3498").unwrap().unwrap();
        assert_eq!(loaded.title, "Storefront Record");

        store.delete(Provider::GameDb, "3498").unwrap();
        assert!(store.get(Provider::GameDb, "3498").unwrap().is_none());
        assert!(store.get(Provider::Storefront, "3498").unwrap().is_some());
    }

    #[test]
    fn test_delete_missing_key_is_not_an_error() {
        let (store, _temp_dir) = create_test_store();
        store
            .delete(Provider::Storefront, "nope")
            .expect("Deleting a missing key should succeed");

        store.put(sample_record("k", "Farm")).unwrap();
        store.delete(Provider::Storefront, "k").unwrap();
        assert!(store.get(Provider::Storefront, "k").unwrap().is_none());
    }

    #[test]
    fn test_stale_queries_use_strict_threshold() {
        let (store, _temp_dir) = create_test_store();
        store.put(sample_record("old", "Old")).unwrap();
        thread::sleep(StdDuration::from_millis(20));
        let threshold = Utc::now();
        thread::sleep(StdDuration::from_millis(20));
        store.put(sample_record("new", "New")).unwrap();

        let stale = store.list_stale(threshold).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key, "old");

        assert_eq!(store.delete_stale(threshold).unwrap(), 1);
        assert_eq!(store.delete_stale(threshold).unwrap(), 0);
        assert!(store.get(Provider::Storefront, "old").unwrap().is_none());
        assert!(store.get(Provider::Storefront, "new").unwrap().is_some());
    }

    #[test]
    fn test_scan_skips_corrupt_entries() {
        let (store, temp_dir) = create_test_store();
        store.put(sample_record("good", "Good")).unwrap();
        let bad = temp_dir.path().join("records").join("storefront.bad.json");
        fs::write(bad, "{not json").unwrap();

        let stale = store
            .list_stale(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert!(matches!(
            store.get(Provider::Storefront, "bad"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_stale_queries_on_empty_store() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.list_stale(Utc::now()).unwrap().is_empty());
        assert_eq!(store.delete_stale(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_alias_is_case_and_whitespace_insensitive() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.alias("Stardew Valley").unwrap().is_none());

        store.set_alias("Stardew Valley", "10141").unwrap();
        assert_eq!(
            store.alias("  stardew   VALLEY ").unwrap().as_deref(),
            Some("10141")
        );
    }

    #[test]
    fn test_encode_file_stem_is_path_safe() {
        assert_eq!(encode_file_stem("10141"), "10141");
        assert_eq!(encode_file_stem("../etc"), "%2E%2E%2Fetc");
        assert_eq!(encode_file_stem(""), "%");
        assert_ne!(encode_file_stem("a.b"), encode_file_stem("a%2Eb"));
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(path_str.contains("gamecache"));
        }
        // Passes if new() returns None (e.g., no home directory in CI)
    }
}
