//! Artifact store: generated scripts on disk plus the JSON catalog.
//!
//! ```text
//! generated_code/
//! ├── 20251231_093400_CUSTOMERS_OLD_to_CUSTOMERS_NEW.sql
//! ├── 20251231_093400_migrate_all.sql
//! └── file_index.json
//! ```

use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::ast::{ArtifactCatalogEntry, GeneratedUnit, ALL_TABLES};
use crate::error::{MigrtError, MigrtResult};

/// Format of batch timestamps used in filenames and catalog entries.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const LOCK_RETRIES: u32 = 50;
const LOCK_BACKOFF: Duration = Duration::from_millis(100);
/// A lock file untouched for this long is left over from a dead writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);
const UNKNOWN_TABLE: &str = "Unknown";

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Timestamp for a new generation batch.
pub fn batch_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<ts>_<source>_to_<target>.<ext>`
pub fn unit_filename(timestamp: &str, source_table: &str, target_table: &str, ext: &str) -> String {
    format!(
        "{}_{}_to_{}.{}",
        timestamp,
        sanitize(source_table),
        sanitize(target_table),
        ext
    )
}

/// `<ts>_migrate_all.<ext>`
pub fn orchestration_filename(timestamp: &str, ext: &str) -> String {
    format!("{}_migrate_all.{}", timestamp, ext)
}

/// Recover table names from a generated filename when the catalog has no entry.
pub fn describe_filename(filename: &str) -> (String, String) {
    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
    let name = strip_timestamp(stem);

    if name.contains("migrate_all") {
        return (ALL_TABLES.to_string(), ALL_TABLES.to_string());
    }
    match name.split_once("_to_") {
        Some((source, target)) if !source.is_empty() && !target.is_empty() => {
            (source.to_string(), target.to_string())
        }
        _ => (UNKNOWN_TABLE.to_string(), UNKNOWN_TABLE.to_string()),
    }
}

fn strip_timestamp(stem: &str) -> &str {
    // YYYYmmdd_HHMMSS_
    let bytes = stem.as_bytes();
    let is_ts = bytes.len() > 16
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'_'
        && bytes[9..15].iter().all(u8::is_ascii_digit)
        && bytes[15] == b'_';
    if is_ts { &stem[16..] } else { stem }
}

/// A script file found in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedArtifact {
    pub filename: String,
    pub source_table: String,
    pub target_table: String,
    pub modified: String,
}

/// Directory of generated scripts with an append-only catalog.
pub struct ArtifactStore {
    root: PathBuf,
    catalog_file: String,
    extension: String,
    writer: Mutex<()>,
}

impl ArtifactStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, catalog_file: &str, extension: &str) -> MigrtResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            catalog_file: catalog_file.to_string(),
            extension: extension.to_string(),
            writer: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(&self.catalog_file)
    }

    /// Write every unit, then record them all in the catalog.
    ///
    /// A catalog failure leaves the already written scripts in place.
    pub fn persist(&self, units: &[GeneratedUnit], timestamp: &str) -> MigrtResult<Vec<ArtifactCatalogEntry>> {
        let mut entries = Vec::with_capacity(units.len());
        for unit in units {
            self.write_unit(unit)?;
            entries.push(ArtifactCatalogEntry {
                filename: unit.filename.clone(),
                source_table: unit.source_table.clone(),
                target_table: unit.target_table.clone(),
                timestamp: timestamp.to_string(),
            });
        }

        self.append_catalog(&entries)?;
        info!("Persisted {} units to {}", entries.len(), self.root.display());
        Ok(entries)
    }

    /// Write a single unit's script.
    pub fn write_unit(&self, unit: &GeneratedUnit) -> MigrtResult<PathBuf> {
        let path = self.root.join(checked_name(&unit.filename)?);
        fs::write(&path, &unit.code)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Store output that is kept for reference only.
    pub fn write_side_artifact(&self, name: &str, content: &str) -> MigrtResult<PathBuf> {
        let path = self.root.join(checked_name(name)?);
        fs::write(&path, content)?;
        info!("Saved side artifact {}", path.display());
        Ok(path)
    }

    /// Read a stored script back.
    pub fn read_unit(&self, filename: &str) -> MigrtResult<String> {
        let path = self.root.join(checked_name(filename)?);
        Ok(fs::read_to_string(path)?)
    }

    /// Full generation history, oldest first.
    pub fn catalog(&self) -> MigrtResult<Vec<ArtifactCatalogEntry>> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| MigrtError::Catalog(format!("{}: {}", path.display(), e)))
    }

    /// Append entries to the catalog under the single-writer lock.
    pub fn append_catalog(&self, entries: &[ArtifactCatalogEntry]) -> MigrtResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _lock = CatalogLock::acquire(self.root.join(format!("{}.lock", self.catalog_file)))?;

        let mut catalog = self.catalog()?;
        catalog.extend_from_slice(entries);

        let json = serde_json::to_string_pretty(&catalog)?;
        let tmp = self.root.join(format!("{}.tmp", self.catalog_file));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.catalog_path())
            .map_err(|e| MigrtError::Catalog(format!("failed to replace catalog: {}", e)))?;

        debug!("Catalog now holds {} entries", catalog.len());
        Ok(())
    }

    /// Script files in the store, newest first.
    pub fn list(&self) -> MigrtResult<Vec<ListedArtifact>> {
        let index: HashMap<String, ArtifactCatalogEntry> = match self.catalog() {
            Ok(entries) => entries.into_iter().map(|e| (e.filename.clone(), e)).collect(),
            Err(e) => {
                warn!("Error reading catalog: {}", e);
                HashMap::new()
            }
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            let modified: chrono::DateTime<chrono::Local> = entry.metadata()?.modified()?.into();
            let (source_table, target_table) = match index.get(&filename) {
                Some(e) => (e.source_table.clone(), e.target_table.clone()),
                None => describe_filename(&filename),
            };

            files.push(ListedArtifact {
                filename,
                source_table,
                target_table,
                modified: modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            });
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.filename.cmp(&a.filename)));
        Ok(files)
    }
}

/// Reject names that would escape the store directory.
fn checked_name(name: &str) -> MigrtResult<&str> {
    if name.is_empty() || name.contains(&['/', '\\'][..]) || name.contains("..") {
        return Err(MigrtError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid artifact name: '{}'", name),
        )));
    }
    Ok(name)
}

/// Cross-process lock file, removed on drop.
///
/// The file records the holder's pid and start time. A lock older than
/// `STALE_LOCK_AGE` is broken.
struct CatalogLock {
    path: PathBuf,
}

impl CatalogLock {
    fn acquire(path: PathBuf) -> MigrtResult<Self> {
        for attempt in 1..=LOCK_RETRIES {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let holder = format!(
                        "pid {} at {}\n",
                        std::process::id(),
                        chrono::Local::now().to_rfc3339()
                    );
                    if let Err(e) = file.write_all(holder.as_bytes()) {
                        debug!("Could not record lock holder: {}", e);
                    }
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(
                            "Breaking stale catalog lock {} ({})",
                            path.display(),
                            fs::read_to_string(&path).unwrap_or_default().trim()
                        );
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    debug!("Catalog lock busy (attempt {}/{})", attempt, LOCK_RETRIES);
                    thread::sleep(LOCK_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MigrtError::CatalogLocked(format!(
            "{} (remove it if no migrt process is running)",
            path.display()
        )))
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release catalog lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit(filename: &str, source: &str, target: &str) -> GeneratedUnit {
        GeneratedUnit {
            filename: filename.to_string(),
            code: format!("-- {} to {}\n", source, target),
            source_table: source.to_string(),
            target_table: target.to_string(),
        }
    }

    fn store(dir: &tempfile::TempDir) -> ArtifactStore {
        ArtifactStore::open(dir.path(), "file_index.json", "sql").unwrap()
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("hr.EMP-2024 x"), "hr_EMP_2024_x");
        assert_eq!(sanitize("ORDERS_NEW"), "ORDERS_NEW");
        // Non-ASCII letters are replaced too.
        assert_eq!(sanitize("CLIENTÉ"), "CLIENT_");
    }

    #[test]
    fn test_filenames() {
        assert_eq!(
            unit_filename("20250101_120000", "dbo.Orders", "ORDERS_NEW", "sql"),
            "20250101_120000_dbo_Orders_to_ORDERS_NEW.sql"
        );
        assert_eq!(
            orchestration_filename("20250101_120000", "sql"),
            "20250101_120000_migrate_all.sql"
        );
    }

    #[test]
    fn test_describe_filename() {
        assert_eq!(
            describe_filename("20250101_120000_CUSTOMERS_OLD_to_CUSTOMERS_NEW.sql"),
            ("CUSTOMERS_OLD".to_string(), "CUSTOMERS_NEW".to_string())
        );
        assert_eq!(
            describe_filename("20250101_120000_migrate_all.sql"),
            ("ALL".to_string(), "ALL".to_string())
        );
        assert_eq!(
            describe_filename("notes.sql"),
            ("Unknown".to_string(), "Unknown".to_string())
        );
    }

    #[test]
    fn test_persist_and_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let units = vec![
            unit("20250101_120000_A_to_B.sql", "A", "B"),
            unit("20250101_120000_migrate_all.sql", "ALL", "ALL"),
        ];
        let entries = store.persist(&units, "20250101_120000").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(store.read_unit("20250101_120000_A_to_B.sql").unwrap(), "-- A to B\n");

        store
            .persist(&[unit("20250102_080000_C_to_D.sql", "C", "D")], "20250102_080000")
            .unwrap();

        let catalog = store.catalog().unwrap();
        let names: Vec<&str> = catalog.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "20250101_120000_A_to_B.sql",
                "20250101_120000_migrate_all.sql",
                "20250102_080000_C_to_D.sql",
            ]
        );
        assert_eq!(catalog[2].timestamp, "20250102_080000");
        assert!(!dir.path().join("file_index.json.lock").exists());
    }

    #[test]
    fn test_corrupt_catalog_is_not_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        fs::write(store.catalog_path(), "{not json").unwrap();

        let err = store.persist(&[unit("x_to_y.sql", "x", "y")], "ts").unwrap_err();
        assert!(matches!(err, MigrtError::Catalog(_)));
        assert!(dir.path().join("x_to_y.sql").exists());
        assert_eq!(fs::read_to_string(store.catalog_path()).unwrap(), "{not json");
    }

    #[test]
    fn test_held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let lock = dir.path().join("file_index.json.lock");
        fs::write(&lock, "").unwrap();

        let err = store.append_catalog(&[]).unwrap_err();
        assert!(matches!(&err, MigrtError::CatalogLocked(msg) if msg.contains("remove it")));
        assert!(lock.exists());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let lock = dir.path().join("file_index.json.lock");
        fs::write(&lock, "pid 1 at 2025-01-01T00:00:00+00:00\n").unwrap();
        fs::File::options()
            .write(true)
            .open(&lock)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        store
            .persist(&[unit("20250101_120000_A_to_B.sql", "A", "B")], "20250101_120000")
            .unwrap();
        assert_eq!(store.catalog().unwrap().len(), 1);
        assert!(!lock.exists());
    }

    #[test]
    fn test_read_unit_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.read_unit("../secret.sql").is_err());
        assert!(store.read_unit("sub/file.sql").is_err());
    }

    #[test]
    fn test_list_uses_catalog_then_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .persist(&[unit("20250101_120000_src_to_dst.sql", "src.tbl", "dst")], "20250101_120000")
            .unwrap();
        fs::write(dir.path().join("20250101_130000_OLD_to_NEW.sql"), "").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        let by_name: HashMap<&str, &ListedArtifact> =
            listed.iter().map(|l| (l.filename.as_str(), l)).collect();
        assert_eq!(by_name["20250101_120000_src_to_dst.sql"].source_table, "src.tbl");
        assert_eq!(by_name["20250101_130000_OLD_to_NEW.sql"].source_table, "OLD");
        assert_eq!(by_name["20250101_130000_OLD_to_NEW.sql"].target_table, "NEW");
    }
}
