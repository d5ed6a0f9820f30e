use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub rows: Arc<Vec<JsonValue>>,
    pub updated_at: Option<String>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            updated_at: None,
        }
    }
}

struct CacheEntry {
    modified: SystemTime,
    rows: Arc<Vec<JsonValue>>,
}

/// Read-only accessor over the pipeline's data root.
#[derive(Clone)]
pub struct CsvStore {
    root: PathBuf,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl CsvStore {
    pub fn new(root: &str) -> Self {
        let root = PathBuf::from(root);
        if !root.is_dir() {
            log::warn!("store.root_missing path={}", root.display());
        }
        Self {
            root,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    // ---- Raw reads ----

    pub fn read_rows(&self, rel: &str) -> Result<Vec<JsonValue>> {
        let path = self.resolve(rel);
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        parse_csv(file).with_context(|| format!("parse {}", path.display()))
    }

    pub fn modified_at(&self, rel: &str) -> Option<String> {
        let mtime = std::fs::metadata(self.resolve(rel)).ok()?.modified().ok()?;
        Some(iso_millis(mtime))
    }

    // ---- Cached snapshots (keyed by source mtime) ----

    /// Safe read: failures degrade to an empty snapshot. A newer mtime
    /// invalidates the cache; the rows always come from a single read.
    pub fn snapshot(&self, rel: &str) -> Snapshot {
        let path = self.resolve(rel);
        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    log::debug!("store.missing file={rel}");
                } else {
                    log::warn!("store.stat_error file={rel} err={e}");
                }
                return Snapshot::empty();
            }
        };

        if let Some(entry) = self.cache.read().get(rel) {
            if entry.modified == modified {
                return Snapshot {
                    rows: entry.rows.clone(),
                    updated_at: Some(iso_millis(modified)),
                };
            }
        }

        let rows = match self.read_rows(rel) {
            Ok(rows) => Arc::new(rows),
            Err(e) => {
                log::warn!("store.read_error file={rel} err={e:#}");
                return Snapshot::empty();
            }
        };
        self.cache.write().insert(
            rel.to_string(),
            CacheEntry {
                modified,
                rows: rows.clone(),
            },
        );
        log::debug!("store.refresh file={rel} rows={}", rows.len());
        Snapshot {
            rows,
            updated_at: Some(iso_millis(modified)),
        }
    }
}

// Every cell a trimmed string keyed by its header. Blank lines skipped,
// ragged rows keep the columns they have.
fn parse_csv<R: std::io::Read>(reader: R) -> Result<Vec<JsonValue>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers().context("read csv headers")?.clone();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.context("read csv record")?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let mut obj = serde_json::Map::new();
        for (key, cell) in headers.iter().zip(record.iter()) {
            obj.insert(key.to_string(), JsonValue::String(cell.to_string()));
        }
        rows.push(JsonValue::Object(obj));
    }
    Ok(rows)
}

fn iso_millis(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(rel: &str, contents: &str) -> (tempfile::TempDir, CsvStore) {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), rel, contents);
        let store = CsvStore::new(dir.path().to_str().unwrap());
        (dir, store)
    }

    fn write_source(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
    }

    #[test]
    fn read_rows_trims_and_keys_by_header() {
        let (_dir, store) = store_with(
            "backtests/market_regime.csv",
            "date, regime\n20240101, bull \n\n20240102,bear\n",
        );
        let rows = store.read_rows("backtests/market_regime.csv").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["date"], "20240101");
        assert_eq!(rows[0]["regime"], "bull");
        assert_eq!(rows[1]["regime"], "bear");
    }

    #[test]
    fn read_rows_header_only_file_is_empty() {
        let (_dir, store) = store_with("x.csv", "date,regime\n");
        assert!(store.read_rows("x.csv").unwrap().is_empty());
    }

    #[test]
    fn read_rows_tolerates_ragged_rows() {
        let (_dir, store) = store_with("x.csv", "a,b,c\n1,2\n4,5,6,7\n");
        let rows = store.read_rows("x.csv").unwrap();
        assert_eq!(rows[0]["a"], "1");
        assert_eq!(rows[0].get("c"), None);
        assert_eq!(rows[1]["c"], "6");
    }

    #[test]
    fn read_rows_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().to_str().unwrap());
        assert!(store.read_rows("nope.csv").is_err());
    }

    #[test]
    fn snapshot_missing_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().to_str().unwrap());
        let snap = store.snapshot("nope.csv");
        assert!(snap.rows.is_empty());
        assert_eq!(snap.updated_at, None);
    }

    #[test]
    fn snapshot_reports_mtime() {
        let (_dir, store) = store_with("x.csv", "date,regime\n20240101,bull\n");
        let snap = store.snapshot("x.csv");
        assert_eq!(snap.rows.len(), 1);
        let ts = snap.updated_at.unwrap();
        assert!(ts.ends_with('Z'), "expected UTC timestamp, got {ts}");
    }

    #[test]
    fn snapshot_caches_until_the_file_changes() {
        let (dir, store) = store_with("x.csv", "date,regime\n20240101,bull\n");
        let first = store.snapshot("x.csv");
        let second = store.snapshot("x.csv");
        assert!(Arc::ptr_eq(&first.rows, &second.rows));

        // mtime granularity guard
        std::thread::sleep(std::time::Duration::from_millis(50));
        write_source(
            dir.path(),
            "x.csv",
            "date,regime\n20240101,bull\n20240102,bear\n",
        );
        let third = store.snapshot("x.csv");
        assert_eq!(third.rows.len(), 2);
        assert!(!Arc::ptr_eq(&first.rows, &third.rows));
    }
}
