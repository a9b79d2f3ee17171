//! Flat-file persistence: `state` is a single JSON object, `history` a JSON
//! array of records. Both are rewritten whole through a temp file + rename so
//! a killed process never leaves a half-written file behind.

use crate::error::{WatchError, WatchResult};
use crate::models::{PriceRecord, RunState};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ── JSON file helpers ─────────────────────────────────────────────────────────

/// Outcome of reading a JSON file that may not exist yet.
enum Loaded<T> {
    Missing,
    Unreadable,
    Corrupt,
    Value(T),
}

impl<T> Loaded<T> {
    fn value(self) -> Option<T> {
        match self {
            Loaded::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Read and decode `path`. Every failure is logged and left to the caller
/// to treat as a first run.
fn read_json<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{:?} does not exist yet", path);
            return Loaded::Missing;
        }
        Err(e) => {
            warn!("Could not read {:?}, starting fresh: {}", path, e);
            return Loaded::Unreadable;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(v) => Loaded::Value(v),
        Err(e) => {
            warn!("Corrupt JSON in {:?}, starting fresh: {}", path, e);
            Loaded::Corrupt
        }
    }
}

/// Pretty-print `value` to a sibling temp file, fsync it, then rename over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> WatchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| WatchError::storage(parent, e))?;
    }

    let body = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);

    let mut file = fs::File::create(&tmp).map_err(|e| WatchError::storage(&tmp, e))?;
    file.write_all(&body).map_err(|e| WatchError::storage(&tmp, e))?;
    file.sync_all().map_err(|e| WatchError::storage(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| WatchError::storage(path, e))?;
    Ok(())
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

/// Where an undecodable history file is moved before it gets replaced.
pub fn quarantine_path(path: &Path) -> PathBuf {
    sibling_path(path, ".corrupt")
}

// ── History ───────────────────────────────────────────────────────────────────

/// Append-only log of observations, oldest first.
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<PriceRecord>,
    max_records: Option<usize>,
    /// Set when the file on disk could not be decoded; it is moved aside on
    /// the first write instead of being overwritten.
    corrupt_on_disk: bool,
}

impl HistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (records, corrupt_on_disk) = match read_json::<Vec<PriceRecord>>(&path) {
            Loaded::Value(records) => (records, false),
            Loaded::Corrupt => (Vec::new(), true),
            Loaded::Missing | Loaded::Unreadable => (Vec::new(), false),
        };
        debug!("Loaded {} history records from {:?}", records.len(), path);
        Self { path, records, max_records: None, corrupt_on_disk }
    }

    /// Drop the oldest records beyond `cap` whenever a record is added.
    pub fn with_cap(mut self, cap: Option<usize>) -> Self {
        self.max_records = cap;
        self
    }

    /// Add a record at the end and persist immediately. Identical consecutive
    /// prices are kept.
    pub fn append(&mut self, record: PriceRecord) -> WatchResult<()> {
        self.push(record);
        if self.corrupt_on_disk {
            let aside = quarantine_path(&self.path);
            fs::rename(&self.path, &aside).map_err(|e| WatchError::storage(&self.path, e))?;
            warn!("Moved unreadable history to {:?}", aside);
            self.corrupt_on_disk = false;
        }
        write_json_atomic(&self.path, &self.records)
    }

    /// Add a record in memory only; the file on disk is left as it was.
    pub fn push(&mut self, record: PriceRecord) {
        if let Some(last) = self.records.last() {
            // Fixed-width timestamps sort chronologically as strings.
            if record.timestamp_local < last.timestamp_local {
                warn!(
                    "Record at {} is older than the last one ({}), appending anyway",
                    record.timestamp_local, last.timestamp_local
                );
            }
        }
        self.records.push(record);
        if let Some(cap) = self.max_records {
            if self.records.len() > cap {
                let excess = self.records.len() - cap;
                self.records.drain(..excess);
            }
        }
    }

    /// The trailing `n` records, or all of them when the history is shorter.
    /// Fails when fewer than two records exist at all.
    pub fn recent_window(&self, n: usize) -> WatchResult<&[PriceRecord]> {
        let len = self.records.len();
        if len < 2 {
            return Err(WatchError::InsufficientData { have: len });
        }
        Ok(&self.records[len - n.min(len)..])
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Run state ─────────────────────────────────────────────────────────────────

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Prior state, or the all-empty default on first run or a corrupt file.
    pub fn load(&self) -> RunState {
        read_json(&self.path).value().unwrap_or_default()
    }

    /// Overwrite the whole record.
    pub fn save(&self, state: &RunState) -> WatchResult<()> {
        write_json_atomic(&self.path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(t: &str, buy: &str, sell: &str) -> PriceRecord {
        PriceRecord {
            timestamp_local: t.into(),
            buy: buy.into(),
            sell: sell.into(),
        }
    }

    #[test]
    fn test_append_persists_and_keeps_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = HistoryStore::open(&path);
        assert!(store.is_empty());
        store.append(rec("2024-01-01 07:00", "1", "2")).unwrap();
        store.append(rec("2024-01-01 07:05", "1", "2")).unwrap();

        let reopened = HistoryStore::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.records()[1].timestamp_local, "2024-01-01 07:05");
        assert!(!path.with_file_name("history.json.tmp").exists());
    }

    #[test]
    fn test_history_file_uses_time_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);
        store.append(rec("2024-01-01 07:00", "85000000", "86000000")).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["time"], "2024-01-01 07:00");
        assert_eq!(raw[0]["buy"], "85000000");
    }

    #[test]
    fn test_recent_window_bounds() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("h.json"));

        store.append(rec("t0", "1", "1")).unwrap();
        assert!(matches!(
            store.recent_window(24),
            Err(WatchError::InsufficientData { have: 1 })
        ));

        for i in 1..5 {
            store.append(rec(&format!("t{i}"), "1", "1")).unwrap();
        }
        let w = store.recent_window(3).unwrap();
        let times: Vec<_> = w.iter().map(|r| r.timestamp_local.as_str()).collect();
        assert_eq!(times, ["t2", "t3", "t4"]);

        assert_eq!(store.recent_window(100).unwrap().len(), 5);
        assert_eq!(store.recent_window(0).unwrap().len(), 0);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.json");
        let mut store = HistoryStore::open(&path).with_cap(Some(2));
        for i in 0..4 {
            store.append(rec(&format!("t{i}"), "1", "1")).unwrap();
        }
        let reopened = HistoryStore::open(&path);
        let times: Vec<_> = reopened.records().iter().map(|r| r.timestamp_local.clone()).collect();
        assert_eq!(times, ["t2", "t3"]);
    }

    #[test]
    fn test_corrupt_files_read_as_first_run() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("data.json");
        let hist_path = dir.path().join("history.json");
        fs::write(&state_path, "{not json").unwrap();
        fs::write(&hist_path, "[{\"time\":").unwrap();

        assert_eq!(StateStore::new(&state_path).load(), RunState::default());
        assert!(HistoryStore::open(&hist_path).is_empty());
    }

    #[test]
    fn test_corrupt_history_moved_aside_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "[{\"time\":").unwrap();

        // Reading alone leaves the file in place.
        let _ = HistoryStore::open(&path);
        assert!(!quarantine_path(&path).exists());

        let mut store = HistoryStore::open(&path);
        store.append(rec("2024-01-01 07:00", "1", "2")).unwrap();

        assert_eq!(fs::read_to_string(quarantine_path(&path)).unwrap(), "[{\"time\":");
        assert_eq!(HistoryStore::open(&path).len(), 1);

        store.append(rec("2024-01-01 07:05", "1", "2")).unwrap();
        assert_eq!(fs::read_to_string(quarantine_path(&path)).unwrap(), "[{\"time\":");
        assert_eq!(HistoryStore::open(&path).len(), 2);
    }

    #[test]
    fn test_out_of_order_record_still_appended_last() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("h.json"));
        store.append(rec("2024-01-01 08:00", "1", "2")).unwrap();
        store.append(rec("2024-01-01 07:55", "3", "4")).unwrap();

        let times: Vec<_> = store.records().iter().map(|r| r.timestamp_local.as_str()).collect();
        assert_eq!(times, ["2024-01-01 08:00", "2024-01-01 07:55"]);
    }

    #[test]
    fn test_push_does_not_touch_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.json");
        let mut store = HistoryStore::open(&path).with_cap(Some(1));
        store.push(rec("t0", "1", "1"));
        store.push(rec("t1", "1", "1"));

        assert_eq!(store.len(), 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_state_round_trip_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/data.json"));
        assert_eq!(store.load(), RunState::default());

        let state = RunState {
            last_buy: Some("8.550.000".into()),
            last_sell: Some("8.650.000".into()),
            last_notified_hour: Some(23),
        };
        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }
}
