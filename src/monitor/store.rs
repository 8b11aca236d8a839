//! Incident ledger keyed by fingerprint.
//!
//! Records are appended one JSON object per line, so incidents written
//! before a crash survive it. The fingerprint index is rebuilt on open.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::detection::GeoBoundingBox;

/// One persisted incident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub fingerprint: String,
    /// Local time the incident was first processed (ISO 8601, no offset)
    pub first_seen: String,
    /// Query region the marker was detected in
    pub region: String,
    pub case_folder_id: u64,
    pub city: String,
    pub address: String,
    pub description: String,
    pub calls: u32,
    pub footprint: GeoBoundingBox,
}

/// Persistence for seen incidents.
///
/// `insert_if_absent` must be atomic per fingerprint: of several concurrent
/// inserts with the same fingerprint exactly one returns `true`.
pub trait IncidentStore: Send + Sync {
    fn contains(&self, fingerprint: &str) -> bool;

    /// Stores `record` unless its fingerprint is already known.
    fn insert_if_absent(&self, record: &IncidentRecord) -> Result<bool>;
}

/// Append-only JSON-lines ledger.
pub struct JsonlIncidentStore {
    path: PathBuf,
    seen: Mutex<HashSet<String>>,
}

impl JsonlIncidentStore {
    /// Opens or creates the ledger at `path`.
    ///
    /// Malformed lines are skipped with a warning.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let seen: HashSet<String> = if path.exists() {
            read_records(path)?
                .into_iter()
                .map(|record| record.fingerprint)
                .collect()
        } else {
            HashSet::new()
        };

        log::info!(
            "Incident store {} opened with {} known incidents",
            path.display(),
            seen.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            seen: Mutex::new(seen),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl IncidentStore for JsonlIncidentStore {
    fn contains(&self, fingerprint: &str) -> bool {
        self.seen
            .lock()
            .map(|s| s.contains(fingerprint))
            .unwrap_or(false)
    }

    fn insert_if_absent(&self, record: &IncidentRecord) -> Result<bool> {
        // Held across the append so check and insert are one step
        let mut seen = self
            .seen
            .lock()
            .map_err(|_| anyhow::anyhow!("Incident store lock poisoned"))?;

        if seen.contains(&record.fingerprint) {
            return Ok(false);
        }

        let mut line = serde_json::to_string(record).context("Failed to serialize incident")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open incident store for append")?;

        // A torn last line from an interrupted write must not swallow this record
        if !ends_with_newline(&mut file).context("Failed to inspect incident store")? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes()).context("Failed to write incident record")?;

        seen.insert(record.fingerprint.clone());
        Ok(true)
    }
}

/// True for an empty file or one whose last byte is a newline.
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Reads every well-formed record from a ledger file.
pub fn read_records(path: &Path) -> Result<Vec<IncidentRecord>> {
    let file = File::open(path).context("Failed to open incident store")?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read incident store")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IncidentRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!(
                "Skipping malformed line {} in {}: {}",
                line_num + 1,
                path.display(),
                e
            ),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn record(fingerprint: &str) -> IncidentRecord {
        IncidentRecord {
            fingerprint: fingerprint.to_string(),
            first_seen: "2026-08-14T16:02:11".to_string(),
            region: "Xàtiva".to_string(),
            case_folder_id: 991234,
            city: "XÀTIVA".to_string(),
            address: "CV-41, km 3".to_string(),
            description: "INCENDIO FORESTAL".to_string(),
            calls: 4,
            footprint: GeoBoundingBox::new(-57010.0, 4716990.0, -56990.0, 4717010.0).unwrap(),
        }
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = JsonlIncidentStore::open(&dir.path().join("incidents.jsonl")).unwrap();

        assert!(!store.contains("abc"));
        assert!(store.insert_if_absent(&record("abc")).unwrap());
        assert!(store.contains("abc"));
        assert!(!store.insert_if_absent(&record("abc")).unwrap());

        let records = read_records(store.path()).unwrap();
        assert_eq!(records, vec![record("abc")]);
    }

    #[test]
    fn test_reopen_restores_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("incidents.jsonl");

        {
            let store = JsonlIncidentStore::open(&path).unwrap();
            store.insert_if_absent(&record("one")).unwrap();
            store.insert_if_absent(&record("two")).unwrap();
        }

        let store = JsonlIncidentStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains("one"));
        assert!(!store.insert_if_absent(&record("two")).unwrap());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("incidents.jsonl");
        let good = serde_json::to_string(&record("good")).unwrap();
        fs::write(&path, format!("{{broken\n\n{}\n", good)).unwrap();

        let store = JsonlIncidentStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("good"));
    }

    #[test]
    fn test_torn_last_line_does_not_swallow_next_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("incidents.jsonl");
        let first = serde_json::to_string(&record("first")).unwrap();
        fs::write(&path, format!("{}\n{{\"fingerprint\":\"tor", first)).unwrap();

        {
            let store = JsonlIncidentStore::open(&path).unwrap();
            assert!(store.insert_if_absent(&record("second")).unwrap());
            assert!(store.insert_if_absent(&record("third")).unwrap());
        }

        let store = JsonlIncidentStore::open(&path).unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.contains("second"));
        assert!(store.contains("third"));
    }

    #[test]
    fn test_concurrent_inserts_have_one_winner() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonlIncidentStore::open(&dir.path().join("incidents.jsonl")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.insert_if_absent(&record("same")).unwrap())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(read_records(store.path()).unwrap().len(), 1);
    }
}
