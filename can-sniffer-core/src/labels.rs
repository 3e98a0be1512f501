//! Persisted label databases
//!
//! Two small JSON databases annotate the live view: one maps a source id to
//! a device name, the other maps `(id, payload pattern)` to a recorded
//! function name (and doubles as the catalog for manual transmission).
//!
//! Both load tolerantly: a missing or unparseable file yields an empty
//! database with a warning, and records with missing keys deserialize with
//! defaults; an annotation store must never take the monitor down.

use crate::types::{Result, SnifferError};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Source id → device name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdLabels {
    labels: HashMap<String, String>,
}

impl IdLabels {
    /// Load from `path`; missing or corrupt files yield an empty database.
    pub fn load(path: &Path) -> IdLabels {
        load_db(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_db(path, self)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn set(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.labels.insert(id.into(), name.into());
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.labels.remove(id)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.labels.iter()
    }
}

/// Recorded functions for one source id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// Device name at recording time; empty if it was never labeled.
    #[serde(default)]
    pub device: String,
    /// Payload text (space-joined hex pairs) → function name.
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

/// Source id → recorded functions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionDb {
    entries: HashMap<String, FunctionEntry>,
}

impl FunctionDb {
    /// Load from `path`; missing or corrupt files yield an empty database.
    pub fn load(path: &Path) -> FunctionDb {
        load_db(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_db(path, self)
    }

    /// Device name recorded alongside `id`, if any.
    pub fn device(&self, id: &str) -> Option<&str> {
        self.entries
            .get(id)
            .map(|e| e.device.as_str())
            .filter(|d| !d.is_empty())
    }

    /// Function name recorded for this exact `(id, payload)` pair.
    pub fn function_for(&self, id: &str, data: &str) -> Option<&str> {
        self.entries
            .get(id)?
            .mappings
            .get(data)
            .map(String::as_str)
    }

    /// Reverse lookup for manual transmission: the payload text recorded
    /// under `function` for `id`.
    pub fn payload_for(&self, id: &str, function: &str) -> Option<&str> {
        self.entries.get(id)?.mappings.iter().find_map(|(data, name)| {
            if name == function {
                Some(data.as_str())
            } else {
                None
            }
        })
    }

    /// Record (or overwrite) a function name for `(id, data)`.
    pub fn record(
        &mut self,
        id: impl Into<String>,
        device: impl Into<String>,
        data: impl Into<String>,
        function: impl Into<String>,
    ) {
        let entry = self.entries.entry(id.into()).or_default();
        entry.device = device.into();
        entry.mappings.insert(data.into(), function.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FunctionEntry)> {
        self.entries.iter()
    }
}

fn load_db<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read {}: {} - starting empty", path.display(), e);
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(db) => db,
        Err(e) => {
            warn!("Could not parse {}: {} - starting empty", path.display(), e);
            T::default()
        }
    }
}

fn save_db<T: Serialize>(path: &Path, db: &T) -> Result<()> {
    let write_err = |source: std::io::Error| SnifferError::LabelDbWrite {
        path: path.display().to_string(),
        source,
    };

    let content = serde_json::to_string_pretty(db)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, content).map_err(write_err)?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let labels = IdLabels::load(&dir.path().join("nope.json"));
        assert!(labels.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.json");
        fs::write(&path, "{ not json").unwrap();
        let labels = IdLabels::load(&path);
        assert!(labels.is_empty());
    }

    #[test]
    fn id_labels_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.json");

        let mut labels = IdLabels::default();
        labels.set("6B1", "Dashboard");
        labels.set("7DF", "Diag broadcast");
        labels.save(&path).unwrap();

        let loaded = IdLabels::load(&path);
        assert_eq!(loaded.get("6B1"), Some("Dashboard"));
        assert_eq!(loaded.get("7DF"), Some("Diag broadcast"));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn function_db_round_trip_and_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("functions.json");

        let mut db = FunctionDb::default();
        db.record("6B1", "Dashboard", "01 00 00 00 00 00 00 00", "Lock doors");
        db.record("6B1", "Dashboard", "02 00 00 00 00 00 00 00", "Unlock doors");
        db.save(&path).unwrap();

        let loaded = FunctionDb::load(&path);
        assert_eq!(
            loaded.function_for("6B1", "01 00 00 00 00 00 00 00"),
            Some("Lock doors")
        );
        assert_eq!(loaded.function_for("6B1", "FF 00 00 00 00 00 00 00"), None);
        assert_eq!(loaded.device("6B1"), Some("Dashboard"));
        assert_eq!(
            loaded.payload_for("6B1", "Unlock doors"),
            Some("02 00 00 00 00 00 00 00")
        );
    }

    #[test]
    fn partially_formed_records_get_defaults() {
        // an entry missing "device" and one missing "mappings" both load
        let json = r#"{
            "100": { "mappings": { "01 02": "Something" } },
            "200": { "device": "Radio" }
        }"#;
        let db: FunctionDb = serde_json::from_str(json).unwrap();
        assert_eq!(db.function_for("100", "01 02"), Some("Something"));
        assert_eq!(db.device("100"), None);
        assert_eq!(db.device("200"), Some("Radio"));
        assert_eq!(db.function_for("200", "01 02"), None);
    }
}
