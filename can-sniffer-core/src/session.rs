//! Session log entries and the export/import format
//!
//! The durable record of a capture is a row-oriented text file:
//!
//! ```text
//! # can-sniffer session exported 2026-08-06T12:00:00+00:00
//! timestamp,id,rtr,ide,dlc,data
//! 0.016728,7DF,0,0,8,02 01 0C 00 00 00 00 00
//! ```
//!
//! The format round-trips: re-exporting an imported session reproduces the
//! rows byte-identically (only the `#` header comment carries the export
//! time). Malformed fields on import get explicit defaults instead of
//! failing the load; a partially corrupted capture is still worth using.

use crate::types::{Frame, Result, SnifferError, PAYLOAD_LEN};
use std::fs;
use std::path::Path;

/// Fixed column header written after the comment line.
pub const EXPORT_HEADER: &str = "timestamp,id,rtr,ide,dlc,data";

/// Defaults applied to malformed import fields.
const DEFAULT_ID: &str = "000";
const DEFAULT_DLC: u8 = 8;

/// One logged frame, flattened to its text form.
///
/// Entries are created in arrival order and never reordered; a sorted
/// display is a view concern and must not touch the log itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    /// Capture time in seconds since the session origin.
    pub timestamp: f64,
    pub id: String,
    pub rtr: bool,
    pub ide: bool,
    pub dlc: u8,
    /// Payload as space-joined two-hex-digit bytes, always 8 of them.
    pub data: String,
}

impl SessionEntry {
    pub fn from_frame(frame: &Frame) -> Self {
        SessionEntry {
            timestamp: frame.capture_time,
            id: frame.id.clone(),
            rtr: frame.rtr,
            ide: frame.ide,
            dlc: frame.dlc,
            data: frame.payload_text(),
        }
    }

    /// Rebuild a frame for injection, re-stamped with `capture_time`.
    pub fn to_frame(&self, capture_time: f64) -> Frame {
        Frame {
            id: self.id.clone(),
            rtr: self.rtr,
            ide: self.ide,
            dlc: self.dlc,
            payload: parse_data_text(&self.data),
            capture_time,
        }
    }

    fn to_row(&self) -> String {
        format!(
            "{:.6},{},{},{},{},{}",
            self.timestamp,
            self.id,
            self.rtr as u8,
            self.ide as u8,
            self.dlc,
            self.data
        )
    }

    /// Parse one data row. Missing or malformed fields fall back to
    /// defaults (id `000`, DLC 8, eight `00` bytes); only a fully empty
    /// row yields `None`.
    fn parse_row(line: &str) -> Option<SessionEntry> {
        let line = line.trim_end();
        if line.is_empty() {
            return None;
        }

        let mut fields = line.splitn(6, ',');
        let timestamp = fields
            .next()
            .and_then(|t| t.trim().parse::<f64>().ok())
            .filter(|t| t.is_finite())
            .unwrap_or(0.0);
        let id = match fields.next().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_ascii_uppercase(),
            _ => DEFAULT_ID.to_string(),
        };
        let rtr = fields.next().map(|f| f.trim() == "1").unwrap_or(false);
        let ide = fields.next().map(|f| f.trim() == "1").unwrap_or(false);
        let dlc = fields
            .next()
            .and_then(|f| f.trim().parse::<u8>().ok())
            .filter(|dlc| *dlc <= PAYLOAD_LEN as u8)
            .unwrap_or(DEFAULT_DLC);
        let data = render_data_text(&parse_data_text(fields.next().unwrap_or("")));

        Some(SessionEntry {
            timestamp,
            id,
            rtr,
            ide,
            dlc,
            data,
        })
    }
}

/// Payload text → 8 bytes; unparseable tokens become `00`, excess tokens
/// are dropped.
fn parse_data_text(data: &str) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    for (i, token) in data.split_whitespace().take(PAYLOAD_LEN).enumerate() {
        payload[i] = u8::from_str_radix(token, 16).unwrap_or(0);
    }
    payload
}

fn render_data_text(payload: &[u8; PAYLOAD_LEN]) -> String {
    let pairs: Vec<String> = payload.iter().map(|b| format!("{:02X}", b)).collect();
    pairs.join(" ")
}

/// Write `entries` to `path` in the export format.
///
/// The file is assembled in full, written to a sibling temp file and
/// renamed over the destination, so an existing file is either replaced
/// completely or left untouched.
pub fn export_session(path: &Path, entries: &[SessionEntry]) -> Result<()> {
    let mut content = String::with_capacity(64 + entries.len() * 48);
    content.push_str(&format!(
        "# can-sniffer session exported {}\n",
        chrono::Utc::now().to_rfc3339()
    ));
    content.push_str(EXPORT_HEADER);
    content.push('\n');
    for entry in entries {
        content.push_str(&entry.to_row());
        content.push('\n');
    }

    let write_err = |source: std::io::Error| SnifferError::SessionWrite {
        path: path.display().to_string(),
        source,
    };

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, &content).map_err(write_err)?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(source));
    }

    log::info!("Exported {} frames to {}", entries.len(), path.display());
    Ok(())
}

/// Load a previously exported session.
///
/// Comment and header lines are skipped; data rows are parsed tolerantly
/// (see [`SessionEntry::parse_row`]). Only an unreadable file is an error.
pub fn import_session(path: &Path) -> Result<Vec<SessionEntry>> {
    let content = fs::read_to_string(path).map_err(|source| SnifferError::SessionRead {
        path: path.display().to_string(),
        source,
    })?;

    let entries: Vec<SessionEntry> = content
        .lines()
        .filter(|line| !line.starts_with('#') && line.trim_end() != EXPORT_HEADER)
        .filter_map(SessionEntry::parse_row)
        .collect();

    log::info!("Imported {} frames from {}", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: f64, id: &str, data: &str) -> SessionEntry {
        SessionEntry {
            timestamp: ts,
            id: id.to_string(),
            rtr: false,
            ide: false,
            dlc: 8,
            data: data.to_string(),
        }
    }

    #[test]
    fn row_rendering() {
        let e = SessionEntry {
            timestamp: 0.016728,
            id: "7DF".to_string(),
            rtr: false,
            ide: true,
            dlc: 3,
            data: "02 01 0C 00 00 00 00 00".to_string(),
        };
        assert_eq!(e.to_row(), "0.016728,7DF,0,1,3,02 01 0C 00 00 00 00 00");
    }

    #[test]
    fn parse_row_roundtrips_valid_rows() {
        let row = "1.500000,541,1,0,8,AA BB CC DD EE FF 00 11";
        let e = SessionEntry::parse_row(row).unwrap();
        assert_eq!(e.timestamp, 1.5);
        assert_eq!(e.id, "541");
        assert!(e.rtr);
        assert!(!e.ide);
        assert_eq!(e.to_row(), row);
    }

    #[test]
    fn malformed_fields_get_defaults() {
        let e = SessionEntry::parse_row("garbage,,x,x,99,ZZ QQ").unwrap();
        assert_eq!(e.timestamp, 0.0);
        assert_eq!(e.id, "000");
        assert!(!e.rtr);
        assert!(!e.ide);
        assert_eq!(e.dlc, 8);
        assert_eq!(e.data, "00 00 00 00 00 00 00 00");
    }

    #[test]
    fn truncated_row_gets_defaults_for_missing_fields() {
        let e = SessionEntry::parse_row("2.000000,123").unwrap();
        assert_eq!(e.timestamp, 2.0);
        assert_eq!(e.id, "123");
        assert_eq!(e.dlc, 8);
        assert_eq!(e.data, "00 00 00 00 00 00 00 00");
    }

    #[test]
    fn empty_rows_are_skipped() {
        assert!(SessionEntry::parse_row("").is_none());
        assert!(SessionEntry::parse_row("   ").is_none());
    }

    #[test]
    fn to_frame_restamps_capture_time() {
        let e = entry(5.0, "7DF", "01 02 03 04 05 06 07 08");
        let f = e.to_frame(42.0);
        assert_eq!(f.capture_time, 42.0);
        assert_eq!(f.payload, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");

        let entries = vec![
            entry(0.0, "7DF", "02 01 0C 00 00 00 00 00"),
            entry(0.05, "7E8", "04 41 0C 1A F8 00 00 00"),
            entry(0.10, "7DF", "02 01 0D 00 00 00 00 00"),
        ];

        export_session(&path, &entries).unwrap();
        let loaded = import_session(&path).unwrap();
        assert_eq!(loaded, entries);

        // re-exporting reproduces the rows byte-identically
        let first = fs::read_to_string(&path).unwrap();
        export_session(&path, &loaded).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        let rows = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with('#'))
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        assert_eq!(rows(&first), rows(&second));
    }

    #[test]
    fn export_replaces_destination_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");

        export_session(&path, &[entry(0.0, "100", "00 00 00 00 00 00 00 00")]).unwrap();
        export_session(&path, &[entry(1.0, "200", "01 00 00 00 00 00 00 00")]).unwrap();

        let loaded = import_session(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "200");
        // no stray temp file left behind
        assert!(!dir.path().join("capture.csv.tmp").exists());
    }

    #[test]
    fn import_tolerates_mixed_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");
        fs::write(
            &path,
            "# comment\ntimestamp,id,rtr,ide,dlc,data\n0.1,7DF,0,0,8,01 02 03 04 05 06 07 08\nnot,really,a,row\n\n",
        )
        .unwrap();

        let loaded = import_session(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "7DF");
        // the garbage row survives with defaults instead of aborting the load
        assert_eq!(loaded[1].id, "REALLY");
    }
}
