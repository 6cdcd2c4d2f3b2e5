//! CSV rollup functionality for archiving journal WAL entries.
//!
//! This module implements atomic WAL-to-CSV conversion with proper error
//! handling to prevent data loss. The CSV schema is flat: a kind column
//! plus per-kind optional columns (meal portions are not archived).

use crate::{JournalEntry, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// A row in the CSV archive
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    kind: String,
    at: String,
    glucose_gl: Option<f64>,
    slot: Option<String>,
    total_carbs_g: Option<f64>,
    meal_units: Option<f64>,
    correction_units: Option<u32>,
    note: Option<String>,
}

impl From<&JournalEntry> for CsvRow {
    fn from(entry: &JournalEntry) -> Self {
        let mut row = CsvRow {
            id: entry.id().to_string(),
            kind: String::new(),
            at: entry.timestamp().to_rfc3339(),
            glucose_gl: None,
            slot: None,
            total_carbs_g: None,
            meal_units: None,
            correction_units: None,
            note: None,
        };

        match entry {
            JournalEntry::Measurement(m) => {
                row.kind = "measurement".into();
                row.glucose_gl = Some(m.glucose_gl);
                row.note = m.note.clone();
            }
            JournalEntry::Meal(m) => {
                row.kind = "meal".into();
                row.slot = Some(m.slot.as_str().to_string());
                row.total_carbs_g = Some(m.total_carbs_g);
            }
            JournalEntry::Injection(i) => {
                row.kind = "injection".into();
                row.meal_units = Some(i.meal_units);
                row.correction_units = Some(i.correction_units);
                row.note = i.note.clone();
            }
        }

        row
    }
}

/// Roll up WAL entries into CSV and archive the WAL atomically
///
/// This function:
/// 1. Takes an exclusive lock on the WAL and reads all entries
/// 2. Appends them to the CSV file (creates with headers if needed)
/// 3. Syncs the CSV to disk
/// 4. Renames the WAL to .processed, then releases the lock
/// 5. Returns the number of entries processed
///
/// # Safety
/// - The exclusive lock is held from read through rename, so an appender
///   cannot slip entries into a WAL that is about to be archived
/// - CSV is fsynced before WAL is renamed
/// - WAL is renamed (not deleted) to allow manual recovery if needed
/// - An appender that opened the WAL before the rename lands in the
///   .processed file, so clean up only when no writers are active
pub fn wal_to_csv_and_archive(wal_path: &Path, csv_path: &Path) -> Result<usize> {
    if !wal_path.exists() {
        tracing::info!("No entries in WAL to roll up");
        return Ok(0);
    }

    let wal_file = File::open(wal_path)?;
    wal_file.lock_exclusive()?;

    let entries = crate::journal::parse_entries(&wal_file)?;

    if entries.is_empty() {
        wal_file.unlock()?;
        tracing::info!("No entries in WAL to roll up");
        return Ok(0);
    }

    // Ensure parent directory exists
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Open CSV file for appending
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Write headers only when starting a fresh file
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    // Write all entries to CSV
    for entry in &entries {
        let row = CsvRow::from(entry);
        writer.serialize(row)?;
    }

    // Flush and sync to disk
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Wrote {} entries to CSV", entries.len());

    // Atomically archive the WAL by renaming it, still under the lock
    let processed_path = wal_path.with_extension("wal.processed");
    std::fs::rename(wal_path, &processed_path)?;
    wal_file.unlock()?;

    tracing::info!("Archived WAL to {:?}", processed_path);

    Ok(entries.len())
}

/// Clean up old processed WAL files
///
/// This removes all .wal.processed files in the given directory. Run it
/// only when no writers are active; a writer that raced a rollup may
/// still be appending to a processed file.
pub fn cleanup_processed_wals(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Some(extension) = path.extension() {
            if extension == "processed" {
                std::fs::remove_file(&path)?;
                tracing::debug!("Removed processed WAL: {:?}", path);
                count += 1;
            }
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed WAL files", count);
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::EntrySink;
    use crate::types::{Injection, Measurement};
    use chrono::Utc;
    use std::fs::File;
    use uuid::Uuid;

    fn measurement(glucose_gl: f64) -> JournalEntry {
        JournalEntry::Measurement(Measurement {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            glucose_gl,
            note: None,
        })
    }

    fn injection() -> JournalEntry {
        JournalEntry::Injection(Injection {
            id: Uuid::new_v4(),
            injected_at: Utc::now(),
            meal_units: 6.0,
            correction_units: 1,
            note: None,
        })
    }

    #[test]
    fn test_wal_to_csv_creates_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("journal.wal");
        let csv_path = temp_dir.path().join("journal.csv");

        // Write entries to WAL
        let mut sink = crate::journal::JsonlSink::new(&wal_path);
        sink.append(&measurement(1.20)).unwrap();
        sink.append(&measurement(2.10)).unwrap();
        sink.append(&injection()).unwrap();

        // Roll up to CSV
        let count = wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        assert_eq!(count, 3);

        // Verify CSV exists
        assert!(csv_path.exists());

        // Verify WAL was archived
        assert!(!wal_path.exists());
        assert!(wal_path.with_extension("wal.processed").exists());
    }

    #[test]
    fn test_wal_to_csv_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("journal.wal");
        let csv_path = temp_dir.path().join("journal.csv");

        // First rollup
        let mut sink = crate::journal::JsonlSink::new(&wal_path);
        sink.append(&measurement(1.00)).unwrap();
        let count1 = wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        assert_eq!(count1, 1);

        // Second rollup (appends)
        let mut sink = crate::journal::JsonlSink::new(&wal_path);
        sink.append(&injection()).unwrap();
        let count2 = wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        assert_eq!(count2, 1);

        // Verify CSV has both entries
        let reader = csv::Reader::from_path(&csv_path).unwrap();
        let record_count = reader.into_records().count();
        assert_eq!(record_count, 2);
    }

    #[test]
    fn test_empty_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("empty.wal");
        let csv_path = temp_dir.path().join("journal.csv");

        // Create empty WAL
        File::create(&wal_path).unwrap();

        let count = wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_concurrent_append_during_rollup_loses_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("journal.wal");
        let csv_path = temp_dir.path().join("journal.csv");

        let mut sink = crate::journal::JsonlSink::new(&wal_path);
        let mut ids: Vec<String> = Vec::new();
        for _ in 0..3 {
            let entry = measurement(1.10);
            ids.push(entry.id().to_string());
            sink.append(&entry).unwrap();
        }

        // Append from another thread while the rollup runs
        let writer_path = wal_path.clone();
        let writer = std::thread::spawn(move || {
            let mut sink = crate::journal::JsonlSink::new(&writer_path);
            let mut written = Vec::new();
            for _ in 0..3 {
                let entry = measurement(1.40);
                written.push(entry.id().to_string());
                sink.append(&entry).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
            written
        });

        let rolled = wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        assert!(rolled >= 3);
        ids.extend(writer.join().unwrap());

        // Every entry must survive in the CSV, the fresh WAL, or the archive
        let mut surviving = std::collections::HashSet::new();
        let reader = csv::Reader::from_path(&csv_path).unwrap();
        for record in reader.into_records() {
            surviving.insert(record.unwrap()[0].to_string());
        }
        for path in [wal_path.clone(), wal_path.with_extension("wal.processed")] {
            for entry in crate::journal::read_entries(&path).unwrap() {
                surviving.insert(entry.id().to_string());
            }
        }

        for id in &ids {
            assert!(surviving.contains(id), "entry {} was lost", id);
        }
    }

    #[test]
    fn test_cleanup_processed_wals() {
        let temp_dir = tempfile::tempdir().unwrap();

        // Create some processed WAL files
        File::create(temp_dir.path().join("j1.wal.processed")).unwrap();
        File::create(temp_dir.path().join("j2.wal.processed")).unwrap();
        File::create(temp_dir.path().join("keep.wal")).unwrap();

        let count = cleanup_processed_wals(temp_dir.path()).unwrap();
        assert_eq!(count, 2);

        // Verify only .processed files were removed
        assert!(!temp_dir.path().join("j1.wal.processed").exists());
        assert!(!temp_dir.path().join("j2.wal.processed").exists());
        assert!(temp_dir.path().join("keep.wal").exists());
    }
}
