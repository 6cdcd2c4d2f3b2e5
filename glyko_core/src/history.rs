//! Journal history loading with a recent-day window.
//!
//! This module loads recent entries from both the WAL and the CSV archive
//! to supply context for the dose calculator, in particular the timestamp
//! of the most recent correction-type injection.

use crate::types::{Injection, Meal, MealSlot, Measurement};
use crate::{JournalEntry, Result};
use chrono::{DateTime, Duration, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// CSV row format for reading archived entries
#[derive(Debug, Deserialize)]
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

impl TryFrom<CsvRow> for JournalEntry {
    type Error = crate::Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| crate::Error::Other(format!("Invalid UUID: {}", e)))?;

        let at = DateTime::parse_from_rfc3339(&row.at)
            .map_err(|e| crate::Error::Other(format!("Invalid date: {}", e)))?
            .with_timezone(&Utc);

        match row.kind.as_str() {
            "measurement" => Ok(JournalEntry::Measurement(Measurement {
                id,
                taken_at: at,
                glucose_gl: row
                    .glucose_gl
                    .ok_or_else(|| crate::Error::Other("Measurement without glucose".into()))?,
                note: row.note,
            })),
            "meal" => Ok(JournalEntry::Meal(Meal {
                id,
                eaten_at: at,
                slot: parse_slot(row.slot.as_deref().unwrap_or(""))?,
                portions: vec![], // Not stored in CSV
                total_carbs_g: row.total_carbs_g.unwrap_or(0.0),
            })),
            "injection" => Ok(JournalEntry::Injection(Injection {
                id,
                injected_at: at,
                meal_units: row.meal_units.unwrap_or(0.0),
                correction_units: row.correction_units.unwrap_or(0),
                note: row.note,
            })),
            other => Err(crate::Error::Other(format!(
                "Unknown entry kind '{}'",
                other
            ))),
        }
    }
}

fn parse_slot(s: &str) -> Result<MealSlot> {
    match s {
        "breakfast" => Ok(MealSlot::Breakfast),
        "lunch" => Ok(MealSlot::Lunch),
        "snack" => Ok(MealSlot::Snack),
        "dinner" => Ok(MealSlot::Dinner),
        other => Err(crate::Error::Other(format!("Unknown meal slot '{}'", other))),
    }
}

/// Load entries from the last N days from both WAL and CSV
///
/// Returns entries sorted by timestamp (newest first).
/// Automatically deduplicates entries that appear in both WAL and CSV.
pub fn load_recent_entries(
    wal_path: &Path,
    csv_path: &Path,
    days: i64,
) -> Result<Vec<JournalEntry>> {
    let cutoff = Utc::now() - Duration::days(days);
    let mut entries = Vec::new();
    let mut seen_ids = HashSet::new();

    // Load from WAL first (most recent)
    if wal_path.exists() {
        let wal_entries = crate::journal::read_entries(wal_path)?;
        for entry in wal_entries {
            if entry.timestamp() >= cutoff {
                seen_ids.insert(entry.id());
                entries.push(entry);
            }
        }
        tracing::debug!("Loaded {} entries from WAL", entries.len());
    }

    // Load from CSV (archived)
    if csv_path.exists() {
        let csv_entries = load_entries_from_csv(csv_path)?;
        let mut csv_count = 0;
        for entry in csv_entries {
            if entry.timestamp() >= cutoff && !seen_ids.contains(&entry.id()) {
                seen_ids.insert(entry.id());
                entries.push(entry);
                csv_count += 1;
            }
        }
        tracing::debug!("Loaded {} entries from CSV", csv_count);
    }

    // Sort by timestamp, newest first
    entries.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

    tracing::info!(
        "Loaded {} total entries from last {} days",
        entries.len(),
        days
    );

    Ok(entries)
}

/// Load all entries from a CSV file
fn load_entries_from_csv(path: &Path) -> Result<Vec<JournalEntry>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut entries = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match JournalEntry::try_from(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse CSV row: {}", e);
                    // Continue processing other rows
                }
            },
            Err(e) => {
                tracing::warn!("Failed to deserialize CSV row: {}", e);
            }
        }
    }

    Ok(entries)
}

/// Timestamp of the most recent correction-type injection, if any
///
/// This is the journal's one contract with the dose calculator. Entries
/// are expected sorted newest first (as `load_recent_entries` returns).
pub fn last_correction_at(entries: &[JournalEntry]) -> Option<DateTime<Utc>> {
    entries
        .iter()
        .filter_map(|e| e.as_injection())
        .find(|i| i.is_correction())
        .map(|i| i.injected_at)
}
