//! Core domain types for the Glyko diabetes care journal.
//!
//! This module defines the fundamental types used throughout the system:
//! - The care protocol (target range, carb ratios, correction ladder)
//! - Journal records (measurements, meals, injections)
//! - Dose calculation request and result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Care Protocol Types
// ============================================================================

/// Meal slot a carb ratio or meal record is keyed by
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
}

impl MealSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Snack => "snack",
            MealSlot::Dinner => "dinner",
        }
    }
}

/// Glycemic target band, in g/L
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TargetRange {
    pub min: f64,
    pub max: f64,
}

/// One tier of the correction ladder
///
/// The ladder is an ascending sequence of bounded tiers closed by a single
/// unbounded tier, so "the last rule always matches" is visible in the type
/// rather than encoded as an infinity sentinel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CorrectionTier {
    /// Applies to readings up to and including `max_glucose` (g/L)
    Bounded { max_glucose: f64, units: u32 },
    /// Catch-all for readings above every bounded tier
    Unbounded { units: u32 },
}

/// Ordered correction-rule ladder
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct CorrectionLadder {
    pub tiers: Vec<CorrectionTier>,
}

/// Per-patient care protocol, owned by the patient record
///
/// `max_bolus_units` is advisory metadata for the presentation layer; the
/// calculator never reads it and never clamps its output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CareProtocol {
    pub target_range: TargetRange,
    /// Grams of carbohydrate offset by one insulin unit, per meal slot
    pub carb_ratios: HashMap<MealSlot, f64>,
    pub correction_ladder: CorrectionLadder,
    pub max_bolus_units: f64,
    /// Minimum hours between two correction doses
    pub re_correction_delay_hours: f64,
}

// ============================================================================
// Journal Record Types
// ============================================================================

/// A logged blood-glucose measurement
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    pub taken_at: DateTime<Utc>,
    /// Blood glucose in g/L
    pub glucose_gl: f64,
    pub note: Option<String>,
}

/// One weighed portion of a food within a meal
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Portion {
    pub food_id: String,
    pub weight_g: f64,
    pub carbs_g: f64,
}

/// A logged meal, composed from the food library
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Meal {
    pub id: Uuid,
    pub eaten_at: DateTime<Utc>,
    pub slot: MealSlot,
    pub portions: Vec<Portion>,
    pub total_carbs_g: f64,
}

/// A logged insulin injection, split into its bolus components
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Injection {
    pub id: Uuid,
    pub injected_at: DateTime<Utc>,
    pub meal_units: f64,
    pub correction_units: u32,
    pub note: Option<String>,
}

impl Injection {
    /// Whether this injection carried a correction component
    pub fn is_correction(&self) -> bool {
        self.correction_units > 0
    }
}

/// A single journal entry of any record kind
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    Measurement(Measurement),
    Meal(Meal),
    Injection(Injection),
}

impl JournalEntry {
    /// Get the unique ID for this entry
    pub fn id(&self) -> Uuid {
        match self {
            JournalEntry::Measurement(m) => m.id,
            JournalEntry::Meal(m) => m.id,
            JournalEntry::Injection(i) => i.id,
        }
    }

    /// Get the timestamp when this entry occurred
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JournalEntry::Measurement(m) => m.taken_at,
            JournalEntry::Meal(m) => m.eaten_at,
            JournalEntry::Injection(i) => i.injected_at,
        }
    }

    /// Get this entry as an injection (returns None for other kinds)
    pub fn as_injection(&self) -> Option<&Injection> {
        match self {
            JournalEntry::Injection(i) => Some(i),
            _ => None,
        }
    }
}

// ============================================================================
// Dose Calculation Types
// ============================================================================

/// Ephemeral input to the dose calculator, constructed per calculation
///
/// `now` is passed explicitly rather than read internally so that the
/// re-correction gate stays deterministic and testable.
#[derive(Clone, Debug)]
pub struct DoseRequest {
    /// Current blood glucose in g/L
    pub glucose_gl: f64,
    pub meal_slot: MealSlot,
    /// Total consumed carbohydrates in grams
    pub carbs_g: f64,
    /// Timestamp of the most recent correction-type injection, if any
    pub last_correction_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Output of the dose calculator
///
/// Never persisted directly; logging the eventual injection is the caller's
/// separate action.
#[derive(Clone, Debug, PartialEq)]
pub struct DoseResult {
    /// Meal component, rounded to one decimal
    pub meal_dose_units: f64,
    /// Correction component, whole units from the ladder
    pub correction_dose_units: u32,
    /// Sum of the two components, rounded to the nearest whole unit
    pub total_dose_units: u32,
    /// Set when a correction was suppressed by the re-correction gate
    pub advisory: Option<String>,
}
