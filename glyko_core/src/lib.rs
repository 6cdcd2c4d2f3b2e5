#![forbid(unsafe_code)]

//! Core domain model and business logic for the Glyko diabetes care journal.
//!
//! This crate provides:
//! - Domain types (care protocol, journal records, dose request/result)
//! - The bolus dose calculator
//! - The food-carbohydrate library
//! - Persistence (journal WAL, CSV archive, patient record)
//! - Application configuration

pub mod types;
pub mod error;
pub mod protocol;
pub mod foods;
pub mod config;
pub mod logging;
pub mod journal;
pub mod csv_rollup;
pub mod state;
pub mod history;
pub mod calculator;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use protocol::build_default_protocol;
pub use foods::{build_default_foods, compose_meal, FoodLibrary};
pub use config::Config;
pub use journal::{EntrySink, JsonlSink};
pub use state::Patient;
pub use history::{last_correction_at, load_recent_entries};
pub use calculator::calculate_dose;
