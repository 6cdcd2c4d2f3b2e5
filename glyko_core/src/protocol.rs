//! Care protocol construction, validation, and edit operations.
//!
//! The correction ladder is only ever mutated through the explicit setters
//! in this module; nothing in the system auto-generates protocol changes.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Cached default protocol - built once and reused across all operations
static DEFAULT_PROTOCOL: Lazy<CareProtocol> = Lazy::new(build_default_protocol_internal);

/// Get a reference to the cached default protocol
pub fn get_default_protocol() -> &'static CareProtocol {
    &DEFAULT_PROTOCOL
}

/// Builds the default starter protocol
///
/// This is a plausible starting point for a newly created patient record;
/// the clinician-supplied values are applied through the edit operations.
pub fn build_default_protocol() -> CareProtocol {
    build_default_protocol_internal()
}

fn build_default_protocol_internal() -> CareProtocol {
    let mut carb_ratios = HashMap::new();
    carb_ratios.insert(MealSlot::Breakfast, 10.0);
    carb_ratios.insert(MealSlot::Lunch, 10.0);
    carb_ratios.insert(MealSlot::Snack, 15.0);
    carb_ratios.insert(MealSlot::Dinner, 12.0);

    CareProtocol {
        target_range: TargetRange { min: 0.80, max: 1.60 },
        carb_ratios,
        correction_ladder: CorrectionLadder {
            tiers: vec![
                CorrectionTier::Bounded { max_glucose: 1.60, units: 0 },
                CorrectionTier::Bounded { max_glucose: 2.00, units: 1 },
                CorrectionTier::Bounded { max_glucose: 3.00, units: 2 },
                CorrectionTier::Unbounded { units: 3 },
            ],
        },
        max_bolus_units: 10.0,
        re_correction_delay_hours: 3.0,
    }
}

impl CorrectionLadder {
    /// Correction units for a glucose reading
    ///
    /// Selects the first tier (in order) whose bound covers the reading;
    /// a reading exactly equal to a tier's `max_glucose` belongs to that
    /// tier. The unbounded tail catches everything above the finite tiers.
    pub fn units_for(&self, glucose_gl: f64) -> u32 {
        let mut last_units = 0;
        for tier in &self.tiers {
            match tier {
                CorrectionTier::Bounded { max_glucose, units } => {
                    if glucose_gl <= *max_glucose {
                        return *units;
                    }
                    last_units = *units;
                }
                CorrectionTier::Unbounded { units } => return *units,
            }
        }
        // Reachable only for a ladder that fails validation (no unbounded
        // tail); fall back to the highest tier seen.
        last_units
    }
}

impl CareProtocol {
    /// Validate the protocol for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.target_range.min >= self.target_range.max {
            errors.push(format!(
                "Target range min {} must be below max {}",
                self.target_range.min, self.target_range.max
            ));
        }

        if self.carb_ratios.is_empty() {
            errors.push("Protocol has no carb ratios".to_string());
        }
        for (slot, ratio) in &self.carb_ratios {
            if *ratio <= 0.0 {
                errors.push(format!(
                    "Carb ratio for {} must be positive (got {})",
                    slot.as_str(),
                    ratio
                ));
            }
        }

        match self.correction_ladder.tiers.as_slice() {
            [] => errors.push("Correction ladder is empty".to_string()),
            tiers => {
                let mut prev_max: Option<f64> = None;
                for (i, tier) in tiers.iter().enumerate() {
                    let is_last = i == tiers.len() - 1;
                    match tier {
                        CorrectionTier::Bounded { max_glucose, .. } => {
                            if is_last {
                                errors.push(
                                    "Correction ladder must end with an unbounded tier"
                                        .to_string(),
                                );
                            }
                            if let Some(prev) = prev_max {
                                if *max_glucose <= prev {
                                    errors.push(format!(
                                        "Correction ladder thresholds must be strictly \
                                         increasing ({} after {})",
                                        max_glucose, prev
                                    ));
                                }
                            }
                            prev_max = Some(*max_glucose);
                        }
                        CorrectionTier::Unbounded { .. } => {
                            if !is_last {
                                errors.push(format!(
                                    "Unbounded tier at position {} must be last",
                                    i
                                ));
                            }
                        }
                    }
                }
            }
        }

        if self.re_correction_delay_hours < 0.0 {
            errors.push(format!(
                "Re-correction delay must be non-negative (got {})",
                self.re_correction_delay_hours
            ));
        }
        if self.max_bolus_units < 0.0 {
            errors.push(format!(
                "Max bolus must be non-negative (got {})",
                self.max_bolus_units
            ));
        }

        errors
    }

    /// Set the glycemic target range
    pub fn set_target_range(&mut self, min: f64, max: f64) -> Result<()> {
        if min >= max {
            return Err(Error::Protocol(format!(
                "Target range min {} must be below max {}",
                min, max
            )));
        }
        self.target_range = TargetRange { min, max };
        tracing::info!("Target range set to {:.2}-{:.2} g/L", min, max);
        Ok(())
    }

    /// Set the carb ratio for one meal slot (grams per insulin unit)
    pub fn set_carb_ratio(&mut self, slot: MealSlot, grams_per_unit: f64) -> Result<()> {
        if grams_per_unit <= 0.0 {
            return Err(Error::Protocol(format!(
                "Carb ratio must be positive (got {})",
                grams_per_unit
            )));
        }
        self.carb_ratios.insert(slot, grams_per_unit);
        tracing::info!(
            "Carb ratio for {} set to {} g/U",
            slot.as_str(),
            grams_per_unit
        );
        Ok(())
    }

    /// Set the minimum interval between correction doses
    pub fn set_re_correction_delay(&mut self, hours: f64) -> Result<()> {
        if hours < 0.0 {
            return Err(Error::Protocol(format!(
                "Re-correction delay must be non-negative (got {})",
                hours
            )));
        }
        self.re_correction_delay_hours = hours;
        tracing::info!("Re-correction delay set to {} h", hours);
        Ok(())
    }

    /// Set the advisory max bolus ceiling
    pub fn set_max_bolus(&mut self, units: f64) -> Result<()> {
        if units < 0.0 {
            return Err(Error::Protocol(format!(
                "Max bolus must be non-negative (got {})",
                units
            )));
        }
        self.max_bolus_units = units;
        tracing::info!("Max bolus set to {} U", units);
        Ok(())
    }

    /// Replace the correction ladder wholesale
    ///
    /// The new ladder is validated before it is installed.
    pub fn replace_ladder(&mut self, ladder: CorrectionLadder) -> Result<()> {
        let mut candidate = self.clone();
        candidate.correction_ladder = ladder;
        let errors = candidate.validate();
        if !errors.is_empty() {
            return Err(Error::Protocol(errors.join("; ")));
        }
        self.correction_ladder = candidate.correction_ladder;
        tracing::info!(
            "Correction ladder replaced ({} tiers)",
            self.correction_ladder.tiers.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_protocol_validates() {
        let protocol = build_default_protocol();
        let errors = protocol.validate();
        assert!(
            errors.is_empty(),
            "Default protocol has validation errors: {:?}",
            errors
        );
    }

    #[test]
    fn test_default_protocol_covers_all_slots() {
        let protocol = build_default_protocol();
        for slot in [
            MealSlot::Breakfast,
            MealSlot::Lunch,
            MealSlot::Snack,
            MealSlot::Dinner,
        ] {
            assert!(
                protocol.carb_ratios.get(&slot).copied().unwrap_or(0.0) > 0.0,
                "Missing ratio for {:?}",
                slot
            );
        }
    }

    #[test]
    fn test_units_for_matches_first_covering_tier() {
        let ladder = build_default_protocol().correction_ladder;

        assert_eq!(ladder.units_for(1.20), 0);
        assert_eq!(ladder.units_for(1.80), 1);
        assert_eq!(ladder.units_for(2.50), 2);
        assert_eq!(ladder.units_for(5.00), 3);
    }

    #[test]
    fn test_units_for_threshold_is_inclusive() {
        let ladder = build_default_protocol().correction_ladder;

        // A reading exactly on a boundary belongs to the lower tier
        assert_eq!(ladder.units_for(1.60), 0);
        assert_eq!(ladder.units_for(2.00), 1);
        assert_eq!(ladder.units_for(3.00), 2);
    }

    #[test]
    fn test_validate_rejects_non_increasing_ladder() {
        let mut protocol = build_default_protocol();
        protocol.correction_ladder = CorrectionLadder {
            tiers: vec![
                CorrectionTier::Bounded { max_glucose: 2.00, units: 1 },
                CorrectionTier::Bounded { max_glucose: 1.60, units: 0 },
                CorrectionTier::Unbounded { units: 3 },
            ],
        };

        let errors = protocol.validate();
        assert!(errors.iter().any(|e| e.contains("strictly increasing")));
    }

    #[test]
    fn test_validate_requires_unbounded_tail() {
        let mut protocol = build_default_protocol();
        protocol.correction_ladder = CorrectionLadder {
            tiers: vec![
                CorrectionTier::Bounded { max_glucose: 1.60, units: 0 },
                CorrectionTier::Bounded { max_glucose: 2.00, units: 1 },
            ],
        };

        let errors = protocol.validate();
        assert!(errors.iter().any(|e| e.contains("unbounded tier")));
    }

    #[test]
    fn test_validate_rejects_misplaced_unbounded_tier() {
        let mut protocol = build_default_protocol();
        protocol.correction_ladder = CorrectionLadder {
            tiers: vec![
                CorrectionTier::Unbounded { units: 3 },
                CorrectionTier::Bounded { max_glucose: 2.00, units: 1 },
            ],
        };

        let errors = protocol.validate();
        assert!(errors.iter().any(|e| e.contains("must be last")));
    }

    #[test]
    fn test_validate_rejects_inverted_target_range() {
        let mut protocol = build_default_protocol();
        protocol.target_range = TargetRange { min: 1.60, max: 0.80 };

        let errors = protocol.validate();
        assert!(errors.iter().any(|e| e.contains("Target range")));
    }

    #[test]
    fn test_set_carb_ratio_rejects_zero() {
        let mut protocol = build_default_protocol();
        assert!(protocol.set_carb_ratio(MealSlot::Lunch, 0.0).is_err());
        assert!(protocol.set_carb_ratio(MealSlot::Lunch, 12.0).is_ok());
        assert_eq!(protocol.carb_ratios[&MealSlot::Lunch], 12.0);
    }

    #[test]
    fn test_replace_ladder_validates() {
        let mut protocol = build_default_protocol();

        let bad = CorrectionLadder {
            tiers: vec![CorrectionTier::Bounded { max_glucose: 2.00, units: 1 }],
        };
        assert!(protocol.replace_ladder(bad).is_err());

        let good = CorrectionLadder {
            tiers: vec![
                CorrectionTier::Bounded { max_glucose: 1.50, units: 0 },
                CorrectionTier::Unbounded { units: 2 },
            ],
        };
        assert!(protocol.replace_ladder(good.clone()).is_ok());
        assert_eq!(protocol.correction_ladder, good);
    }

    #[test]
    fn test_set_target_range_rejects_inverted() {
        let mut protocol = build_default_protocol();
        assert!(protocol.set_target_range(1.60, 0.80).is_err());
        assert!(protocol.set_target_range(0.70, 1.40).is_ok());
        assert_eq!(protocol.target_range.min, 0.70);
    }
}
