//! Bolus dose calculator.
//!
//! A pure, total function over a care protocol and a dose request:
//! - Meal dose from consumed carbs and the slot's carb ratio
//! - Correction dose from the ladder, with a below-target override
//! - Re-correction gate suppressing stacked corrections
//!
//! Input validation is an upstream concern; the calculator assumes
//! well-formed numeric input and never performs I/O.

use crate::types::{CareProtocol, DoseRequest, DoseResult};
use chrono::Duration;

/// Round to one decimal place, half away from zero
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to the nearest whole unit, half away from zero
fn round_whole_units(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Compute a bolus recommendation from a protocol and request
///
/// The result is ephemeral: the caller decides whether to log it as an
/// injection. `max_bolus_units` is deliberately not consulted here; it is
/// presentation-layer metadata.
pub fn calculate_dose(protocol: &CareProtocol, req: &DoseRequest) -> DoseResult {
    // Meal component: carbs over the slot's ratio, one-decimal precision
    let ratio = protocol
        .carb_ratios
        .get(&req.meal_slot)
        .copied()
        .unwrap_or(0.0);

    let meal_dose_units = if req.carbs_g > 0.0 && ratio > 0.0 {
        round_tenth(req.carbs_g / ratio)
    } else {
        0.0
    };

    // Correction component: first covering ladder tier, unless the reading
    // is at or below the low end of target (never correct near hypo)
    let mut correction_dose_units = if req.glucose_gl <= protocol.target_range.min {
        0
    } else {
        protocol.correction_ladder.units_for(req.glucose_gl)
    };

    tracing::debug!(
        "Dose inputs: glucose {:.2} g/L, {} g carbs at {}, ladder match {} U",
        req.glucose_gl,
        req.carbs_g,
        req.meal_slot.as_str(),
        correction_dose_units
    );

    // Re-correction gate: a prior correction still active suppresses this one
    let mut advisory = None;
    if correction_dose_units > 0 {
        if let Some(last) = req.last_correction_at {
            let elapsed: Duration = req.now - last;
            let elapsed_hours = elapsed.num_seconds() as f64 / 3600.0;
            if elapsed_hours < protocol.re_correction_delay_hours {
                tracing::info!(
                    "Correction withheld: last correction {:.1} h ago, minimum interval {} h",
                    elapsed_hours,
                    protocol.re_correction_delay_hours
                );
                correction_dose_units = 0;
                advisory = Some(format!(
                    "Correction withheld: a correction given {:.1} h ago is still active \
                     (minimum interval {} h)",
                    elapsed_hours, protocol.re_correction_delay_hours
                ));
            }
        }
    }

    // Total from the already-rounded meal dose; whole units only here
    let total_dose_units = round_whole_units(meal_dose_units + correction_dose_units as f64);

    DoseResult {
        meal_dose_units,
        correction_dose_units,
        total_dose_units,
        advisory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_default_protocol;
    use crate::types::{CorrectionLadder, CorrectionTier, MealSlot};
    use chrono::{Duration, Utc};

    // Default protocol: target 0.80-1.60 g/L, lunch ratio 10 g/U,
    // ladder [1.60 -> 0, 2.00 -> 1, 3.00 -> 2, above -> 3], delay 3 h.
    fn request(glucose_gl: f64, carbs_g: f64) -> DoseRequest {
        DoseRequest {
            glucose_gl,
            meal_slot: MealSlot::Lunch,
            carbs_g,
            last_correction_at: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_in_range_meal_only() {
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(1.20, 60.0));

        assert_eq!(result.meal_dose_units, 6.0);
        assert_eq!(result.correction_dose_units, 0);
        assert_eq!(result.total_dose_units, 6);
        assert!(result.advisory.is_none());
    }

    #[test]
    fn test_high_glucose_correction_only() {
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(2.50, 0.0));

        assert_eq!(result.meal_dose_units, 0.0);
        assert_eq!(result.correction_dose_units, 2);
        assert_eq!(result.total_dose_units, 2);
    }

    #[test]
    fn test_recent_correction_is_suppressed() {
        let protocol = build_default_protocol();
        let mut req = request(2.50, 40.0);
        req.last_correction_at = Some(req.now - Duration::hours(1));

        let result = calculate_dose(&protocol, &req);

        assert_eq!(result.meal_dose_units, 4.0);
        assert_eq!(result.correction_dose_units, 0);
        assert_eq!(result.total_dose_units, 4);
        let advisory = result.advisory.expect("advisory should be set");
        assert!(!advisory.is_empty());
    }

    #[test]
    fn test_below_target_never_corrects() {
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(0.75, 30.0));

        assert_eq!(result.meal_dose_units, 3.0);
        assert_eq!(result.correction_dose_units, 0);
        assert_eq!(result.total_dose_units, 3);
        assert!(result.advisory.is_none());
    }

    #[test]
    fn test_catch_all_tier_above_all_thresholds() {
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(5.00, 0.0));

        assert_eq!(result.correction_dose_units, 3);
        assert_eq!(result.total_dose_units, 3);
    }

    #[test]
    fn test_zero_carbs_means_zero_meal_dose() {
        let protocol = build_default_protocol();
        for glucose in [0.60, 1.20, 2.50, 4.00] {
            let result = calculate_dose(&protocol, &request(glucose, 0.0));
            assert_eq!(result.meal_dose_units, 0.0);
        }
    }

    #[test]
    fn test_target_min_boundary_is_inclusive() {
        let protocol = build_default_protocol();

        // Exactly at target min: override applies
        let at_min = calculate_dose(&protocol, &request(0.80, 0.0));
        assert_eq!(at_min.correction_dose_units, 0);

        // Just above target min: ladder decides (first tier gives 0 anyway)
        let above_min = calculate_dose(&protocol, &request(0.81, 0.0));
        assert_eq!(above_min.correction_dose_units, 0);
    }

    #[test]
    fn test_ladder_boundary_is_inclusive() {
        let protocol = build_default_protocol();

        // Exactly on a tier bound belongs to that tier, not the next
        assert_eq!(calculate_dose(&protocol, &request(2.00, 0.0)).correction_dose_units, 1);
        assert_eq!(calculate_dose(&protocol, &request(2.01, 0.0)).correction_dose_units, 2);
    }

    #[test]
    fn test_below_target_overrides_any_ladder() {
        // A pathological ladder that corrects from zero upward
        let mut protocol = build_default_protocol();
        protocol.correction_ladder = CorrectionLadder {
            tiers: vec![CorrectionTier::Unbounded { units: 5 }],
        };

        let result = calculate_dose(&protocol, &request(0.70, 0.0));
        assert_eq!(result.correction_dose_units, 0);
    }

    #[test]
    fn test_elapsed_exactly_at_delay_allows_correction() {
        let protocol = build_default_protocol();
        let mut req = request(2.50, 0.0);
        req.last_correction_at = Some(req.now - Duration::hours(3));

        let result = calculate_dose(&protocol, &req);

        assert_eq!(result.correction_dose_units, 2);
        assert!(result.advisory.is_none());
    }

    #[test]
    fn test_suppression_only_when_correction_applies() {
        // A recent correction with an in-range reading produces no advisory
        let protocol = build_default_protocol();
        let mut req = request(1.20, 60.0);
        req.last_correction_at = Some(req.now - Duration::minutes(30));

        let result = calculate_dose(&protocol, &req);

        assert_eq!(result.correction_dose_units, 0);
        assert!(result.advisory.is_none());
    }

    #[test]
    fn test_two_stage_rounding() {
        // 44.5 g at 10 g/U gives a raw 4.45 that rounds to 4.5 before the
        // sum, so the total rounds up to 5. A single rounding of the raw
        // sum would give 4 - the meal dose enters the total at its
        // one-decimal display precision, not at raw precision.
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(1.20, 44.5));

        assert_eq!(result.meal_dose_units, 4.5);
        assert_eq!(result.correction_dose_units, 0);
        assert_eq!(result.total_dose_units, 5);
        assert_eq!((44.5_f64 / 10.0).round() as u32, 4); // single-stage disagrees
    }

    #[test]
    fn test_two_stage_rounding_with_correction() {
        // Same discrepancy with a correction in the sum: 4.5 + 1 = 5.5
        // rounds to 6, while the raw 4.45 + 1 = 5.45 would round to 5
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(1.80, 44.5));

        assert_eq!(result.meal_dose_units, 4.5);
        assert_eq!(result.correction_dose_units, 1);
        assert_eq!(result.total_dose_units, 6);
    }

    #[test]
    fn test_total_rounds_half_up() {
        // 45 g at 10 g/U = 4.5 meal units, no correction: total rounds to 5
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(1.20, 45.0));

        assert_eq!(result.meal_dose_units, 4.5);
        assert_eq!(result.total_dose_units, 5);
    }

    #[test]
    fn test_missing_slot_ratio_means_zero_meal_dose() {
        let mut protocol = build_default_protocol();
        protocol.carb_ratios.remove(&MealSlot::Lunch);

        let result = calculate_dose(&protocol, &request(1.20, 60.0));
        assert_eq!(result.meal_dose_units, 0.0);
    }

    #[test]
    fn test_large_inputs_stay_formula_consistent() {
        // No sanity ceiling: huge carbs produce a huge but consistent dose
        let protocol = build_default_protocol();
        let result = calculate_dose(&protocol, &request(1.20, 1000.0));

        assert_eq!(result.meal_dose_units, 100.0);
        assert_eq!(result.total_dose_units, 100);
    }

    #[test]
    fn test_idempotent_for_identical_input() {
        let protocol = build_default_protocol();
        let mut req = request(2.50, 40.0);
        req.last_correction_at = Some(req.now - Duration::hours(1));

        let first = calculate_dose(&protocol, &req);
        let second = calculate_dose(&protocol, &req);

        assert_eq!(first, second);
    }

    #[test]
    fn test_max_bolus_is_not_enforced() {
        // The protocol ceiling is advisory; the calculator never clamps
        let mut protocol = build_default_protocol();
        protocol.max_bolus_units = 5.0;

        let result = calculate_dose(&protocol, &request(1.20, 200.0));
        assert_eq!(result.total_dose_units, 20);
    }
}
