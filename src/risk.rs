/// Risk classification.
///
/// Two independent derivations exist and must not be conflated:
///
/// - `classify` maps a model probability to a `RiskLevel`. This is the
///   authoritative category for predictions and trend points.
/// - `classify_ratio` maps `current_river_level / flood_threshold` to a
///   `RiskLevel`. For regions the server already assigns `risk_level`, so
///   the ratio category is only a display hint; `reconcile` reports when
///   the two disagree.
///
/// Forecasts from the hybrid model service use their own bands
/// (`classify_forecast`) and call the middle one "Moderate"; it maps onto
/// `RiskLevel::Medium`.

use serde::Serialize;

use crate::model::{RegionRisk, RiskLevel};

/// Probabilities at or above this are High.
pub const HIGH_THRESHOLD: f64 = 0.7;
/// Probabilities at or above this (and below `HIGH_THRESHOLD`) are Medium.
pub const MEDIUM_THRESHOLD: f64 = 0.4;

/// River level at or above the flood threshold.
pub const RATIO_HIGH: f64 = 1.0;
/// River level at or above 80% of the flood threshold.
pub const RATIO_MEDIUM: f64 = 0.8;

/// Forecast probabilities strictly above this are High.
pub const FORECAST_HIGH: f64 = 0.8;
/// Forecast probabilities strictly above this (up to `FORECAST_HIGH`) are
/// Moderate.
pub const FORECAST_MODERATE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    /// Probability was NaN or outside [0, 1].
    #[error("probability {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f64),
}

/// Classifies a probability in [0, 1]. Lower bounds are closed, so a value
/// exactly on a boundary belongs to the higher category.
///
/// # Errors
/// `RiskError::ProbabilityOutOfRange` for NaN or values outside [0, 1].
/// Callers that want out-of-range values folded in should use
/// `classify_clamped`.
pub fn classify(probability: f64) -> Result<RiskLevel, RiskError> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(RiskError::ProbabilityOutOfRange(probability));
    }
    Ok(band(probability))
}

/// Like `classify`, but clamps finite values into [0, 1] first. NaN is
/// still rejected since it has no meaningful position.
pub fn classify_clamped(probability: f64) -> Result<RiskLevel, RiskError> {
    if probability.is_nan() {
        return Err(RiskError::ProbabilityOutOfRange(probability));
    }
    Ok(band(probability.clamp(0.0, 1.0)))
}

fn band(probability: f64) -> RiskLevel {
    if probability >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if probability >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Category for a hybrid-model forecast probability. Unlike `classify`,
/// the bounds are open: exactly 0.8 is Moderate and exactly 0.5 is Low.
///
/// # Errors
/// `RiskError::ProbabilityOutOfRange` for NaN or values outside [0, 1].
pub fn classify_forecast(probability: f64) -> Result<RiskLevel, RiskError> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(RiskError::ProbabilityOutOfRange(probability));
    }
    Ok(if probability > FORECAST_HIGH {
        RiskLevel::High
    } else if probability > FORECAST_MODERATE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    })
}

/// Ratio-based category, used when no probability is available.
pub fn classify_ratio(ratio: f64) -> RiskLevel {
    if ratio >= RATIO_HIGH {
        RiskLevel::High
    } else if ratio >= RATIO_MEDIUM {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// A region whose server-assigned level differs from its ratio hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDisagreement {
    pub region_id: String,
    pub server_level: RiskLevel,
    pub ratio_level: RiskLevel,
    pub ratio: f64,
}

/// Compares a region's server level with the ratio-derived hint.
///
/// Returns `None` when they agree or when the region has no usable ratio.
/// The server level stays authoritative either way.
pub fn reconcile(region: &RegionRisk) -> Option<RiskDisagreement> {
    let ratio = region.risk_ratio()?;
    let ratio_level = classify_ratio(ratio);
    if ratio_level == region.risk_level {
        return None;
    }
    Some(RiskDisagreement {
        region_id: region.id.clone(),
        server_level: region.risk_level,
        ratio_level,
        ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinates;
    use proptest::prelude::*;

    // --- Probability path ---------------------------------------------------

    #[test]
    fn test_forecast_bands_are_open_above() {
        assert_eq!(classify_forecast(0.81), Ok(RiskLevel::High));
        assert_eq!(classify_forecast(0.8), Ok(RiskLevel::Medium));
        assert_eq!(classify_forecast(0.51), Ok(RiskLevel::Medium));
        assert_eq!(classify_forecast(0.5), Ok(RiskLevel::Low));
        assert_eq!(classify_forecast(0.0), Ok(RiskLevel::Low));
        assert!(classify_forecast(1.2).is_err());
        assert!(classify_forecast(f64::NAN).is_err());
    }

    #[test]
    fn test_classify_boundaries_belong_to_higher_category() {
        assert_eq!(classify(0.7), Ok(RiskLevel::High));
        assert_eq!(classify(0.6999), Ok(RiskLevel::Medium));
        assert_eq!(classify(0.4), Ok(RiskLevel::Medium));
        assert_eq!(classify(0.3999), Ok(RiskLevel::Low));
    }

    #[test]
    fn test_classify_extremes() {
        assert_eq!(classify(0.0), Ok(RiskLevel::Low));
        assert_eq!(classify(1.0), Ok(RiskLevel::High));
    }

    #[test]
    fn test_classify_rejects_out_of_range() {
        assert!(matches!(classify(1.01), Err(RiskError::ProbabilityOutOfRange(_))));
        assert!(matches!(classify(-0.1), Err(RiskError::ProbabilityOutOfRange(_))));
        assert!(matches!(classify(f64::NAN), Err(RiskError::ProbabilityOutOfRange(_))));
        assert!(classify(f64::INFINITY).is_err());
    }

    #[test]
    fn test_classify_clamped_folds_out_of_range() {
        assert_eq!(classify_clamped(1.5), Ok(RiskLevel::High));
        assert_eq!(classify_clamped(-3.0), Ok(RiskLevel::Low));
        assert!(classify_clamped(f64::NAN).is_err());
    }

    // --- Ratio path ---------------------------------------------------------

    #[test]
    fn test_classify_ratio_bands() {
        assert_eq!(classify_ratio(1.0), RiskLevel::High);
        assert_eq!(classify_ratio(1.4), RiskLevel::High);
        assert_eq!(classify_ratio(0.8), RiskLevel::Medium);
        assert_eq!(classify_ratio(0.79), RiskLevel::Low);
    }

    #[test]
    fn test_ratio_and_probability_paths_differ() {
        // 0.75 is High as a probability but Low as a ratio.
        assert_eq!(classify(0.75), Ok(RiskLevel::High));
        assert_eq!(classify_ratio(0.75), RiskLevel::Low);
    }

    fn region(level: f64, threshold: f64, risk: RiskLevel) -> RegionRisk {
        RegionRisk {
            id: "naryn".to_string(),
            name: "Naryn".to_string(),
            basin: "Naryn".to_string(),
            elevation_range: "high".to_string(),
            coordinates: Coordinates { lat: 41.4, lon: 76.0 },
            current_river_level: level,
            flood_threshold: threshold,
            risk_level: risk,
        }
    }

    #[test]
    fn test_reconcile_agreeing_region_is_none() {
        assert_eq!(reconcile(&region(4.6, 4.5, RiskLevel::High)), None);
    }

    #[test]
    fn test_reconcile_reports_disagreement() {
        let d = reconcile(&region(2.0, 4.5, RiskLevel::High))
            .expect("ratio 0.44 should disagree with High");
        assert_eq!(d.server_level, RiskLevel::High);
        assert_eq!(d.ratio_level, RiskLevel::Low);
        assert_eq!(d.region_id, "naryn");
    }

    #[test]
    fn test_reconcile_without_threshold_is_none() {
        assert_eq!(reconcile(&region(2.0, 0.0, RiskLevel::High)), None);
    }

    proptest! {
        /// Property: every in-range probability classifies.
        #[test]
        fn classify_total_on_unit_interval(p in 0.0f64..=1.0) {
            prop_assert!(classify(p).is_ok());
        }

        /// Property: category rank never decreases as probability grows.
        #[test]
        fn classify_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_level = classify(lo).unwrap();
            let hi_level = classify(hi).unwrap();
            prop_assert!(lo_level.rank() <= hi_level.rank());
        }
    }
}
