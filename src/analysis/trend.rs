/// Reshapes a parallel-array risk trend into chart rows.

use serde::Serialize;

use crate::model::{RiskLevel, TrendPoint, TrendSeries};
use crate::risk::{self, RiskError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrendError {
    #[error(
        "trend arrays differ in length: {dates} dates, {probabilities} probabilities, {risk_levels} risk levels"
    )]
    LengthMismatch {
        dates: usize,
        probabilities: usize,
        risk_levels: usize,
    },

    #[error("unknown risk level '{value}' at index {index}")]
    UnknownRiskLevel { index: usize, value: String },
}

/// Zips the three arrays of a `TrendSeries` into rows.
///
/// # Errors
/// - `TrendError::LengthMismatch` when the arrays are not all the same
///   length. Nothing is truncated.
/// - `TrendError::UnknownRiskLevel` when a risk level is not Low, Medium or
///   High.
pub fn format_trend(series: &TrendSeries) -> Result<Vec<TrendPoint>, TrendError> {
    let (d, p, r) = (
        series.dates.len(),
        series.probabilities.len(),
        series.risk_levels.len(),
    );
    if d != p || d != r {
        return Err(TrendError::LengthMismatch {
            dates: d,
            probabilities: p,
            risk_levels: r,
        });
    }

    series
        .dates
        .iter()
        .zip(&series.probabilities)
        .zip(&series.risk_levels)
        .enumerate()
        .map(|(index, ((date, probability), level))| {
            let risk_level = level
                .parse::<RiskLevel>()
                .map_err(|_| TrendError::UnknownRiskLevel {
                    index,
                    value: level.clone(),
                })?;
            Ok(TrendPoint {
                date: date.clone(),
                probability: *probability,
                risk_level,
            })
        })
        .collect()
}

impl TrendPoint {
    /// Category recomputed from the probability. The server-provided
    /// `risk_level` may disagree if the backend used different thresholds.
    pub fn derived_level(&self) -> Result<RiskLevel, RiskError> {
        risk::classify(self.probability)
    }
}

/// Header numbers for a trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub points: usize,
    pub min_probability: f64,
    pub max_probability: f64,
    pub latest: TrendPoint,
}

/// `None` for an empty trend.
pub fn trend_summary(points: &[TrendPoint]) -> Option<TrendSummary> {
    let latest = points.last()?.clone();
    let min_probability = points.iter().map(|p| p.probability).fold(f64::INFINITY, f64::min);
    let max_probability = points.iter().map(|p| p.probability).fold(f64::NEG_INFINITY, f64::max);
    Some(TrendSummary {
        points: points.len(),
        min_probability,
        max_probability,
        latest,
    })
}
