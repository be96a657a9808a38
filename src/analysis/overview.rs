/// Overview metrics over the latest hybrid-model forecasts: per-level
/// counts, mean probability, the single highest-risk region and a top-N
/// ranking.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Forecast, RiskLevel};

/// Length of the ranking shown on the overview page.
pub const TOP_REGIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastOverview {
    pub total_regions: usize,
    /// Every level is present, zero if unused.
    pub distribution: BTreeMap<RiskLevel, usize>,
    /// Mean forecast probability; `None` when there are no forecasts.
    pub average_probability: Option<f64>,
    pub highest: Option<Forecast>,
    /// Highest probability first.
    pub top: Vec<Forecast>,
}

/// Forecasts ordered by probability, highest first. Ties keep input order.
pub fn ranked(forecasts: &[Forecast]) -> Vec<Forecast> {
    let mut sorted = forecasts.to_vec();
    sorted.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    sorted
}

pub fn overview(forecasts: &[Forecast], top_n: usize) -> ForecastOverview {
    let mut distribution: BTreeMap<RiskLevel, usize> =
        RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
    for f in forecasts {
        *distribution.entry(f.risk_level).or_insert(0) += 1;
    }

    let average_probability = if forecasts.is_empty() {
        None
    } else {
        Some(forecasts.iter().map(|f| f.probability).sum::<f64>() / forecasts.len() as f64)
    };

    let mut top = ranked(forecasts);
    top.truncate(top_n);

    ForecastOverview {
        total_regions: forecasts.len(),
        distribution,
        average_probability,
        highest: top.first().cloned(),
        top,
    }
}

/// Regions needing attention: High or Moderate, in input order.
pub fn elevated(forecasts: &[Forecast]) -> Vec<Forecast> {
    forecasts
        .iter()
        .filter(|f| f.risk_level >= RiskLevel::Medium)
        .cloned()
        .collect()
}
