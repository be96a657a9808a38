/// Alert simulation for the alerts page.
///
/// An alert is raised for every region whose probability clears a
/// user-chosen threshold. Where the probability comes from is pluggable
/// through `ProbabilitySource`: the river-level ratio when nothing better
/// is known, or model output from a batch prediction.
///
/// Alert severity uses its own four bands and is deliberately separate
/// from `risk::classify`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{AlertEvent, RegionRisk, Subscription};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// `>= 0.8` Critical, `>= 0.7` High, `>= 0.5` Medium, otherwise Low.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.8 {
            AlertSeverity::Critical
        } else if probability >= 0.7 {
            AlertSeverity::High
        } else if probability >= 0.5 {
            AlertSeverity::Medium
        } else {
            AlertSeverity::Low
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertSeverity::Low => "Low",
            AlertSeverity::Medium => "Medium",
            AlertSeverity::High => "High",
            AlertSeverity::Critical => "Critical",
        })
    }
}

impl AlertEvent {
    pub fn severity(&self) -> AlertSeverity {
        AlertSeverity::from_probability(self.risk_probability)
    }
}

// ---------------------------------------------------------------------------
// Probability sources
// ---------------------------------------------------------------------------

/// Supplies a flood probability for a region, if one is known.
pub trait ProbabilitySource {
    fn probability(&self, region: &RegionRisk) -> Option<f64>;
}

/// Uses the river-level ratio, clamped into [0, 1], as the probability.
/// Regions without a positive flood threshold have no probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatioProbability;

impl ProbabilitySource for RatioProbability {
    fn probability(&self, region: &RegionRisk) -> Option<f64> {
        region.risk_ratio().filter(|r| r.is_finite()).map(|r| r.clamp(0.0, 1.0))
    }
}

/// Model probabilities keyed by region id or region name (ids win).
#[derive(Debug, Clone, Default)]
pub struct PredictedProbabilities {
    by_key: HashMap<String, f64>,
}

impl PredictedProbabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, probability: f64) {
        self.by_key.insert(key.into(), probability);
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl FromIterator<(String, f64)> for PredictedProbabilities {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        PredictedProbabilities {
            by_key: iter.into_iter().collect(),
        }
    }
}

impl ProbabilitySource for PredictedProbabilities {
    fn probability(&self, region: &RegionRisk) -> Option<f64> {
        self.by_key
            .get(&region.id)
            .or_else(|| self.by_key.get(&region.name))
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Raises one alert per region whose probability is at or above
/// `threshold`.
///
/// Probabilities are clamped into [0, 1] before comparison, so a threshold
/// above 1.0 never fires and a threshold of 0.0 fires for every region that
/// has a probability. NaN probabilities and NaN thresholds never fire.
/// Alerts come out in input order.
pub fn simulate(
    regions: &[RegionRisk],
    source: &dyn ProbabilitySource,
    threshold: f64,
    now: DateTime<Utc>,
) -> Vec<AlertEvent> {
    regions
        .iter()
        .filter_map(|region| {
            let probability = source.probability(region)?;
            if probability.is_nan() {
                return None;
            }
            let probability = probability.clamp(0.0, 1.0);
            (probability >= threshold).then(|| AlertEvent {
                region: region.name.clone(),
                risk_probability: probability,
                message: alert_message(&region.name, probability),
                alert_time: now,
            })
        })
        .collect()
}

pub fn alert_message(region: &str, probability: f64) -> String {
    format!(
        "High flood risk detected in {} (probability: {:.2}).",
        region, probability
    )
}

/// Highest probability first. Stable for ties.
pub fn sort_by_probability(alerts: &mut [AlertEvent]) {
    alerts.sort_by(|a, b| b.risk_probability.total_cmp(&a.risk_probability));
}

/// Keeps alerts for regions the user is subscribed to (names compared
/// case-insensitively).
pub fn alerts_for_subscriptions(alerts: &[AlertEvent], subscriptions: &[Subscription]) -> Vec<AlertEvent> {
    alerts
        .iter()
        .filter(|alert| {
            subscriptions
                .iter()
                .any(|s| s.region.eq_ignore_ascii_case(&alert.region))
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
