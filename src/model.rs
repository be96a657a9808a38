/// Shared data types for the flood-risk dashboard.
///
/// These are the validated view-models produced by the `ingest` layer and
/// consumed by the pure presentation logic in `risk`, `alert` and
/// `analysis`. Wire shapes returned by the backend live privately in
/// `ingest::api`; nothing here is constructed from unchecked JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Risk level
// ---------------------------------------------------------------------------

/// Discrete flood danger category.
///
/// Variant order is significant: `Low < Medium < High`, so the derived
/// `Ord` matches the dashboard's rank mapping (Low 1, Medium 2, High 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Rank used by the risk-level sort: High 3, Medium 2, Low 1.
    pub fn rank(self) -> u8 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of `Low`, `Medium`, `High`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown risk level '{0}' (expected Low, Medium or High)")]
pub struct UnknownRiskLevel(pub String);

/// Case-insensitive parse, used for CLI and query-string input. Backend
/// responses go through serde, which only accepts the exact spelling.
impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(UnknownRiskLevel(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// WGS84 position of a region's reference point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A monitored region with its current river level and risk category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRisk {
    pub id: String,
    pub name: String,
    pub basin: String,
    pub elevation_range: String,
    pub coordinates: Coordinates,
    /// Current river level in meters.
    pub current_river_level: f64,
    /// Level at which the river is considered in flood, in meters.
    pub flood_threshold: f64,
    /// Server-assigned category. Authoritative for regions; see
    /// `risk::reconcile` for the client-side ratio hint.
    pub risk_level: RiskLevel,
}

impl RegionRisk {
    /// `current_river_level / flood_threshold`; `None` when the threshold
    /// is not strictly positive.
    pub fn risk_ratio(&self) -> Option<f64> {
        if self.flood_threshold > 0.0 {
            Some(self.current_river_level / self.flood_threshold)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Feature vector accepted by the prediction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub temperature: f64,
    pub precipitation: f64,
    pub snowmelt: f64,
    pub soil_moisture: f64,
    pub river_level: f64,
    pub days_since_precip: f64,
    pub precip_3d: f64,
    pub precip_7d: f64,
    pub precip_14d: f64,
    pub river_level_change: f64,
    pub region: String,
    pub basin: String,
    pub elevation_range: String,
    /// Month of the year, 1-12.
    pub month: u32,
}

impl PredictionInput {
    /// Demo input matching the backend's documented example, stamped with
    /// the given month.
    pub fn sample(month: u32) -> Self {
        PredictionInput {
            temperature: 15.2,
            precipitation: 5.8,
            snowmelt: 0.0,
            soil_moisture: 68.5,
            river_level: 3.2,
            days_since_precip: 1.0,
            precip_3d: 12.5,
            precip_7d: 28.7,
            precip_14d: 42.3,
            river_level_change: 0.8,
            region: "Batken_Area".to_string(),
            basin: "Ferghana".to_string(),
            elevation_range: "medium".to_string(),
            month,
        }
    }
}

/// Result of a single model prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Flood probability in [0, 1].
    pub probability: f64,
    /// 1 = flood predicted, 0 = no flood.
    pub prediction: u8,
    pub risk_level: RiskLevel,
    /// Feature names in the order the model consumed them.
    pub features_used: Vec<String>,
}

impl PredictionResult {
    pub fn is_flood(&self) -> bool {
        self.prediction == 1
    }
}

/// Summary block of a batch prediction response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub count: usize,
    pub flood_count: usize,
    /// Any further summary fields the backend reports, passed through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub predictions: Vec<PredictionResult>,
    pub summary: BatchSummary,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// A region/threshold-triggered notification. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub region: String,
    /// Probability in [0, 1] that triggered the alert.
    pub risk_probability: f64,
    pub message: String,
    pub alert_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Historical data
// ---------------------------------------------------------------------------

/// One daily observation for a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub date: NaiveDate,
    pub region: String,
    pub river_level: f64,
    pub precipitation: f64,
    pub temperature: f64,
    pub flood_status: bool,
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Parallel-array trend response; index `i` of each array describes one
/// time point. Lengths are only checked by `analysis::trend::format_trend`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendSeries {
    pub dates: Vec<String>,
    pub probabilities: Vec<f64>,
    pub risk_levels: Vec<String>,
}

/// Row-oriented trend record, ready for charting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
}

// ---------------------------------------------------------------------------
// Forecasts
// ---------------------------------------------------------------------------

/// One hybrid-model forecast for a region on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub region: String,
    pub forecast_date: NaiveDate,
    /// `prob_hybrid` on the wire, in [0, 1].
    pub probability: f64,
    /// The model's own alert flag.
    pub alert: bool,
    /// Backend "Moderate" is stored as `Medium`.
    pub risk_level: RiskLevel,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// A user's alert subscription for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub region: String,
}

/// The logged-in account as reported by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub is_admin: bool,
}

impl CurrentUser {
    /// Username if the backend has one, otherwise the email.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("(unknown)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(level: f64, threshold: f64) -> RegionRisk {
        RegionRisk {
            id: "osh".to_string(),
            name: "Osh".to_string(),
            basin: "Ferghana".to_string(),
            elevation_range: "medium".to_string(),
            coordinates: Coordinates { lat: 40.5, lon: 72.8 },
            current_river_level: level,
            flood_threshold: threshold,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn test_risk_level_ordering_matches_rank() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert_eq!(RiskLevel::High.rank(), 3);
        assert_eq!(RiskLevel::Low.rank(), 1);
    }

    #[test]
    fn test_risk_level_from_str_is_case_insensitive() {
        assert_eq!("high".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert_eq!(" Medium ".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_risk_level_serde_is_exact() {
        let level: RiskLevel = serde_json::from_str("\"High\"").unwrap();
        assert_eq!(level, RiskLevel::High);
        assert!(serde_json::from_str::<RiskLevel>("\"high\"").is_err());
    }

    #[test]
    fn test_risk_ratio() {
        let r = region(3.6, 4.5);
        assert!((r.risk_ratio().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_risk_ratio_none_for_non_positive_threshold() {
        assert_eq!(region(3.0, 0.0).risk_ratio(), None);
        assert_eq!(region(3.0, -1.0).risk_ratio(), None);
    }
}
