/// Flood prediction backend REST API: URL construction and response parsing.
///
/// Every response is deserialized into a private wire struct first and then
/// validated into the public types in `crate::model`. Anything the dashboard
/// would have to guess about (an unknown risk level, a probability outside
/// [0, 1], a flood status that is neither 0/1 nor a boolean) is rejected
/// here as `ApiError::Malformed` instead of leaking into the views.
///
/// Endpoints (relative to the configured base URL):
///   GET    /regions[?sort_by=]
///   GET    /regions/{id}
///   GET    /data/historical?region_id&start_date&end_date&days
///   GET    /data/stats
///   GET    /data/export?format=csv|json[&region_id]
///   POST   /prediction/predict
///   POST   /prediction/batch-predict
///   GET    /prediction/risk-trend/{region_id}?days=
///   GET    /alerts/simulate?threshold=
///   POST   /auth/login, /auth/signup
///   GET|POST /user/subscriptions, DELETE /user/subscriptions/{id}
///   GET    /forecast/latest
///   GET    /forecast/{region}[?days | ?start_date&end_date]
///   GET    /auth/me
///   POST   /admin/ingest, DELETE /admin/cleanup?days=
///
/// See `fixtures.rs` for example payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::analysis::statistics::{DataStats, OverallStats, RegionStats, TimeSeries};
use crate::export::ExportFormat;
use crate::model::{
    AlertEvent, BatchPrediction, BatchSummary, Coordinates, CurrentUser, Forecast, HistoricalRecord,
    PredictionInput, PredictionResult, RegionRisk, RiskLevel, Subscription, TrendSeries,
};
use crate::risk;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response. `message` is the backend's `detail`/`error` field
    /// when present, otherwise the raw body.
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("not logged in (run `floodview login` first)")]
    NotAuthenticated,
}

impl ApiError {
    /// True for HTTP 401/403, i.e. a missing or expired token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

fn malformed(endpoint: &str, reason: impl Into<String>) -> ApiError {
    ApiError::Malformed {
        endpoint: endpoint.to_string(),
        reason: reason.into(),
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, json: &str) -> Result<T, ApiError> {
    serde_json::from_str(json)
        .map_err(|e| malformed(endpoint, format!("JSON deserialization failed: {}", e)))
}

// ---------------------------------------------------------------------------
// Endpoint paths
// ---------------------------------------------------------------------------

pub const REGIONS: &str = "/regions";
pub const HISTORICAL: &str = "/data/historical";
pub const STATS: &str = "/data/stats";
pub const EXPORT: &str = "/data/export";
pub const PREDICT: &str = "/prediction/predict";
pub const BATCH_PREDICT: &str = "/prediction/batch-predict";
pub const RISK_TREND: &str = "/prediction/risk-trend";
pub const ALERTS: &str = "/alerts/simulate";
pub const LOGIN: &str = "/auth/login";
pub const SIGNUP: &str = "/auth/signup";
pub const SUBSCRIPTIONS: &str = "/user/subscriptions";
pub const FORECAST_LATEST: &str = "/forecast/latest";
pub const FORECAST: &str = "/forecast";
pub const AUTH_ME: &str = "/auth/me";
pub const ADMIN_INGEST: &str = "/admin/ingest";
pub const ADMIN_CLEANUP: &str = "/admin/cleanup";

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

pub fn build_regions_url(base_url: &str, sort_by: Option<&str>) -> String {
    let url = join(base_url, REGIONS);
    match sort_by {
        Some(key) => format!("{}?sort_by={}", url, urlencoding::encode(key)),
        None => url,
    }
}

pub fn build_region_url(base_url: &str, region_id: &str) -> String {
    format!("{}/{}", join(base_url, REGIONS), urlencoding::encode(region_id))
}

/// Filters for the historical-data endpoint. With both dates set the
/// backend returns that range; otherwise it returns the latest `days`
/// records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalQuery {
    pub region_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub days: Option<u32>,
}

pub fn build_historical_url(base_url: &str, query: &HistoricalQuery) -> String {
    let mut params = Vec::new();
    if let Some(id) = &query.region_id {
        params.push(format!("region_id={}", urlencoding::encode(id)));
    }
    if let Some(start) = query.start_date {
        params.push(format!("start_date={}", start.format("%Y-%m-%d")));
    }
    if let Some(end) = query.end_date {
        params.push(format!("end_date={}", end.format("%Y-%m-%d")));
    }
    if let Some(days) = query.days {
        params.push(format!("days={}", days));
    }
    with_params(join(base_url, HISTORICAL), &params)
}

pub fn build_stats_url(base_url: &str) -> String {
    join(base_url, STATS)
}

pub fn build_export_url(base_url: &str, format: ExportFormat, region_id: Option<&str>) -> String {
    let mut params = vec![format!("format={}", format.as_str())];
    if let Some(id) = region_id {
        params.push(format!("region_id={}", urlencoding::encode(id)));
    }
    with_params(join(base_url, EXPORT), &params)
}

pub fn build_predict_url(base_url: &str) -> String {
    join(base_url, PREDICT)
}

pub fn build_batch_predict_url(base_url: &str) -> String {
    join(base_url, BATCH_PREDICT)
}

pub fn build_trend_url(base_url: &str, region_id: &str, days: u32) -> String {
    format!(
        "{}/{}?days={}",
        join(base_url, RISK_TREND),
        urlencoding::encode(region_id),
        days
    )
}

pub fn build_alerts_url(base_url: &str, threshold: f64) -> String {
    format!("{}?threshold={}", join(base_url, ALERTS), threshold)
}

pub fn build_login_url(base_url: &str) -> String {
    join(base_url, LOGIN)
}

pub fn build_signup_url(base_url: &str) -> String {
    join(base_url, SIGNUP)
}

pub fn build_subscriptions_url(base_url: &str) -> String {
    join(base_url, SUBSCRIPTIONS)
}

pub fn build_subscription_url(base_url: &str, subscription_id: i64) -> String {
    format!("{}/{}", join(base_url, SUBSCRIPTIONS), subscription_id)
}

/// Which part of a region's forecast history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForecastRange {
    /// Everything the backend holds for the region.
    #[default]
    All,
    LastDays(u32),
    /// Inclusive date range.
    Between(NaiveDate, NaiveDate),
}

pub fn build_latest_forecasts_url(base_url: &str) -> String {
    join(base_url, FORECAST_LATEST)
}

pub fn build_forecast_history_url(base_url: &str, region: &str, range: ForecastRange) -> String {
    let url = format!("{}/{}", join(base_url, FORECAST), urlencoding::encode(region));
    let params = match range {
        ForecastRange::All => Vec::new(),
        ForecastRange::LastDays(days) => vec![format!("days={}", days)],
        ForecastRange::Between(start, end) => vec![
            format!("start_date={}", start.format("%Y-%m-%d")),
            format!("end_date={}", end.format("%Y-%m-%d")),
        ],
    };
    with_params(url, &params)
}

pub fn build_me_url(base_url: &str) -> String {
    join(base_url, AUTH_ME)
}

pub fn build_ingest_url(base_url: &str) -> String {
    join(base_url, ADMIN_INGEST)
}

pub fn build_cleanup_url(base_url: &str, days: u32) -> String {
    format!("{}?days={}", join(base_url, ADMIN_CLEANUP), days)
}

fn with_params(url: String, params: &[String]) -> String {
    if params.is_empty() {
        url
    } else {
        format!("{}?{}", url, params.join("&"))
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignupRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_region: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionRequest<'a> {
    pub region: &'a str,
}

#[derive(Debug, Serialize)]
pub struct BatchPredictRequest<'a> {
    pub data: &'a [PredictionInput],
}

/// Rejects inputs the backend would refuse: a month outside 1-12 or a
/// non-finite numeric feature.
pub fn validate_prediction_input(input: &PredictionInput) -> Result<(), ApiError> {
    if !(1..=12).contains(&input.month) {
        return Err(ApiError::InvalidInput(format!(
            "month must be 1-12, got {}",
            input.month
        )));
    }
    let numeric = [
        ("temperature", input.temperature),
        ("precipitation", input.precipitation),
        ("snowmelt", input.snowmelt),
        ("soil_moisture", input.soil_moisture),
        ("river_level", input.river_level),
        ("days_since_precip", input.days_since_precip),
        ("precip_3d", input.precip_3d),
        ("precip_7d", input.precip_7d),
        ("precip_14d", input.precip_14d),
        ("river_level_change", input.river_level_change),
    ];
    if let Some((name, value)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ApiError::InvalidInput(format!("{} is not a finite number: {}", name, value)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde structures for the wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RegionWire {
    id: String,
    name: String,
    basin: String,
    elevation_range: String,
    coordinates: CoordinatesWire,
    current_river_level: f64,
    flood_threshold: f64,
    risk_level: String,
}

#[derive(Deserialize)]
struct CoordinatesWire {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct HistoricalWire {
    date: serde_json::Value,
    region: String,
    river_level: f64,
    precipitation: f64,
    temperature: f64,
    flood_status: serde_json::Value,
}

#[derive(Deserialize)]
struct StatsWire {
    #[serde(default)]
    region_stats: BTreeMap<String, RegionStatsWire>,
    overall_stats: OverallStatsWire,
    #[serde(default)]
    time_series: TimeSeriesWire,
}

#[derive(Deserialize)]
struct RegionStatsWire {
    records: usize,
    flood_events: usize,
    avg_river_level: f64,
    max_river_level: f64,
}

#[derive(Deserialize)]
struct OverallStatsWire {
    total_records: usize,
    flood_events: usize,
    non_flood_events: usize,
    regions_count: usize,
}

#[derive(Deserialize, Default)]
struct TimeSeriesWire {
    #[serde(default)]
    months: Vec<u32>,
    #[serde(default)]
    flood_counts: Vec<usize>,
    #[serde(default)]
    total_counts: Vec<usize>,
}

#[derive(Deserialize)]
struct PredictionWire {
    probability: f64,
    prediction: i64,
    risk_level: String,
    #[serde(default)]
    features_used: Vec<String>,
}

#[derive(Deserialize)]
struct BatchWire {
    predictions: Vec<PredictionWire>,
    summary: BatchSummaryWire,
}

#[derive(Deserialize)]
struct BatchSummaryWire {
    count: usize,
    // An empty batch reports only `count`.
    #[serde(default)]
    flood_count: usize,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct TrendWire {
    dates: Vec<String>,
    probabilities: Vec<f64>,
    risk_levels: Vec<String>,
}

#[derive(Deserialize)]
struct AlertsWire {
    alerts: Vec<AlertWire>,
}

#[derive(Deserialize)]
struct AlertWire {
    region: String,
    risk_probability: f64,
    #[serde(default)]
    message: String,
    alert_time: String,
}

#[derive(Deserialize)]
struct TokenWire {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Deserialize)]
struct SignupWire {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionWire {
    id: i64,
    user_id: i64,
    region: String,
}

#[derive(Deserialize)]
struct ForecastWire {
    region: String,
    #[serde(alias = "date")]
    forecast_date: serde_json::Value,
    #[serde(alias = "risk_score")]
    prob_hybrid: f64,
    #[serde(default)]
    alert: Option<serde_json::Value>,
    #[serde(default)]
    risk_level: Option<String>,
}

#[derive(Deserialize)]
struct UserWire {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    is_admin: bool,
}

#[derive(Deserialize)]
struct AdminMessageWire {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWire {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Exact spelling only. Case-insensitive parsing is for user input.
fn parse_wire_level(endpoint: &str, value: &str) -> Result<RiskLevel, ApiError> {
    RiskLevel::ALL
        .into_iter()
        .find(|level| level.as_str() == value)
        .ok_or_else(|| malformed(endpoint, format!("unknown risk level '{}'", value)))
}

fn check_probability(endpoint: &str, field: &str, value: f64) -> Result<f64, ApiError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(malformed(endpoint, format!("{} {} is outside [0, 1]", field, value)))
    }
}

fn check_finite(endpoint: &str, field: &str, value: f64) -> Result<f64, ApiError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(malformed(endpoint, format!("{} is not finite", field)))
    }
}

/// `0`/`1` (integer or float) or `true`/`false`.
fn parse_flag(endpoint: &str, field: &str, value: &serde_json::Value) -> Result<bool, ApiError> {
    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Ok(false),
            Some(v) if v == 1.0 => Ok(true),
            _ => Err(malformed(endpoint, format!("{} {} is not 0 or 1", field, n))),
        },
        other => Err(malformed(endpoint, format!("{} {} is not 0/1 or a boolean", field, other))),
    }
}

/// Forecast levels are spelled `Low`, `Moderate`, `High`.
fn parse_forecast_level(endpoint: &str, value: &str) -> Result<RiskLevel, ApiError> {
    match value {
        "Low" => Ok(RiskLevel::Low),
        "Moderate" => Ok(RiskLevel::Medium),
        "High" => Ok(RiskLevel::High),
        other => Err(malformed(endpoint, format!("unknown forecast risk level '{}'", other))),
    }
}

/// `YYYY-MM-DD`, an ISO datetime whose date part is used, or epoch
/// milliseconds (the JSON export's date encoding).
fn parse_record_date(endpoint: &str, value: &serde_json::Value) -> Result<NaiveDate, ApiError> {
    match value {
        serde_json::Value::String(s) => {
            let date_part = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .map_err(|e| malformed(endpoint, format!("invalid date '{}': {}", s, e)))
        }
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| malformed(endpoint, format!("invalid epoch date {}", n))),
        other => Err(malformed(endpoint, format!("invalid date {}", other))),
    }
}

/// RFC 3339, or the backend's naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_alert_time(endpoint: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| malformed(endpoint, format!("invalid alert_time '{}'", value)))
}

fn region_from_wire(endpoint: &str, wire: RegionWire) -> Result<RegionRisk, ApiError> {
    if wire.id.trim().is_empty() {
        return Err(malformed(endpoint, "region with empty id"));
    }
    let lat = check_finite(endpoint, "coordinates.lat", wire.coordinates.lat)?;
    let lon = check_finite(endpoint, "coordinates.lon", wire.coordinates.lon)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(malformed(
            endpoint,
            format!("coordinates ({}, {}) out of range for region '{}'", lat, lon, wire.id),
        ));
    }
    Ok(RegionRisk {
        current_river_level: check_finite(endpoint, "current_river_level", wire.current_river_level)?,
        flood_threshold: check_finite(endpoint, "flood_threshold", wire.flood_threshold)?,
        risk_level: parse_wire_level(endpoint, &wire.risk_level)?,
        coordinates: Coordinates { lat, lon },
        id: wire.id,
        name: wire.name,
        basin: wire.basin,
        elevation_range: wire.elevation_range,
    })
}

fn prediction_from_wire(endpoint: &str, wire: PredictionWire) -> Result<PredictionResult, ApiError> {
    let prediction = match wire.prediction {
        0 => 0,
        1 => 1,
        other => return Err(malformed(endpoint, format!("prediction {} is not 0 or 1", other))),
    };
    Ok(PredictionResult {
        probability: check_probability(endpoint, "probability", wire.probability)?,
        prediction,
        risk_level: parse_wire_level(endpoint, &wire.risk_level)?,
        features_used: wire.features_used,
    })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses the `/regions` list.
///
/// # Errors
/// `ApiError::Malformed` for bad JSON, an unknown risk level, non-finite
/// levels or out-of-range coordinates. One bad region rejects the whole
/// response.
pub fn parse_regions_response(json: &str) -> Result<Vec<RegionRisk>, ApiError> {
    let wire: Vec<RegionWire> = decode(REGIONS, json)?;
    wire.into_iter().map(|r| region_from_wire(REGIONS, r)).collect()
}

pub fn parse_region_response(json: &str) -> Result<RegionRisk, ApiError> {
    let wire: RegionWire = decode(REGIONS, json)?;
    region_from_wire(REGIONS, wire)
}

/// Parses historical records. Also used for the JSON export, which has
/// the same row shape.
pub fn parse_historical_response(json: &str) -> Result<Vec<HistoricalRecord>, ApiError> {
    let wire: Vec<HistoricalWire> = decode(HISTORICAL, json)?;
    wire.into_iter()
        .map(|r| {
            Ok(HistoricalRecord {
                date: parse_record_date(HISTORICAL, &r.date)?,
                flood_status: parse_flag(HISTORICAL, "flood_status", &r.flood_status)?,
                river_level: check_finite(HISTORICAL, "river_level", r.river_level)?,
                precipitation: check_finite(HISTORICAL, "precipitation", r.precipitation)?,
                temperature: check_finite(HISTORICAL, "temperature", r.temperature)?,
                region: r.region,
            })
        })
        .collect()
}

/// Parses server-side statistics.
///
/// # Errors
/// `ApiError::Malformed` when the monthly arrays differ in length, a month
/// is outside 1-12, a bucket has more floods than records, or the overall
/// flood and non-flood counts do not add up.
pub fn parse_stats_response(json: &str) -> Result<DataStats, ApiError> {
    let wire: StatsWire = decode(STATS, json)?;

    let overall = wire.overall_stats;
    if overall.flood_events + overall.non_flood_events != overall.total_records {
        return Err(malformed(
            STATS,
            format!(
                "flood_events {} + non_flood_events {} != total_records {}",
                overall.flood_events, overall.non_flood_events, overall.total_records
            ),
        ));
    }

    let ts = wire.time_series;
    if ts.months.len() != ts.flood_counts.len() || ts.months.len() != ts.total_counts.len() {
        return Err(malformed(
            STATS,
            format!(
                "time_series arrays differ in length: {} months, {} flood_counts, {} total_counts",
                ts.months.len(),
                ts.flood_counts.len(),
                ts.total_counts.len()
            ),
        ));
    }
    if let Some(month) = ts.months.iter().find(|m| !(1..=12).contains(*m)) {
        return Err(malformed(STATS, format!("month {} is outside 1-12", month)));
    }
    if let Some(i) = (0..ts.months.len()).find(|&i| ts.flood_counts[i] > ts.total_counts[i]) {
        return Err(malformed(
            STATS,
            format!("month {} has more floods than records", ts.months[i]),
        ));
    }

    let mut region_stats = BTreeMap::new();
    for (region, s) in wire.region_stats {
        if s.flood_events > s.records {
            return Err(malformed(STATS, format!("region '{}' has more floods than records", region)));
        }
        region_stats.insert(
            region,
            RegionStats {
                records: s.records,
                flood_events: s.flood_events,
                avg_river_level: check_finite(STATS, "avg_river_level", s.avg_river_level)?,
                max_river_level: check_finite(STATS, "max_river_level", s.max_river_level)?,
            },
        );
    }

    Ok(DataStats {
        region_stats,
        overall_stats: OverallStats {
            total_records: overall.total_records,
            regions_count: overall.regions_count,
            flood_events: overall.flood_events,
            non_flood_events: overall.non_flood_events,
        },
        time_series: TimeSeries {
            months: ts.months,
            flood_counts: ts.flood_counts,
            total_counts: ts.total_counts,
        },
    })
}

pub fn parse_prediction_response(json: &str) -> Result<PredictionResult, ApiError> {
    let wire: PredictionWire = decode(PREDICT, json)?;
    prediction_from_wire(PREDICT, wire)
}

pub fn parse_batch_response(json: &str) -> Result<BatchPrediction, ApiError> {
    let wire: BatchWire = decode(BATCH_PREDICT, json)?;
    let predictions = wire
        .predictions
        .into_iter()
        .map(|p| prediction_from_wire(BATCH_PREDICT, p))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = wire.summary;
    if summary.flood_count > summary.count {
        return Err(malformed(
            BATCH_PREDICT,
            format!("flood_count {} exceeds count {}", summary.flood_count, summary.count),
        ));
    }
    if summary.count != predictions.len() {
        log::warn!(
            "batch summary count {} differs from {} predictions",
            summary.count,
            predictions.len()
        );
    }

    Ok(BatchPrediction {
        predictions,
        summary: BatchSummary {
            count: summary.count,
            flood_count: summary.flood_count,
            extra: summary.extra,
        },
    })
}

/// Parses a risk trend. Array lengths are left for
/// `analysis::trend::format_trend` to check; each probability must be in
/// [0, 1].
pub fn parse_trend_response(json: &str) -> Result<TrendSeries, ApiError> {
    let wire: TrendWire = decode(RISK_TREND, json)?;
    for p in &wire.probabilities {
        check_probability(RISK_TREND, "probability", *p)?;
    }
    Ok(TrendSeries {
        dates: wire.dates,
        probabilities: wire.probabilities,
        risk_levels: wire.risk_levels,
    })
}

pub fn parse_alerts_response(json: &str) -> Result<Vec<AlertEvent>, ApiError> {
    let wire: AlertsWire = decode(ALERTS, json)?;
    wire.alerts
        .into_iter()
        .map(|a| {
            Ok(AlertEvent {
                risk_probability: check_probability(ALERTS, "risk_probability", a.risk_probability)?,
                alert_time: parse_alert_time(ALERTS, &a.alert_time)?,
                region: a.region,
                message: a.message,
            })
        })
        .collect()
}

/// Bearer token issued by `/auth/login`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
}

pub fn parse_token_response(json: &str) -> Result<AuthToken, ApiError> {
    let wire: TokenWire = decode(LOGIN, json)?;
    if wire.access_token.trim().is_empty() {
        return Err(malformed(LOGIN, "empty access_token"));
    }
    Ok(AuthToken {
        access_token: wire.access_token,
        token_type: wire.token_type,
    })
}

/// Returns the backend's confirmation message.
pub fn parse_signup_response(json: &str) -> Result<String, ApiError> {
    let wire: SignupWire = decode(SIGNUP, json)?;
    Ok(wire.message.unwrap_or_else(|| "User registered successfully".to_string()))
}

pub fn parse_subscriptions_response(json: &str) -> Result<Vec<Subscription>, ApiError> {
    let wire: Vec<SubscriptionWire> = decode(SUBSCRIPTIONS, json)?;
    Ok(wire.into_iter().map(subscription_from_wire).collect())
}

pub fn parse_subscription_response(json: &str) -> Result<Subscription, ApiError> {
    let wire: SubscriptionWire = decode(SUBSCRIPTIONS, json)?;
    Ok(subscription_from_wire(wire))
}

fn subscription_from_wire(wire: SubscriptionWire) -> Subscription {
    Subscription {
        id: wire.id,
        user_id: wire.user_id,
        region: wire.region,
    }
}

fn forecast_from_wire(endpoint: &str, wire: ForecastWire) -> Result<Forecast, ApiError> {
    if wire.region.trim().is_empty() {
        return Err(malformed(endpoint, "forecast with empty region"));
    }
    let probability = check_probability(endpoint, "prob_hybrid", wire.prob_hybrid)?;
    let risk_level = match wire.risk_level.as_deref() {
        Some(level) => parse_forecast_level(endpoint, level)?,
        None => risk::classify_forecast(probability).map_err(|e| malformed(endpoint, e.to_string()))?,
    };
    let alert = match &wire.alert {
        Some(value) => parse_flag(endpoint, "alert", value)?,
        None => false,
    };
    Ok(Forecast {
        forecast_date: parse_record_date(endpoint, &wire.forecast_date)?,
        region: wire.region,
        probability,
        alert,
        risk_level,
    })
}

/// Parses `/forecast/latest`. Order is kept as sent.
pub fn parse_latest_forecasts_response(json: &str) -> Result<Vec<Forecast>, ApiError> {
    let wire: Vec<ForecastWire> = decode(FORECAST_LATEST, json)?;
    wire.into_iter()
        .map(|f| forecast_from_wire(FORECAST_LATEST, f))
        .collect()
}

/// Parses a region's forecast history, oldest first. Older rows may lack
/// `risk_level` (derived with `risk::classify_forecast`) and may use
/// `date`/`risk_score` instead of `forecast_date`/`prob_hybrid`.
pub fn parse_forecast_history_response(json: &str) -> Result<Vec<Forecast>, ApiError> {
    let wire: Vec<ForecastWire> = decode(FORECAST, json)?;
    let mut forecasts = wire
        .into_iter()
        .map(|f| forecast_from_wire(FORECAST, f))
        .collect::<Result<Vec<_>, _>>()?;
    forecasts.sort_by_key(|f| f.forecast_date);
    Ok(forecasts)
}

pub fn parse_me_response(json: &str) -> Result<CurrentUser, ApiError> {
    let wire: UserWire = decode(AUTH_ME, json)?;
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !present(&wire.email) && !present(&wire.username) {
        return Err(malformed(AUTH_ME, "user has neither email nor username"));
    }
    Ok(CurrentUser {
        id: wire.id,
        email: wire.email,
        username: wire.username,
        is_admin: wire.is_admin,
    })
}

/// Result of `POST /admin/ingest`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub message: String,
    /// Forecast job output, when the backend passes it through.
    pub output: Option<String>,
}

pub fn parse_ingest_response(json: &str) -> Result<IngestReport, ApiError> {
    let wire: AdminMessageWire = decode(ADMIN_INGEST, json)?;
    Ok(IngestReport {
        message: wire.message.unwrap_or_else(|| "Forecast job triggered".to_string()),
        output: wire.stdout.filter(|s| !s.trim().is_empty()),
    })
}

/// Result of `DELETE /admin/cleanup`.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupReport {
    pub message: String,
    /// Number of deleted forecasts, read from "Deleted N ..." in the message.
    pub deleted: Option<usize>,
}

pub fn parse_cleanup_response(json: &str) -> Result<CleanupReport, ApiError> {
    let wire: AdminMessageWire = decode(ADMIN_CLEANUP, json)?;
    let message = wire.message.unwrap_or_default();
    let deleted = message
        .split_whitespace()
        .skip_while(|w| !w.eq_ignore_ascii_case("deleted"))
        .nth(1)
        .and_then(|w| w.parse().ok());
    Ok(CleanupReport { message, deleted })
}

/// Pulls the human-readable message out of an error body (`{"detail": ..}`
/// or `{"error": ..}`). Validation errors carry a list in `detail`, which is
/// rendered as compact JSON.
pub fn parse_error_detail(body: &str) -> Option<String> {
    let wire: ErrorWire = serde_json::from_str(body).ok()?;
    let value = wire.detail.or(wire.error)?;
    Some(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
