/// Local HTTP endpoint serving the dashboard's derived views as JSON.
///
/// Each request re-fetches from the backend and runs the same pure
/// functions the CLI uses, so the endpoint never holds state of its own.
///
/// Endpoints:
/// - GET /health
/// - GET /regions?search=&risk=&sort=
/// - GET /alerts?threshold=
/// - GET /stats[?region_id=]
/// - GET /trend/{region_id}?days=
/// - GET /overview

use std::collections::HashMap;
use std::io::Cursor;

use serde_json::json;

use crate::alert::{self, RatioProbability};
use crate::analysis::filter::{self, RegionQuery};
use crate::analysis::overview::{self, TOP_REGIONS};
use crate::analysis::{statistics, trend};
use crate::config::DefaultsConfig;
use crate::ingest::api::{ApiError, HistoricalQuery};
use crate::ingest::client::{ApiClient, TREND_DAYS};
use crate::risk;

const ENDPOINTS: [&str; 6] = [
    "/health",
    "/regions?search=&risk=&sort=",
    "/alerts?threshold=",
    "/stats?region_id=",
    "/trend/{region_id}?days=",
    "/overview",
];

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Health,
    Regions(RegionQuery),
    Alerts { threshold: f64 },
    Stats { region_id: Option<String> },
    Trend { region_id: String, days: u32 },
    Overview,
    NotFound,
    BadRequest(String),
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| urlencoding::decode(&s.replace('+', " ")).ok().map(|c| c.into_owned());
            Some((decode(key)?, decode(value)?))
        })
        .collect()
}

/// Maps a request URL to a route, filling unset parameters from
/// `defaults`.
pub fn parse_route(url: &str, defaults: &DefaultsConfig) -> Route {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let params = parse_query(query);
    let param = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    match path.trim_end_matches('/') {
        "/health" => Route::Health,
        "/overview" => Route::Overview,
        "/regions" => {
            let mut q = RegionQuery {
                search: param("search").map(str::to_string),
                ..RegionQuery::default()
            };
            if let Some(risk) = param("risk") {
                match risk.parse() {
                    Ok(f) => q.risk_filter = f,
                    Err(e) => return Route::BadRequest(e),
                }
            }
            if let Some(sort) = param("sort") {
                match sort.parse() {
                    Ok(k) => q.sort_key = k,
                    Err(e) => return Route::BadRequest(e),
                }
            }
            Route::Regions(q)
        }
        "/alerts" => match param("threshold").map(str::parse::<f64>) {
            None => Route::Alerts { threshold: defaults.alert_threshold },
            Some(Ok(t)) if t.is_finite() => Route::Alerts { threshold: t },
            Some(_) => Route::BadRequest("threshold must be a number".to_string()),
        },
        "/stats" => Route::Stats {
            region_id: param("region_id").map(str::to_string),
        },
        p if p.starts_with("/trend/") => {
            let raw = p.trim_start_matches("/trend/");
            let region_id = match urlencoding::decode(raw) {
                Ok(id) if !id.is_empty() && !id.contains('/') => id.into_owned(),
                _ => return Route::NotFound,
            };
            let days = match param("days").map(str::parse::<u32>) {
                None => defaults.trend_days,
                Some(Ok(d)) if TREND_DAYS.contains(&d) => d,
                Some(_) => return Route::BadRequest("days must be 1-30".to_string()),
            };
            Route::Trend { region_id, days }
        }
        _ => Route::NotFound,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handles one GET request and returns the status code and JSON body.
pub fn handle(url: &str, client: &ApiClient, defaults: &DefaultsConfig) -> (u16, serde_json::Value) {
    let result = match parse_route(url, defaults) {
        Route::Health => Ok(json!({
            "status": "ok",
            "service": "floodview",
            "version": env!("CARGO_PKG_VERSION"),
            "backend": client.base_url(),
        })),
        Route::Regions(query) => handle_regions(client, &query),
        Route::Alerts { threshold } => handle_alerts(client, threshold),
        Route::Stats { region_id } => handle_stats(client, region_id, defaults.history_days),
        Route::Trend { region_id, days } => handle_trend(client, &region_id, days),
        Route::Overview => handle_overview(client),
        Route::BadRequest(message) => return (400, json!({ "error": message })),
        Route::NotFound => {
            return (
                404,
                json!({ "error": "Not found", "available_endpoints": ENDPOINTS }),
            );
        }
    };

    match result {
        Ok(body) => (200, body),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &ApiError) -> (u16, serde_json::Value) {
    let status = match e {
        ApiError::InvalidInput(_) => 400,
        ApiError::Status { status: 404, .. } => 404,
        _ => 502,
    };
    log::error!("request failed: {}", e);
    (status, json!({ "error": e.to_string() }))
}

fn handle_regions(client: &ApiClient, query: &RegionQuery) -> Result<serde_json::Value, ApiError> {
    let regions = client.regions(None)?;
    let view = filter::filter_and_sort(&regions, query);
    let rows: Vec<_> = view
        .iter()
        .map(|r| {
            json!({
                "region": r,
                "risk_ratio": r.risk_ratio(),
                "ratio_level": r.risk_ratio().map(risk::classify_ratio),
            })
        })
        .collect();
    let risk_filter = match query.risk_filter {
        filter::RiskFilter::All => "all".to_string(),
        filter::RiskFilter::Only(level) => level.to_string(),
    };
    Ok(json!({
        "count": rows.len(),
        "total": regions.len(),
        "search": query.search,
        "risk": risk_filter,
        "sort": query.sort_key.to_string(),
        "distribution": filter::risk_distribution(&regions),
        "regions": rows,
    }))
}

fn handle_alerts(client: &ApiClient, threshold: f64) -> Result<serde_json::Value, ApiError> {
    let regions = client.regions(None)?;
    let alerts = alert::simulate(&regions, &RatioProbability, threshold, chrono::Utc::now());
    let rows: Vec<_> = alerts
        .iter()
        .map(|a| json!({ "alert": a, "severity": a.severity() }))
        .collect();
    Ok(json!({
        "threshold": threshold,
        "count": rows.len(),
        "alerts": rows,
    }))
}

fn handle_stats(
    client: &ApiClient,
    region_id: Option<String>,
    history_days: u32,
) -> Result<serde_json::Value, ApiError> {
    let records = client.historical(&HistoricalQuery {
        region_id: region_id.clone(),
        days: Some(history_days),
        ..HistoricalQuery::default()
    })?;
    let stats = statistics::aggregate(&records);
    Ok(json!({
        "region_id": region_id,
        "flood_ratio": stats.overall_stats.flood_ratio(),
        "monthly": stats.time_series.monthly_rows(),
        "stats": stats,
    }))
}

fn handle_trend(client: &ApiClient, region_id: &str, days: u32) -> Result<serde_json::Value, ApiError> {
    let series = client.risk_trend(region_id, days)?;
    let points = trend::format_trend(&series).map_err(|e| ApiError::Malformed {
        endpoint: crate::ingest::api::RISK_TREND.to_string(),
        reason: e.to_string(),
    })?;
    Ok(json!({
        "region_id": region_id,
        "days": days,
        "summary": trend::trend_summary(&points),
        "points": points,
    }))
}

fn handle_overview(client: &ApiClient) -> Result<serde_json::Value, ApiError> {
    let forecasts = client.latest_forecasts()?;
    Ok(json!({
        "overview": overview::overview(&forecasts, TOP_REGIONS),
        "elevated": overview::elevated(&forecasts),
    }))
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Binds the server. Port 0 picks a free port.
pub fn bind(host: &str, port: u16) -> Result<tiny_http::Server, String> {
    tiny_http::Server::http(format!("{}:{}", host, port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))
}

/// Serves requests until the server is dropped or unblocked.
pub fn serve(server: &tiny_http::Server, client: &ApiClient, defaults: &DefaultsConfig) {
    for request in server.incoming_requests() {
        let url = request.url().to_string();
        log::debug!("{} {}", request.method(), url);

        let (status, body) = if *request.method() == tiny_http::Method::Get {
            handle(&url, client, defaults)
        } else {
            (405, json!({ "error": "Method not allowed" }))
        };

        if let Err(e) = request.respond(create_response(status, &body)) {
            log::warn!("Failed to send response: {}", e);
        }
    }
}

/// Starts the endpoint on `port` and blocks.
pub fn start_endpoint_server(port: u16, client: ApiClient, defaults: DefaultsConfig) -> Result<(), String> {
    let server = bind("0.0.0.0", port)?;

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    for endpoint in ENDPOINTS {
        println!("   GET {}", endpoint);
    }
    println!();

    serve(&server, &client, &defaults);
    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &serde_json::Value) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| "{}".to_string());
    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::filter::{RiskFilter, SortKey};
    use crate::model::RiskLevel;

    fn defaults() -> DefaultsConfig {
        DefaultsConfig::default()
    }

    #[test]
    fn test_health_and_unknown() {
        assert_eq!(parse_route("/health", &defaults()), Route::Health);
        assert_eq!(parse_route("/health/", &defaults()), Route::Health);
        assert_eq!(parse_route("/overview", &defaults()), Route::Overview);
        assert_eq!(parse_route("/nope", &defaults()), Route::NotFound);
    }

    #[test]
    fn test_regions_query() {
        let route = parse_route("/regions?search=Batken%20Area&risk=high&sort=risk_ratio", &defaults());
        assert_eq!(
            route,
            Route::Regions(RegionQuery {
                search: Some("Batken Area".to_string()),
                risk_filter: RiskFilter::Only(RiskLevel::High),
                sort_key: SortKey::RiskRatio,
            })
        );
        assert_eq!(parse_route("/regions", &defaults()), Route::Regions(RegionQuery::default()));
        assert!(matches!(parse_route("/regions?risk=extreme", &defaults()), Route::BadRequest(_)));
    }

    #[test]
    fn test_alert_threshold_default_and_parse() {
        assert_eq!(parse_route("/alerts", &defaults()), Route::Alerts { threshold: 0.7 });
        assert_eq!(parse_route("/alerts?threshold=0.5", &defaults()), Route::Alerts { threshold: 0.5 });
        assert!(matches!(parse_route("/alerts?threshold=high", &defaults()), Route::BadRequest(_)));
    }

    #[test]
    fn test_trend_route() {
        assert_eq!(
            parse_route("/trend/osh", &defaults()),
            Route::Trend { region_id: "osh".to_string(), days: 7 }
        );
        assert_eq!(
            parse_route("/trend/batken_area?days=30", &defaults()),
            Route::Trend { region_id: "batken_area".to_string(), days: 30 }
        );
        assert!(matches!(parse_route("/trend/osh?days=31", &defaults()), Route::BadRequest(_)));
        assert_eq!(parse_route("/trend/", &defaults()), Route::NotFound);
    }

    #[test]
    fn test_stats_route() {
        assert_eq!(parse_route("/stats", &defaults()), Route::Stats { region_id: None });
        assert_eq!(
            parse_route("/stats?region_id=osh", &defaults()),
            Route::Stats { region_id: Some("osh".to_string()) }
        );
    }

    #[test]
    fn test_upstream_errors_map_to_status_codes() {
        let not_found = ApiError::Status {
            endpoint: "/regions".to_string(),
            status: 404,
            message: "Region with id 'x' not found".to_string(),
        };
        assert_eq!(error_response(&not_found).0, 404);
        let broken = ApiError::Malformed {
            endpoint: "/regions".to_string(),
            reason: "bad".to_string(),
        };
        assert_eq!(error_response(&broken).0, 502);
        assert_eq!(error_response(&ApiError::InvalidInput("x".into())).0, 400);
    }
}
