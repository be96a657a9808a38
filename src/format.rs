/// Display formatting for tables and the CLI.
///
/// Every formatter that takes an optional or possibly non-finite value
/// renders the no-data case as `"N/A"`.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::RiskLevel;

pub const NO_DATA: &str = "N/A";

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Fixed decimal places.
pub fn format_decimal(value: Option<f64>, decimals: usize) -> String {
    match finite(value) {
        Some(v) => format!("{:.*}", decimals, v),
        None => NO_DATA.to_string(),
    }
}

/// A 0-1 value as a percentage with one decimal, e.g. `0.783` → `78.3%`.
pub fn format_percent(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => NO_DATA.to_string(),
    }
}

/// River level in meters, e.g. `3.20m`.
pub fn format_river_level(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => format!("{:.2}m", v),
        None => NO_DATA.to_string(),
    }
}

/// Precipitation in millimeters, e.g. `5.8mm`.
pub fn format_precipitation(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => format!("{:.1}mm", v),
        None => NO_DATA.to_string(),
    }
}

/// Temperature in Celsius, e.g. `15.2°C`.
pub fn format_temperature(value: Option<f64>) -> String {
    match finite(value) {
        Some(v) => format!("{:.1}°C", v),
        None => NO_DATA.to_string(),
    }
}

pub fn format_flood_status(flood: bool) -> &'static str {
    if flood { "Flood" } else { "No Flood" }
}

/// Forecast pages call the middle band "Moderate".
pub fn format_forecast_level(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Low",
        RiskLevel::Medium => "Moderate",
        RiskLevel::High => "High",
    }
}

/// `Apr 15, 2024`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

/// "just now", "5 minutes ago", "3 hours ago", "2 days ago"; older than
/// 30 days falls back to the calendar date.
pub fn format_relative_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - time;
    let secs = diff.num_seconds();
    let mins = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    if secs < 60 {
        "just now".to_string()
    } else if mins < 60 {
        plural(mins, "minute")
    } else if hours < 24 {
        plural(hours, "hour")
    } else if days < 30 {
        plural(days, "day")
    } else {
        format_date(time.date_naive())
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}
