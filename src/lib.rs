/// floodview: client-side logic for a flood risk dashboard backed by the
/// flood prediction REST API.
///
/// # Module structure
///
/// ```text
/// floodview
/// ├── model       — shared data types (RegionRisk, PredictionResult, AlertEvent, …)
/// ├── risk        — probability and level/threshold ratio classification
/// ├── alert       — threshold-based alert simulation and subscription filtering
/// ├── format      — display formatting; missing values render as "N/A"
/// ├── config      — floodview.toml loader with environment overrides
/// ├── session     — token and theme persistence, JWT claim decoding
/// ├── export      — CSV/JSON export download and validation
/// ├── monitor     — per-source request sequencing and staleness
/// ├── dashboard   — concurrent refresh of all sources and the overview summary
/// ├── endpoint    — local JSON HTTP endpoint
/// ├── ingest
/// │   ├── api     — backend URL construction + response validation
/// │   ├── client  — blocking HTTP client
/// │   └── fixtures (test only) — representative API response payloads
/// └── analysis
///     ├── filter     — region search, risk filter and ordering
///     ├── groupings  — organizes flat records into per-region histories
///     ├── statistics — monthly and per-region flood statistics
///     ├── overview   — forecast metrics and top-risk ranking
///     └── trend      — risk trend reshaping
/// ```

/// Public modules
pub mod alert;
pub mod analysis;
pub mod config;
pub mod dashboard;
pub mod endpoint;
pub mod export;
pub mod format;
pub mod ingest;
pub mod model;
pub mod monitor;
pub mod risk;
pub mod session;
