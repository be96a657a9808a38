/// Dashboard refresh loop.
///
/// A refresh fetches every data source independently and concurrently:
/// regions, server statistics, recent historical records, the latest
/// model forecasts and (when logged in) the user's subscriptions. Each source has its own `SourceSlot`, so
/// one failing endpoint leaves the others usable and the summary shows
/// whatever is ready.
///
/// Fetches run on a `threadpool`; results come back over an `mpsc` channel
/// tagged with their source and `RequestToken`, and are applied on the
/// calling thread. Alerts are not fetched: they are simulated locally from
/// the current regions.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use threadpool::ThreadPool;

use crate::alert::{self, RatioProbability};
use crate::analysis::filter;
use crate::analysis::overview::{self, ForecastOverview, TOP_REGIONS};
use crate::analysis::statistics::{self, DataStats};
use crate::config::{ConfigError, DashboardConfig};
use crate::format;
use crate::ingest::api::{ApiError, HistoricalQuery};
use crate::ingest::client::ApiClient;
use crate::model::{AlertEvent, Forecast, HistoricalRecord, RegionRisk, RiskLevel, Subscription};
use crate::monitor::{Completion, DataSource, RequestToken, SourceHealth, SourceSlot};
use crate::risk::{self, RiskDisagreement};

// ---------------------------------------------------------------------------
// Fetch results
// ---------------------------------------------------------------------------

/// One finished fetch, as sent back from a worker.
#[derive(Debug)]
pub enum Fetched {
    Regions(Result<Vec<RegionRisk>, ApiError>),
    Stats(Result<DataStats, ApiError>),
    Historical(Result<Vec<HistoricalRecord>, ApiError>),
    Forecasts(Result<Vec<Forecast>, ApiError>),
    Subscriptions(Result<Vec<Subscription>, ApiError>),
}

impl Fetched {
    pub fn source(&self) -> DataSource {
        match self {
            Fetched::Regions(_) => DataSource::Regions,
            Fetched::Stats(_) => DataSource::Stats,
            Fetched::Historical(_) => DataSource::Historical,
            Fetched::Forecasts(_) => DataSource::Forecasts,
            Fetched::Subscriptions(_) => DataSource::Subscriptions,
        }
    }

    fn error(&self) -> Option<String> {
        match self {
            Fetched::Regions(Err(e)) => Some(e.to_string()),
            Fetched::Stats(Err(e)) => Some(e.to_string()),
            Fetched::Historical(Err(e)) => Some(e.to_string()),
            Fetched::Forecasts(Err(e)) => Some(e.to_string()),
            Fetched::Subscriptions(Err(e)) => Some(e.to_string()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// All dashboard data, one slot per source.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub regions: SourceSlot<Vec<RegionRisk>>,
    pub stats: SourceSlot<DataStats>,
    pub historical: SourceSlot<Vec<HistoricalRecord>>,
    pub forecasts: SourceSlot<Vec<Forecast>>,
    pub subscriptions: SourceSlot<Vec<Subscription>>,
}

impl DashboardState {
    pub fn new(staleness_threshold: Duration) -> Self {
        DashboardState {
            regions: SourceSlot::new(DataSource::Regions, staleness_threshold),
            stats: SourceSlot::new(DataSource::Stats, staleness_threshold),
            historical: SourceSlot::new(DataSource::Historical, staleness_threshold),
            forecasts: SourceSlot::new(DataSource::Forecasts, staleness_threshold),
            subscriptions: SourceSlot::new(DataSource::Subscriptions, staleness_threshold),
        }
    }

    pub fn begin(&mut self, source: DataSource, now: DateTime<Utc>) -> RequestToken {
        match source {
            DataSource::Regions => self.regions.begin(now),
            DataSource::Stats => self.stats.begin(now),
            DataSource::Historical => self.historical.begin(now),
            DataSource::Forecasts => self.forecasts.begin(now),
            DataSource::Subscriptions => self.subscriptions.begin(now),
        }
    }

    /// Routes a fetch result to its slot.
    pub fn apply(&mut self, token: RequestToken, fetched: Fetched, now: DateTime<Utc>) -> Completion {
        match fetched {
            Fetched::Regions(result) => {
                if let Ok(regions) = &result {
                    for d in regions.iter().filter_map(risk::reconcile) {
                        log::warn!(
                            "region {} is {} on the server but {} by river level (ratio {:.2})",
                            d.region_id,
                            d.server_level,
                            d.ratio_level,
                            d.ratio
                        );
                    }
                }
                self.regions.complete(token, result, now)
            }
            Fetched::Stats(result) => self.stats.complete(token, result, now),
            Fetched::Historical(result) => self.historical.complete(token, result, now),
            Fetched::Forecasts(result) => self.forecasts.complete(token, result, now),
            Fetched::Subscriptions(result) => self.subscriptions.complete(token, result, now),
        }
    }

    pub fn health(&self, now: DateTime<Utc>) -> Vec<SourceHealth> {
        vec![
            self.regions.health(now),
            self.stats.health(now),
            self.historical.health(now),
            self.forecasts.health(now),
            self.subscriptions.health(now),
        ]
    }

    /// Derived view over whatever data is currently available.
    pub fn summary(&self, alert_threshold: f64, now: DateTime<Utc>) -> DashboardSummary {
        let regions = self.regions.value();

        let alerts = regions
            .map(|rs| alert::simulate(rs, &RatioProbability, alert_threshold, now))
            .unwrap_or_default();
        let subscribed_alerts = self
            .subscriptions
            .value()
            .map(|subs| alert::alerts_for_subscriptions(&alerts, subs))
            .unwrap_or_default();

        // Prefer the server's statistics; fall back to aggregating the
        // historical records we have.
        let stats = self
            .stats
            .value()
            .cloned()
            .or_else(|| self.historical.value().map(|h| statistics::aggregate(h)));

        DashboardSummary {
            generated_at: now,
            total_regions: regions.map(Vec::len),
            distribution: regions.map(|rs| filter::risk_distribution(rs)),
            high_risk: regions.map(|rs| filter::high_risk(rs)).unwrap_or_default(),
            disagreements: regions
                .map(|rs| rs.iter().filter_map(risk::reconcile).collect())
                .unwrap_or_default(),
            alert_threshold,
            alerts,
            subscribed_alerts,
            stats,
            forecast_overview: self
                .forecasts
                .value()
                .map(|fs| overview::overview(fs, TOP_REGIONS)),
            health: self.health(now),
        }
    }
}

/// Everything the overview page shows. `None` fields mean the source has
/// not loaded yet.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub generated_at: DateTime<Utc>,
    pub total_regions: Option<usize>,
    pub distribution: Option<BTreeMap<RiskLevel, usize>>,
    pub high_risk: Vec<RegionRisk>,
    pub disagreements: Vec<RiskDisagreement>,
    pub alert_threshold: f64,
    pub alerts: Vec<AlertEvent>,
    pub subscribed_alerts: Vec<AlertEvent>,
    pub stats: Option<DataStats>,
    pub forecast_overview: Option<ForecastOverview>,
    pub health: Vec<SourceHealth>,
}

/// Outcome of one refresh round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub applied: Vec<DataSource>,
    pub failed: Vec<(DataSource, String)>,
    pub stale: usize,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

pub struct Dashboard {
    client: ApiClient,
    pool: ThreadPool,
    history_days: u32,
    interval_minutes: u64,
    alert_threshold: f64,
    state: DashboardState,
}

impl Dashboard {
    /// Validates `config` first, so an out-of-range refresh interval is an
    /// error rather than an overflow.
    pub fn new(client: ApiClient, config: &DashboardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let staleness = staleness_threshold(config.refresh.interval_minutes)?;
        Ok(Dashboard {
            client,
            pool: ThreadPool::new(config.refresh.workers.max(1)),
            history_days: config.defaults.history_days,
            interval_minutes: config.refresh.interval_minutes,
            alert_threshold: config.defaults.alert_threshold,
            state: DashboardState::new(staleness),
        })
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn summary(&self, now: DateTime<Utc>) -> DashboardSummary {
        self.state.summary(self.alert_threshold, now)
    }

    /// Fetches every source concurrently and waits for all of them.
    pub fn refresh(&mut self) -> RefreshReport {
        let mut sources = vec![
            DataSource::Regions,
            DataSource::Stats,
            DataSource::Historical,
            DataSource::Forecasts,
        ];
        if self.client.session().is_authenticated() {
            sources.push(DataSource::Subscriptions);
        }

        let (tx, rx) = mpsc::channel::<(RequestToken, Fetched)>();
        let now = Utc::now();
        for source in &sources {
            let token = self.state.begin(*source, now);
            let tx = tx.clone();
            let client = self.client.clone();
            let history_days = self.history_days;
            let source = *source;
            self.pool.execute(move || {
                let fetched = fetch(&client, source, history_days);
                // The receiver only goes away if refresh() itself panicked.
                let _ = tx.send((token, fetched));
            });
        }
        drop(tx);

        let mut report = RefreshReport::default();
        for (token, fetched) in rx {
            let source = fetched.source();
            let error = fetched.error();
            match self.state.apply(token, fetched, Utc::now()) {
                Completion::Stale => report.stale += 1,
                Completion::Applied => match error {
                    Some(e) => report.failed.push((source, e)),
                    None => report.applied.push(source),
                },
            }
        }
        report.applied.sort();
        report.failed.sort();
        report
    }

    /// Refreshes on a fixed interval. Runs forever unless `max_rounds` is
    /// given. Failures are logged and the loop keeps going.
    pub fn run(&mut self, max_rounds: Option<usize>) {
        println!("🚀 Starting dashboard watch loop...");
        println!("   Backend: {}", self.client.base_url());
        println!("   Refresh interval: {} minutes", self.interval_minutes);
        println!("   Alert threshold: {:.2}", self.alert_threshold);

        let mut round = 0;
        loop {
            let start = Utc::now();
            let report = self.refresh();
            round += 1;

            for (source, error) in &report.failed {
                eprintln!("✗ {} failed: {}", source, error);
            }
            let summary = self.summary(Utc::now());
            println!(
                "✓ Refresh {} complete: {} sources ready, {} regions, {} high risk, {} alerts",
                round,
                report.applied.len(),
                summary.total_regions.map_or("N/A".to_string(), |n| n.to_string()),
                summary.high_risk.len(),
                summary.alerts.len()
            );
            for alert in &summary.alerts {
                println!("   ⚠️  [{}] {}", alert.severity(), alert.message);
            }
            if let Some(o) = &summary.forecast_overview {
                println!(
                    "   Forecast: average {}, highest {}",
                    format::format_percent(o.average_probability),
                    o.highest.as_ref().map_or("N/A", |f| f.region.as_str())
                );
            }

            if max_rounds.is_some_and(|max| round >= max) {
                return;
            }

            let interval = StdDuration::from_secs(self.interval_minutes.saturating_mul(60));
            let elapsed = (Utc::now() - start).to_std().unwrap_or_default();
            if let Some(remaining) = interval.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }
}

/// Data older than two refresh intervals is flagged stale.
fn staleness_threshold(interval_minutes: u64) -> Result<Duration, ConfigError> {
    i64::try_from(interval_minutes)
        .ok()
        .and_then(|minutes| minutes.checked_mul(2))
        .and_then(Duration::try_minutes)
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "refresh.interval_minutes {} is out of range",
                interval_minutes
            ))
        })
}

fn fetch(client: &ApiClient, source: DataSource, history_days: u32) -> Fetched {
    match source {
        DataSource::Regions => Fetched::Regions(client.regions(None)),
        DataSource::Stats => Fetched::Stats(client.stats()),
        DataSource::Historical => Fetched::Historical(client.historical(&HistoricalQuery {
            days: Some(history_days),
            ..HistoricalQuery::default()
        })),
        DataSource::Forecasts => Fetched::Forecasts(client.latest_forecasts()),
        DataSource::Subscriptions => Fetched::Subscriptions(client.subscriptions()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::ingest::api::{
        parse_historical_response, parse_latest_forecasts_response, parse_regions_response,
    };
    use crate::ingest::fixtures::{
        fixture_historical_json, fixture_latest_forecasts_json, fixture_regions_json,
    };
    use crate::session::SessionContext;
    use crate::monitor::SlotStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn regions() -> Vec<RegionRisk> {
        parse_regions_response(fixture_regions_json()).unwrap()
    }

    fn down() -> ApiError {
        ApiError::Status {
            endpoint: "/data/stats".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_empty_state_summary_is_partial() {
        let state = DashboardState::new(Duration::minutes(30));
        let summary = state.summary(0.7, now());
        assert_eq!(summary.total_regions, None);
        assert!(summary.distribution.is_none());
        assert!(summary.alerts.is_empty());
        assert!(summary.stats.is_none());
        assert!(summary.forecast_overview.is_none());
        assert_eq!(summary.health.len(), 5);
    }

    #[test]
    fn test_one_failed_source_leaves_others_ready() {
        let mut state = DashboardState::new(Duration::minutes(30));
        let r = state.begin(DataSource::Regions, now());
        let s = state.begin(DataSource::Stats, now());

        state.apply(s, Fetched::Stats(Err(down())), now());
        state.apply(r, Fetched::Regions(Ok(regions())), now());

        assert_eq!(state.regions.status(), SlotStatus::Ready);
        assert_eq!(state.stats.status(), SlotStatus::Failed);

        let summary = state.summary(0.9, now());
        assert_eq!(summary.total_regions, Some(4));
        let dist = summary.distribution.expect("regions loaded");
        assert_eq!(dist[&RiskLevel::High], 2);
        assert_eq!(dist[&RiskLevel::Medium], 1);
        assert_eq!(dist[&RiskLevel::Low], 1);
        assert!(summary.stats.is_none());
    }

    #[test]
    fn test_stale_region_response_is_ignored() {
        let mut state = DashboardState::new(Duration::minutes(30));
        let old = state.begin(DataSource::Regions, now());
        let new = state.begin(DataSource::Regions, now());

        let mut fresh = regions();
        fresh.truncate(1);
        assert_eq!(state.apply(new, Fetched::Regions(Ok(fresh)), now()), Completion::Applied);
        assert_eq!(state.apply(old, Fetched::Regions(Ok(regions())), now()), Completion::Stale);
        assert_eq!(state.regions.value().map(Vec::len), Some(1));
    }

    #[test]
    fn test_summary_alerts_and_disagreements() {
        let mut state = DashboardState::new(Duration::minutes(30));
        let r = state.begin(DataSource::Regions, now());
        state.apply(r, Fetched::Regions(Ok(regions())), now());

        // Ratios: Batken 1.09 (clamped to 1.0), Osh 0.82, Naryn 0.42, Talas 0.975.
        let summary = state.summary(0.9, now());
        let names: Vec<_> = summary.alerts.iter().map(|a| a.region.as_str()).collect();
        assert_eq!(names, vec!["Batken Area", "Talas"]);

        assert_eq!(summary.disagreements.len(), 1);
        assert_eq!(summary.disagreements[0].region_id, "talas");
        assert_eq!(summary.disagreements[0].ratio_level, RiskLevel::Medium);
    }

    #[test]
    fn test_stats_fall_back_to_local_aggregation() {
        let mut state = DashboardState::new(Duration::minutes(30));
        let s = state.begin(DataSource::Stats, now());
        let h = state.begin(DataSource::Historical, now());
        state.apply(s, Fetched::Stats(Err(down())), now());
        state.apply(
            h,
            Fetched::Historical(Ok(parse_historical_response(fixture_historical_json()).unwrap())),
            now(),
        );

        let stats = state.summary(0.7, now()).stats.expect("aggregated locally");
        assert_eq!(stats.overall_stats.total_records, 5);
        assert_eq!(stats.overall_stats.flood_events, 2);
    }

    #[test]
    fn test_subscribed_alerts() {
        let mut state = DashboardState::new(Duration::minutes(30));
        let r = state.begin(DataSource::Regions, now());
        let s = state.begin(DataSource::Subscriptions, now());
        state.apply(r, Fetched::Regions(Ok(regions())), now());
        state.apply(
            s,
            Fetched::Subscriptions(Ok(vec![Subscription { id: 1, user_id: 7, region: "Talas".to_string() }])),
            now(),
        );
        let summary = state.summary(0.9, now());
        assert_eq!(summary.subscribed_alerts.len(), 1);
        assert_eq!(summary.subscribed_alerts[0].region, "Talas");
    }

    #[test]
    fn test_forecast_overview_in_summary() {
        let mut state = DashboardState::new(Duration::minutes(30));
        let f = state.begin(DataSource::Forecasts, now());
        state.apply(
            f,
            Fetched::Forecasts(Ok(parse_latest_forecasts_response(fixture_latest_forecasts_json()).unwrap())),
            now(),
        );
        let overview = state.summary(0.7, now()).forecast_overview.expect("forecasts loaded");
        assert_eq!(overview.total_regions, 6);
        assert_eq!(overview.top.len(), TOP_REGIONS);
        assert_eq!(overview.highest.map(|f| f.region), Some("batken".to_string()));
    }

    fn offline_client() -> ApiClient {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        };
        ApiClient::new(&api, SessionContext::anonymous()).unwrap()
    }

    #[test]
    fn test_out_of_range_refresh_interval_is_an_error() {
        let mut config = DashboardConfig::default();
        config.refresh.interval_minutes = 1 << 60;
        assert!(matches!(
            Dashboard::new(offline_client(), &config),
            Err(ConfigError::Invalid(_))
        ));

        config.refresh.interval_minutes = 0;
        assert!(Dashboard::new(offline_client(), &config).is_err());

        config.refresh.interval_minutes = 15;
        assert!(Dashboard::new(offline_client(), &config).is_ok());
    }

    #[test]
    fn test_staleness_threshold_uses_checked_arithmetic() {
        assert_eq!(staleness_threshold(15).unwrap(), Duration::minutes(30));
        assert!(staleness_threshold(u64::MAX).is_err());
        assert!(staleness_threshold(1 << 62).is_err());
    }
}
