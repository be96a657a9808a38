/// Freshness and request sequencing for dashboard data sources.
///
/// Every data source the dashboard shows (regions, statistics, history,
/// latest forecasts, subscriptions) lives in a `SourceSlot`. A slot hands
/// out a monotonically increasing `RequestToken` each time a fetch starts
/// and only accepts the response carrying the most recently issued token.
/// A slow response from an older request can therefore never overwrite
/// newer data, whatever order the responses arrive in.
///
/// **Slot lifecycle:**
/// 1. `begin()` issues a token and marks the slot `Loading`
/// 2. The fetch runs (possibly on another thread)
/// 3. `complete(token, result)` applies the result if the token is current,
///    otherwise reports `Completion::Stale` and leaves the slot untouched
/// 4. A failure keeps the last good value but marks the slot `Failed`
///
/// Staleness (`is_stale`) is separate from sequencing: it is about how old
/// the applied data is, not which request produced it.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Sources and tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Regions,
    Stats,
    Historical,
    Forecasts,
    Subscriptions,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Regions => "regions",
            DataSource::Stats => "stats",
            DataSource::Historical => "historical",
            DataSource::Forecasts => "forecasts",
            DataSource::Subscriptions => "subscriptions",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one fetch of one source. Only comparable within a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Never requested.
    Idle,
    Loading,
    Ready,
    /// The latest request failed. Any earlier value is still available.
    Failed,
}

/// What `complete` did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer request has been issued since; the response was dropped.
    Stale,
}

#[derive(Debug, Clone)]
pub struct SourceSlot<T> {
    source: DataSource,
    issued: u64,
    status: SlotStatus,
    value: Option<T>,
    error: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    staleness_threshold: Duration,
}

impl<T> SourceSlot<T> {
    pub fn new(source: DataSource, staleness_threshold: Duration) -> Self {
        SourceSlot {
            source,
            issued: 0,
            status: SlotStatus::Idle,
            value: None,
            error: None,
            updated_at: None,
            last_attempt: None,
            consecutive_failures: 0,
            staleness_threshold,
        }
    }

    /// Starts a fetch and returns its token. Any outstanding token is
    /// superseded.
    pub fn begin(&mut self, now: DateTime<Utc>) -> RequestToken {
        self.issued += 1;
        self.status = SlotStatus::Loading;
        self.last_attempt = Some(now);
        RequestToken(self.issued)
    }

    /// Applies a fetch result if `token` is the latest one issued.
    pub fn complete<E: fmt::Display>(
        &mut self,
        token: RequestToken,
        result: Result<T, E>,
        now: DateTime<Utc>,
    ) -> Completion {
        if token.0 != self.issued {
            log::warn!(
                "discarding stale {} response #{} (latest request is #{})",
                self.source,
                token.0,
                self.issued
            );
            return Completion::Stale;
        }

        match result {
            Ok(value) => {
                self.value = Some(value);
                self.error = None;
                self.updated_at = Some(now);
                self.consecutive_failures = 0;
                self.status = SlotStatus::Ready;
            }
            Err(e) => {
                log::error!("{} fetch failed: {}", self.source, e);
                self.error = Some(e.to_string());
                self.consecutive_failures += 1;
                self.status = SlotStatus::Failed;
            }
        }
        Completion::Applied
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    /// Latest successfully applied value.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Data older than the threshold, or never loaded, is stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.updated_at {
            Some(at) => now - at > self.staleness_threshold,
            None => true,
        }
    }

    pub fn health(&self, now: DateTime<Utc>) -> SourceHealth {
        SourceHealth {
            source: self.source,
            status: self.status,
            has_data: self.value.is_some(),
            updated_at: self.updated_at,
            last_attempt: self.last_attempt,
            age_minutes: self.updated_at.map(|at| (now - at).num_minutes()),
            is_stale: self.is_stale(now),
            consecutive_failures: self.consecutive_failures,
            error: self.error.clone(),
        }
    }
}

/// Snapshot of one slot for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceHealth {
    pub source: DataSource,
    pub status: SlotStatus,
    pub has_data: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub age_minutes: Option<i64>,
    pub is_stale: bool,
    pub consecutive_failures: u32,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn slot() -> SourceSlot<Vec<&'static str>> {
        SourceSlot::new(DataSource::Regions, Duration::minutes(15))
    }

    #[test]
    fn test_new_slot_is_idle_and_stale() {
        let s = slot();
        assert_eq!(s.status(), SlotStatus::Idle);
        assert!(s.value().is_none());
        assert!(s.is_stale(t0()));
    }

    #[test]
    fn test_tokens_increase() {
        let mut s = slot();
        let a = s.begin(t0());
        let b = s.begin(t0());
        assert!(b > a);
        assert_eq!(s.status(), SlotStatus::Loading);
    }

    #[test]
    fn test_late_response_from_older_request_is_dropped() {
        let mut s = slot();
        let first = s.begin(t0());
        let second = s.begin(t0());

        // Newer request answers first, older one straggles in afterwards.
        assert_eq!(s.complete(second, Ok::<_, String>(vec!["new"]), t0()), Completion::Applied);
        assert_eq!(s.complete(first, Ok::<_, String>(vec!["old"]), t0()), Completion::Stale);
        assert_eq!(s.value(), Some(&vec!["new"]));
    }

    #[test]
    fn test_older_response_dropped_even_if_newer_still_pending() {
        let mut s = slot();
        let first = s.begin(t0());
        let _second = s.begin(t0());
        assert_eq!(s.complete(first, Ok::<_, String>(vec!["old"]), t0()), Completion::Stale);
        assert!(s.value().is_none());
        assert_eq!(s.status(), SlotStatus::Loading);
    }

    #[test]
    fn test_failure_keeps_last_good_value() {
        let mut s = slot();
        let t = s.begin(t0());
        s.complete(t, Ok::<_, String>(vec!["good"]), t0());

        let t = s.begin(t0() + Duration::minutes(5));
        s.complete(t, Err::<Vec<&str>, _>("connection refused"), t0() + Duration::minutes(5));

        assert_eq!(s.status(), SlotStatus::Failed);
        assert_eq!(s.value(), Some(&vec!["good"]));
        assert_eq!(s.error(), Some("connection refused"));
        assert_eq!(s.consecutive_failures(), 1);
        assert_eq!(s.updated_at(), Some(t0()), "failure does not refresh the timestamp");
    }

    #[test]
    fn test_staleness_threshold() {
        let mut s = slot();
        let t = s.begin(t0());
        s.complete(t, Ok::<_, String>(vec![]), t0());
        assert!(!s.is_stale(t0() + Duration::minutes(10)));
        assert!(s.is_stale(t0() + Duration::minutes(16)));

        let health = s.health(t0() + Duration::minutes(16));
        assert_eq!(health.age_minutes, Some(16));
        assert!(health.is_stale);
        assert!(health.has_data);
    }
}
