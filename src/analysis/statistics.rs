/// Historical statistics for the data page charts.
///
/// `aggregate` reduces a list of `HistoricalRecord`s into overall totals,
/// per-month buckets and per-region summaries. Every ratio is returned as
/// `Option<f64>`: `None` means "no data" (an empty bucket or an empty
/// input) and is rendered as "N/A", never as NaN or 0%.
///
/// The result does not depend on input order: buckets are keyed by month
/// number and regions live in a `BTreeMap`.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::analysis::groupings::group_by_region;
use crate::model::HistoricalRecord;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_records: usize,
    pub regions_count: usize,
    pub flood_events: usize,
    pub non_flood_events: usize,
}

impl OverallStats {
    /// Share of records with a flood, or `None` when there are no records.
    pub fn flood_ratio(&self) -> Option<f64> {
        ratio(self.flood_events, self.total_records)
    }
}

/// Monthly buckets as parallel arrays, months ascending. Only months that
/// occur in the input get a bucket.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeries {
    pub months: Vec<u32>,
    pub flood_counts: Vec<usize>,
    pub total_counts: Vec<usize>,
}

/// One month of the calendar chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub month: u32,
    pub month_name: &'static str,
    pub flood_count: usize,
    pub total_count: usize,
    pub flood_ratio: Option<f64>,
}

impl TimeSeries {
    /// Flood share of bucket `index`; `None` if the bucket is empty or
    /// missing.
    pub fn flood_ratio(&self, index: usize) -> Option<f64> {
        let floods = *self.flood_counts.get(index)?;
        let total = *self.total_counts.get(index)?;
        ratio(floods, total)
    }

    /// All twelve calendar months, with empty months carrying a `None`
    /// ratio.
    pub fn monthly_rows(&self) -> Vec<MonthlyRow> {
        (1..=12u32)
            .map(|month| {
                let index = self.months.iter().position(|m| *m == month);
                let flood_count = index.and_then(|i| self.flood_counts.get(i)).copied().unwrap_or(0);
                let total_count = index.and_then(|i| self.total_counts.get(i)).copied().unwrap_or(0);
                MonthlyRow {
                    month,
                    month_name: month_name(month),
                    flood_count,
                    total_count,
                    flood_ratio: ratio(flood_count, total_count),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    pub records: usize,
    pub flood_events: usize,
    pub avg_river_level: f64,
    pub max_river_level: f64,
}

impl RegionStats {
    pub fn flood_ratio(&self) -> Option<f64> {
        ratio(self.flood_events, self.records)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataStats {
    pub region_stats: BTreeMap<String, RegionStats>,
    pub overall_stats: OverallStats,
    pub time_series: TimeSeries,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Reduces historical records into chart statistics.
pub fn aggregate(records: &[HistoricalRecord]) -> DataStats {
    let flood_events = records.iter().filter(|r| r.flood_status).count();
    let grouped = group_by_region(records);

    let overall_stats = OverallStats {
        total_records: records.len(),
        regions_count: grouped.len(),
        flood_events,
        non_flood_events: records.len() - flood_events,
    };

    // month -> (flood, total)
    let mut buckets: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for record in records {
        let bucket = buckets.entry(record.date.month()).or_insert((0, 0));
        if record.flood_status {
            bucket.0 += 1;
        }
        bucket.1 += 1;
    }

    let mut time_series = TimeSeries::default();
    for (month, (floods, total)) in buckets {
        time_series.months.push(month);
        time_series.flood_counts.push(floods);
        time_series.total_counts.push(total);
    }

    let region_stats = grouped
        .into_iter()
        .map(|(name, history)| {
            let levels: Vec<f64> = history.records.iter().map(|r| r.river_level).collect();
            let sum: f64 = levels.iter().sum();
            let max = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let stats = RegionStats {
                records: levels.len(),
                flood_events: history.flood_days(),
                // A group always holds at least one record.
                avg_river_level: sum / levels.len() as f64,
                max_river_level: max,
            };
            (name, stats)
        })
        .collect();

    DataStats {
        region_stats,
        overall_stats,
        time_series,
    }
}

/// Short month label ("Jan" .. "Dec"); out-of-range months map to "?".
pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i as usize))
        .copied()
        .unwrap_or("?")
}

fn ratio(part: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{api::parse_historical_response, fixtures::fixture_historical_json};
    use chrono::NaiveDate;

    fn fixture_records() -> Vec<HistoricalRecord> {
        parse_historical_response(fixture_historical_json()).expect("fixture should parse")
    }

    fn record(date: (i32, u32, u32), region: &str, level: f64, flood: bool) -> HistoricalRecord {
        HistoricalRecord {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            region: region.to_string(),
            river_level: level,
            precipitation: 0.0,
            temperature: 10.0,
            flood_status: flood,
        }
    }

    #[test]
    fn test_empty_input_has_no_data_marker() {
        let stats = aggregate(&[]);
        assert_eq!(stats.overall_stats.total_records, 0);
        assert_eq!(stats.overall_stats.flood_events, 0);
        assert_eq!(stats.overall_stats.non_flood_events, 0);
        assert_eq!(stats.overall_stats.flood_ratio(), None);
        assert!(stats.time_series.months.is_empty());
        assert!(stats.region_stats.is_empty());
    }

    #[test]
    fn test_overall_counts() {
        let stats = aggregate(&fixture_records());
        assert_eq!(stats.overall_stats.total_records, 5);
        assert_eq!(stats.overall_stats.regions_count, 2);
        assert_eq!(stats.overall_stats.flood_events, 2);
        assert_eq!(stats.overall_stats.non_flood_events, 3);
        assert_eq!(stats.overall_stats.flood_ratio(), Some(0.4));
    }

    #[test]
    fn test_monthly_buckets() {
        let stats = aggregate(&fixture_records());
        assert_eq!(stats.time_series.months, vec![4, 5]);
        assert_eq!(stats.time_series.flood_counts, vec![2, 0]);
        assert_eq!(stats.time_series.total_counts, vec![3, 2]);
        assert_eq!(stats.time_series.flood_ratio(1), Some(0.0));
        assert_eq!(stats.time_series.flood_ratio(7), None);
    }

    #[test]
    fn test_monthly_rows_distinguish_no_data_from_zero() {
        let rows = aggregate(&fixture_records()).time_series.monthly_rows();
        assert_eq!(rows.len(), 12);
        let january = &rows[0];
        assert_eq!(january.month_name, "Jan");
        assert_eq!(january.total_count, 0);
        assert_eq!(january.flood_ratio, None, "empty month is no data, not 0%");
        let may = &rows[4];
        assert_eq!(may.total_count, 2);
        assert_eq!(may.flood_ratio, Some(0.0));
    }

    #[test]
    fn test_region_stats() {
        let stats = aggregate(&fixture_records());
        let batken = &stats.region_stats["Batken Area"];
        assert_eq!(batken.records, 3);
        assert_eq!(batken.flood_events, 2);
        assert!((batken.avg_river_level - 12.5 / 3.0).abs() < 1e-9);
        assert_eq!(batken.max_river_level, 4.8);

        let osh = &stats.region_stats["Osh"];
        assert_eq!(osh.records, 2);
        assert_eq!(osh.flood_events, 0);
        assert!((osh.avg_river_level - 3.1).abs() < 1e-9);
        assert_eq!(osh.max_river_level, 3.3);
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let records = vec![
            record((2023, 6, 1), "Talas", 2.0, false),
            record((2023, 1, 9), "Naryn", 5.5, true),
            record((2023, 6, 3), "Naryn", 4.0, false),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(aggregate(&records), aggregate(&reversed));
    }

    #[test]
    fn test_negative_river_levels_still_give_true_max() {
        let records = vec![
            record((2023, 2, 1), "Chu", -0.5, false),
            record((2023, 2, 2), "Chu", -0.2, false),
        ];
        let stats = aggregate(&records);
        assert_eq!(stats.region_stats["Chu"].max_river_level, -0.2);
    }

    #[test]
    fn test_month_name_bounds() {
        assert_eq!(month_name(1), "Jan");
        assert_eq!(month_name(12), "Dec");
        assert_eq!(month_name(0), "?");
        assert_eq!(month_name(13), "?");
    }
}
