/// Region search, risk filtering and ordering for the regions page.
///
/// `filter_and_sort` borrows the fetched region list and returns a new,
/// ordered `Vec`; the input is never reordered in place. All sorts are
/// stable, so regions that compare equal keep their input order and the
/// result is fully deterministic.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::{RegionRisk, RiskLevel};

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Field to order regions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Ascending, case-insensitive.
    Name,
    /// Ascending, case-insensitive.
    Basin,
    /// Descending by current river level.
    RiverLevel,
    /// Descending by level / threshold. Regions without a ratio go last.
    RiskRatio,
    /// Descending by rank (High, Medium, Low).
    #[default]
    RiskLevel,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "basin" => Ok(SortKey::Basin),
            "river_level" => Ok(SortKey::RiverLevel),
            "risk_ratio" => Ok(SortKey::RiskRatio),
            "risk_level" => Ok(SortKey::RiskLevel),
            other => Err(format!(
                "unknown sort key '{}' (expected name, basin, river_level, risk_ratio or risk_level)",
                other
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Name => "name",
            SortKey::Basin => "basin",
            SortKey::RiverLevel => "river_level",
            SortKey::RiskRatio => "risk_ratio",
            SortKey::RiskLevel => "risk_level",
        })
    }
}

/// Risk-level filter; `All` passes every region through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskFilter {
    #[default]
    All,
    Only(RiskLevel),
}

impl RiskFilter {
    fn matches(self, level: RiskLevel) -> bool {
        match self {
            RiskFilter::All => true,
            RiskFilter::Only(wanted) => wanted == level,
        }
    }
}

impl FromStr for RiskFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(RiskFilter::All);
        }
        s.parse::<RiskLevel>()
            .map(RiskFilter::Only)
            .map_err(|e| e.to_string())
    }
}

/// Search, filter and sort settings for one regions-page view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionQuery {
    pub search: Option<String>,
    pub risk_filter: RiskFilter,
    pub sort_key: SortKey,
}

// ---------------------------------------------------------------------------
// Filtering and sorting
// ---------------------------------------------------------------------------

/// Applies search, risk filter and ordering to a region list.
///
/// Search is a case-insensitive substring match on name or basin; an empty
/// or whitespace-only search matches everything.
pub fn filter_and_sort(regions: &[RegionRisk], query: &RegionQuery) -> Vec<RegionRisk> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut filtered: Vec<RegionRisk> = regions
        .iter()
        .filter(|r| matches_search(r, needle.as_deref()))
        .filter(|r| query.risk_filter.matches(r.risk_level))
        .cloned()
        .collect();

    filtered.sort_by(|a, b| compare(a, b, query.sort_key));
    filtered
}

fn matches_search(region: &RegionRisk, needle: Option<&str>) -> bool {
    match needle {
        None => true,
        Some(needle) => {
            region.name.to_lowercase().contains(needle)
                || region.basin.to_lowercase().contains(needle)
        }
    }
}

fn compare(a: &RegionRisk, b: &RegionRisk, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => compare_text(&a.name, &b.name),
        SortKey::Basin => compare_text(&a.basin, &b.basin),
        SortKey::RiverLevel => b.current_river_level.total_cmp(&a.current_river_level),
        SortKey::RiskRatio => match (a.risk_ratio(), b.risk_ratio()) {
            (Some(ra), Some(rb)) => rb.total_cmp(&ra),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::RiskLevel => b.risk_level.rank().cmp(&a.risk_level.rank()),
    }
}

/// Case-insensitive order with the exact string as tie-break, so "osh" and
/// "Osh" still have a fixed relative order.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

// ---------------------------------------------------------------------------
// Dashboard helpers
// ---------------------------------------------------------------------------

/// Number of regions per risk level. Every level is present, zero if
/// unused, so the distribution chart always has three slices.
pub fn risk_distribution(regions: &[RegionRisk]) -> BTreeMap<RiskLevel, usize> {
    let mut counts: BTreeMap<RiskLevel, usize> =
        RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
    for region in regions {
        *counts.entry(region.risk_level).or_insert(0) += 1;
    }
    counts
}

/// High-risk regions ordered by how far they are over threshold.
pub fn high_risk(regions: &[RegionRisk]) -> Vec<RegionRisk> {
    filter_and_sort(
        regions,
        &RegionQuery {
            search: None,
            risk_filter: RiskFilter::Only(RiskLevel::High),
            sort_key: SortKey::RiskRatio,
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
