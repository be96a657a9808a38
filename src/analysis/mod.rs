/// Presentation-side analysis for the flood dashboard.
///
/// Submodules:
/// - `filter`     — region search, risk filter and ordering.
/// - `groupings`  — organizes flat historical records into per-region histories.
/// - `overview`   — latest-forecast metrics: counts, mean, top regions.
/// - `statistics` — monthly buckets, totals and per-region summaries.
/// - `trend`      — parallel-array risk trends reshaped into chart rows.

pub mod filter;
pub mod groupings;
pub mod overview;
pub mod statistics;
pub mod trend;
