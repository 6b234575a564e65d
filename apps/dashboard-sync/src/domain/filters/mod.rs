//! Client-side Filters
//!
//! Pure projections over a [`Snapshot`]. Filtering never touches its input;
//! it always returns a new snapshot.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate};

use crate::domain::snapshot::{BarEntry, HeatmapCell, Snapshot, TimeSeriesPoint};

/// Filters held by the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Inclusive date range; applied only when both bounds are set.
    pub date_range: (Option<NaiveDate>, Option<NaiveDate>),
    /// Metrics to keep on each time-series point (empty = all).
    pub metrics: BTreeSet<String>,
    /// Categories to keep in bar and heatmap data (empty = all).
    pub categories: BTreeSet<String>,
}

impl Filters {
    /// Filters that keep everything.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the inclusive date range.
    #[must_use]
    pub const fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = (Some(start), Some(end));
        self
    }

    /// Keep only the given metrics.
    #[must_use]
    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    /// Keep only the given categories.
    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Whether applying these filters is a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active_range().is_none() && self.metrics.is_empty() && self.categories.is_empty()
    }

    fn active_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self.date_range {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// Project `snapshot` through `filters`.
#[must_use]
pub fn apply_filters(snapshot: &Snapshot, filters: &Filters) -> Snapshot {
    let range = filters.active_range();
    let time_series = snapshot
        .time_series
        .iter()
        .filter(|point| range.is_none_or(|(start, end)| in_range(point, start, end)))
        .map(|point| project_metrics(point, &filters.metrics))
        .collect();

    let categories: Vec<String> = filters
        .categories
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    let bar_data = snapshot
        .bar_data
        .iter()
        .filter(|entry| categories.is_empty() || bar_matches(entry, &categories))
        .cloned()
        .collect();

    let heatmap_data = snapshot
        .heatmap_data
        .iter()
        .filter(|cell| categories.is_empty() || cell_matches(cell, &categories))
        .cloned()
        .collect();

    Snapshot {
        time_series,
        bar_data,
        heatmap_data,
    }
}

/// Parse a time-series date key.
///
/// Accepts `YYYY-MM-DD` and RFC 3339 timestamps.
#[must_use]
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(date).ok().map(|dt| dt.date_naive()))
}

fn in_range(point: &TimeSeriesPoint, start: NaiveDate, end: NaiveDate) -> bool {
    parse_date(&point.date).is_some_and(|date| date >= start && date <= end)
}

fn project_metrics(point: &TimeSeriesPoint, metrics: &BTreeSet<String>) -> TimeSeriesPoint {
    if metrics.is_empty() {
        return point.clone();
    }

    TimeSeriesPoint {
        date: point.date.clone(),
        values: point
            .values
            .iter()
            .filter(|(name, _)| metrics.contains(*name))
            .map(|(name, value)| (name.clone(), *value))
            .collect(),
    }
}

fn bar_matches(entry: &BarEntry, categories: &[String]) -> bool {
    let name = entry.name.to_lowercase();
    categories.iter().any(|c| name.contains(c.as_str()))
}

fn cell_matches(cell: &HeatmapCell, categories: &[String]) -> bool {
    let x = cell.x.to_lowercase();
    let y = cell.y.to_lowercase();
    categories
        .iter()
        .any(|c| x.contains(c.as_str()) || y.contains(c.as_str()))
}
