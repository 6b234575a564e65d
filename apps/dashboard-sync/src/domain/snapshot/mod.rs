//! Dashboard Snapshot Types
//!
//! The view model held by the reconciler: an ordered time series, ordered bar
//! entries and a set of heatmap cells. Values are built only by the schema
//! validator, so every instance here has already been checked.
//!
//! # Metric values
//!
//! Time-series metrics are three-state. A metric missing from
//! [`TimeSeriesPoint::values`] was not reported, `Some(None)` is an explicit
//! `null`, and `Some(Some(v))` is a value. Rendering code only needs
//! [`TimeSeriesPoint::value`], which collapses the first two.

use std::collections::BTreeMap;

use serde::Serialize;

/// Metrics every dashboard chart knows about.
pub const KNOWN_METRICS: [&str; 3] = ["revenue", "users", "conversion"];

// =============================================================================
// Entities
// =============================================================================

/// One point of the time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    /// Date key (`YYYY-MM-DD` or RFC 3339).
    pub date: String,
    /// Metric name to value.
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl TimeSeriesPoint {
    /// Create a point with no metrics.
    #[must_use]
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add a reported metric value.
    #[must_use]
    pub fn with_value(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.values.insert(metric.into(), Some(value));
        self
    }

    /// Add a metric explicitly reported as unknown.
    #[must_use]
    pub fn with_null(mut self, metric: impl Into<String>) -> Self {
        self.values.insert(metric.into(), None);
        self
    }

    /// Value to render for a metric; `None` for both null and absent.
    #[must_use]
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied().flatten()
    }
}

/// Value of a bar metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BarValue {
    /// Numeric value.
    Number(f64),
    /// Text label.
    Label(String),
}

/// One categorical bar entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarEntry {
    /// Category name.
    pub name: String,
    /// Metric name to value.
    #[serde(flatten)]
    pub values: BTreeMap<String, BarValue>,
}

impl BarEntry {
    /// Create an entry with no metrics.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add a numeric metric.
    #[must_use]
    pub fn with_value(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.values.insert(metric.into(), BarValue::Number(value));
        self
    }

    /// Numeric value of a metric, if it has one.
    #[must_use]
    pub fn value(&self, metric: &str) -> Option<f64> {
        match self.values.get(metric) {
            Some(BarValue::Number(v)) => Some(*v),
            _ => None,
        }
    }
}

/// One heatmap cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    /// X-axis bucket.
    pub x: String,
    /// Y-axis category.
    pub y: String,
    /// Cell value.
    pub value: f64,
}

impl HeatmapCell {
    /// Create a cell.
    #[must_use]
    pub fn new(x: impl Into<String>, y: impl Into<String>, value: f64) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            value,
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Full dashboard view model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Ordered time series.
    pub time_series: Vec<TimeSeriesPoint>,
    /// Ordered bar entries.
    pub bar_data: Vec<BarEntry>,
    /// Heatmap cells (order carries no meaning).
    pub heatmap_data: Vec<HeatmapCell>,
}

impl Snapshot {
    /// Whether all three collections are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time_series.is_empty() && self.bar_data.is_empty() && self.heatmap_data.is_empty()
    }
}

/// Incremental payload of an `update` message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialSnapshot {
    /// New time-series points, if any.
    pub time_series: Option<Vec<TimeSeriesPoint>>,
    /// Bar entries, if any.
    pub bar_data: Option<Vec<BarEntry>>,
    /// Heatmap cells, if any.
    pub heatmap_data: Option<Vec<HeatmapCell>>,
}

impl PartialSnapshot {
    /// Partial carrying only time-series points.
    #[must_use]
    pub const fn time_series(points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            time_series: Some(points),
            bar_data: None,
            heatmap_data: None,
        }
    }

    /// Whether no collection is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.time_series.is_none() && self.bar_data.is_none() && self.heatmap_data.is_none()
    }

    /// Build a standalone snapshot from the provided collections.
    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            time_series: self.time_series.unwrap_or_default(),
            bar_data: self.bar_data.unwrap_or_default(),
            heatmap_data: self.heatmap_data.unwrap_or_default(),
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Full snapshot replacing all prior state.
    Initial(Snapshot),
    /// Incremental update.
    Update(PartialSnapshot),
    /// Untagged frame, treated as a full replacement.
    Legacy(Snapshot),
}

impl InboundMessage {
    /// Kind label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Initial(_) => "initial",
            Self::Update(_) => "update",
            Self::Legacy(_) => "legacy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_value_collapses_null_and_absent() {
        let point = TimeSeriesPoint::new("2023-01-01")
            .with_value("revenue", 10.0)
            .with_null("users");

        assert_eq!(point.value("revenue"), Some(10.0));
        assert_eq!(point.value("users"), None);
        assert_eq!(point.value("conversion"), None);
        assert!(point.values.contains_key("users"));
        assert!(!point.values.contains_key("conversion"));
    }

    #[test]
    fn snapshot_serializes_wire_shape() {
        let snapshot = Snapshot {
            time_series: vec![TimeSeriesPoint::new("2023-01-01").with_value("revenue", 1.0)],
            bar_data: vec![BarEntry::new("Jan").with_value("users", 2.0)],
            heatmap_data: vec![HeatmapCell::new("A", "X", 3.0)],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timeSeries": [{"date": "2023-01-01", "revenue": 1.0}],
                "barData": [{"name": "Jan", "users": 2.0}],
                "heatmapData": [{"x": "A", "y": "X", "value": 3.0}],
            })
        );
    }

    #[test]
    fn partial_into_snapshot_fills_missing_collections() {
        let partial = PartialSnapshot::time_series(vec![TimeSeriesPoint::new("2023-01-05")]);
        let snapshot = partial.into_snapshot();
        assert_eq!(snapshot.time_series.len(), 1);
        assert!(snapshot.bar_data.is_empty());
        assert!(snapshot.heatmap_data.is_empty());
    }

    #[test]
    fn empty_partial() {
        assert!(PartialSnapshot::default().is_empty());
        assert!(!PartialSnapshot::time_series(vec![]).is_empty());
    }
}
