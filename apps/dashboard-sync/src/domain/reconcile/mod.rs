//! Snapshot Reconciliation
//!
//! Folds validated inbound messages into the current snapshot.
//!
//! # Rules
//!
//! - `initial` and legacy frames replace everything.
//! - `update` with a prior snapshot appends its time-series points in arrival
//!   order. Points are never deduplicated by date; bar and heatmap data stay
//!   as they were.
//! - `update` without a prior snapshot stands alone: the provided collections
//!   are kept and the missing ones are empty.

use std::sync::Arc;

use crate::domain::snapshot::{InboundMessage, PartialSnapshot, Snapshot};

/// Merge `message` into `current`, returning the new snapshot.
#[must_use]
pub fn reconcile(current: Option<&Snapshot>, message: InboundMessage) -> Snapshot {
    match message {
        InboundMessage::Initial(snapshot) | InboundMessage::Legacy(snapshot) => snapshot,
        InboundMessage::Update(partial) => merge_update(current, partial),
    }
}

fn merge_update(current: Option<&Snapshot>, partial: PartialSnapshot) -> Snapshot {
    let Some(prior) = current else {
        return partial.into_snapshot();
    };

    let mut merged = prior.clone();
    if let Some(points) = partial.time_series {
        merged.time_series.extend(points);
    }
    merged
}

/// Owns the current snapshot for one feed.
#[derive(Debug, Default)]
pub struct Reconciler {
    current: Option<Arc<Snapshot>>,
}

impl Reconciler {
    /// Create a reconciler with no snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Create a reconciler seeded with a previously fetched snapshot.
    #[must_use]
    pub fn seeded(snapshot: Snapshot) -> Self {
        Self {
            current: Some(Arc::new(snapshot)),
        }
    }

    /// Apply a message and return the resulting snapshot.
    pub fn apply(&mut self, message: InboundMessage) -> Arc<Snapshot> {
        let next = Arc::new(reconcile(self.current.as_deref(), message));
        self.current = Some(Arc::clone(&next));
        next
    }

    /// Current snapshot, if any message or seed has been applied.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{BarEntry, HeatmapCell, TimeSeriesPoint};
    use proptest::prelude::*;

    fn point(date: &str, revenue: f64) -> TimeSeriesPoint {
        TimeSeriesPoint::new(date).with_value("revenue", revenue)
    }

    fn sample() -> Snapshot {
        Snapshot {
            time_series: vec![point("2023-01-01", 1.0), point("2023-01-02", 2.0)],
            bar_data: vec![BarEntry::new("Jan").with_value("revenue", 10.0)],
            heatmap_data: vec![HeatmapCell::new("00-04", "Product A", 5.0)],
        }
    }

    #[test]
    fn initial_replaces_prior_state() {
        let replacement = Snapshot {
            time_series: vec![point("2024-06-01", 9.0)],
            ..Snapshot::default()
        };

        let result = reconcile(
            Some(&sample()),
            InboundMessage::Initial(replacement.clone()),
        );
        assert_eq!(result, replacement);
    }

    #[test]
    fn legacy_is_full_replacement() {
        let result = reconcile(Some(&sample()), InboundMessage::Legacy(Snapshot::default()));
        assert!(result.is_empty());
    }

    #[test]
    fn update_appends_in_order() {
        let update = PartialSnapshot::time_series(vec![point("2023-01-03", 3.0)]);
        let result = reconcile(Some(&sample()), InboundMessage::Update(update));

        let dates: Vec<_> = result.time_series.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, ["2023-01-01", "2023-01-02", "2023-01-03"]);
        assert_eq!(result.bar_data, sample().bar_data);
        assert_eq!(result.heatmap_data, sample().heatmap_data);
    }

    #[test]
    fn update_keeps_duplicate_dates() {
        let update = PartialSnapshot::time_series(vec![point("2023-01-02", 7.0)]);
        let result = reconcile(Some(&sample()), InboundMessage::Update(update));

        assert_eq!(result.time_series.len(), 3);
        assert_eq!(result.time_series[1].value("revenue"), Some(2.0));
        assert_eq!(result.time_series[2].value("revenue"), Some(7.0));
    }

    #[test]
    fn update_without_prior_builds_minimal_snapshot() {
        let update = PartialSnapshot::time_series(vec![point("2023-01-03", 3.0)]);
        let result = reconcile(None, InboundMessage::Update(update));

        assert_eq!(result.time_series.len(), 1);
        assert!(result.bar_data.is_empty());
        assert!(result.heatmap_data.is_empty());
    }

    #[test]
    fn update_bar_data_never_overwrites_prior() {
        let update = PartialSnapshot {
            bar_data: Some(vec![]),
            ..PartialSnapshot::default()
        };
        let result = reconcile(Some(&sample()), InboundMessage::Update(update));
        assert_eq!(result, sample());
    }

    #[test]
    fn reconciler_tracks_current_snapshot() {
        let mut reconciler = Reconciler::seeded(sample());
        let next = reconciler.apply(InboundMessage::Update(PartialSnapshot::time_series(
            vec![point("2023-01-03", 3.0)],
        )));

        assert_eq!(next.time_series.len(), 3);
        assert_eq!(reconciler.current().unwrap().time_series.len(), 3);
    }

    fn arb_points(max: usize) -> impl Strategy<Value = Vec<TimeSeriesPoint>> {
        prop::collection::vec(
            ("[0-9]{4}-[0-9]{2}-[0-9]{2}", -1.0e6..1.0e6f64)
                .prop_map(|(date, v)| point(&date, v)),
            0..max,
        )
    }

    proptest! {
        #[test]
        fn update_length_is_prior_plus_incoming(prior in arb_points(20), incoming in arb_points(20)) {
            let current = Snapshot { time_series: prior.clone(), ..Snapshot::default() };
            let result = reconcile(
                Some(&current),
                InboundMessage::Update(PartialSnapshot::time_series(incoming.clone())),
            );

            prop_assert_eq!(result.time_series.len(), prior.len() + incoming.len());
            prop_assert_eq!(&result.time_series[..prior.len()], &prior[..]);
            prop_assert_eq!(&result.time_series[prior.len()..], &incoming[..]);
        }

        #[test]
        fn initial_always_equals_payload(prior in arb_points(10), payload in arb_points(10)) {
            let current = Snapshot { time_series: prior, ..Snapshot::default() };
            let replacement = Snapshot { time_series: payload, ..Snapshot::default() };
            let result = reconcile(Some(&current), InboundMessage::Initial(replacement.clone()));
            prop_assert_eq!(result, replacement);
        }
    }
}
