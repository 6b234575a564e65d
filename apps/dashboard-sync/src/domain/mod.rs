//! Domain Layer - Dashboard data types and pure logic.
//!
//! Nothing in this layer performs I/O. Snapshots, reconciliation and filters
//! are plain functions over owned data; errors carry no transport handles.

/// Error taxonomy shared by every layer.
pub mod error;

/// Client-side snapshot filters.
pub mod filters;

/// Merging inbound messages into the current snapshot.
pub mod reconcile;

/// Snapshot and inbound message types.
pub mod snapshot;
