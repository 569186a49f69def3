//! The staleness-gated import pipeline.
//!
//! [`gate`] decides when each key refreshes, [`cache`] keeps the last good
//! snapshot of every collection, [`terms`] and [`import`] project snapshots
//! into the stores, and [`cycle`] runs them in order.

pub mod cache;
pub mod clock;
pub mod cycle;
pub mod gate;
pub mod import;
pub mod normalize;
pub mod scheduler;
pub mod terms;

pub use cycle::{CycleReport, Pipeline};
pub use gate::{RefreshKey, RefreshState, StalenessGate};
