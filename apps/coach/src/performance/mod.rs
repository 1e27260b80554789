// Performance tracking: live-session aggregation, feedback text, and the
// durable per-user level/history behind the `ProfileStore` port.

pub mod feedback;
pub mod handlers;
pub mod store;
pub mod tracker;

pub use store::{ProfileStore, StoreError};
pub use tracker::{FinalizeOutcome, PerformanceStats, PerformanceTracker, TrackerError};
