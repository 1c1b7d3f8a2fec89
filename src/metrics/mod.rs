//! # Metrics
//!
//! Read-only operational statistics for the scheduler. See [`MetricsCollector`] for the
//! counters and [`QueueStats`] for the diagnostic snapshot.

pub mod collector;
pub mod queue_stats;

pub use collector::{AttemptOutcome, MetricsCollector, QueueMetrics, TypeMetrics};
pub use queue_stats::{QueueStats, TypeQueueStats};
