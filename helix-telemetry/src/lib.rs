//! Structured logging, tracing, and in-process metrics for HelixAgent.

pub mod events;
pub mod init;
pub mod metrics;

pub use events::{Component, EventOutcome, ObservabilityEvent, emit};
pub use init::{TelemetryConfig, init_telemetry, shutdown_telemetry};
pub use metrics::{HistogramSnapshot, MetricsRegistry, MetricsSnapshot};

/// Re-export so call sites can `use helix_telemetry::tracing;` without an
/// extra direct dependency edge.
pub use tracing;
