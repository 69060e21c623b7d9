//! Tributary - Metrics
//!
//! Lock-free counters for stream processors and a periodic reporter that
//! logs them.
//!
//! # Metrics Handle Pattern
//!
//! Each stream processor owns an `Arc<StreamMetrics>` and hands out a
//! lightweight handle implementing [`StreamMetricsProvider`]. The handle
//! stays valid for as long as the reporter needs it, independent of the
//! processor's own lifetime.
//!
//! ```text
//! StreamProcessor (owns Arc<StreamMetrics>)
//!     │
//!     └──► metrics_handle() → handle (clones Arc, implements provider)
//!                                 │
//!                                 └──► StreamReporter::run(cancel)
//! ```

pub mod format;
mod reporter;
mod traits;

pub use format::{HumanFormatter, JsonFormatter, MetricsFormatter};
pub use reporter::{StreamReporter, spawn_stream_reporters};
pub use traits::{StreamMetrics, StreamMetricsConfig, StreamMetricsProvider, StreamMetricsSnapshot};
