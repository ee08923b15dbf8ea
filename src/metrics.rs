//! Generation metrics
//!
//! Emits through the `metrics` facade; nothing is recorded unless a
//! recorder is installed (see `init_metrics_exporter` behind the
//! `prometheus` feature).
//!
//! # Metrics
//!
//! - `generation_requests_total`: Counter of requests by mode (`stream`, `once`)
//! - `generation_outcomes_total`: Counter of finished requests by mode and final state
//! - `generation_tokens_streamed`: Histogram of token frames delivered per request
//! - `generation_duration_seconds`: Histogram of wall time per request
//!
//! # Examples
//!
//! ```
//! use aidroid::metrics::GenerationMetrics;
//!
//! let metrics = GenerationMetrics::new("stream");
//! metrics.record_outcome("completed", 12);
//! ```

use metrics::{histogram, increment_counter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics for one generation request
///
/// The request counter is bumped on construction. The outcome is recorded
/// at most once; later calls are ignored, and a tracker dropped without an
/// outcome records `abandoned`.
#[derive(Debug)]
pub struct GenerationMetrics {
    mode: &'static str,
    start: Instant,
    recorded: AtomicBool,
}

impl GenerationMetrics {
    pub fn new(mode: &'static str) -> Self {
        increment_counter!("generation_requests_total", "mode" => mode);

        Self {
            mode,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> &'static str {
        self.mode
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Record the final state and the number of streamed token frames
    pub fn record_outcome(&self, state: &str, tokens: usize) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "generation_duration_seconds",
            self.elapsed_seconds(),
            "mode" => self.mode,
            "state" => state.to_string()
        );
        histogram!("generation_tokens_streamed", tokens as f64, "mode" => self.mode);
        increment_counter!(
            "generation_outcomes_total",
            "mode" => self.mode,
            "state" => state.to_string()
        );
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl Drop for GenerationMetrics {
    fn drop(&mut self) {
        if !self.is_recorded() {
            self.record_outcome("abandoned", 0);
        }
    }
}

/// Install the Prometheus exporter as the global recorder
///
/// # Errors
///
/// Returns error if a recorder is already installed or the listener
/// cannot bind
#[cfg(feature = "prometheus")]
pub fn init_metrics_exporter() -> crate::error::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    tracing::info!("Prometheus metrics exporter installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_recorded_once() {
        let metrics = GenerationMetrics::new("once");
        assert!(!metrics.is_recorded());
        metrics.record_outcome("completed", 0);
        assert!(metrics.is_recorded());
        metrics.record_outcome("failed", 0);
        assert!(metrics.is_recorded());
    }

    #[test]
    fn test_mode_is_kept() {
        let metrics = GenerationMetrics::new("stream");
        assert_eq!(metrics.mode(), "stream");
        assert!(metrics.elapsed_seconds() >= 0.0);
    }

    #[test]
    fn test_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GenerationMetrics>();
    }
}
