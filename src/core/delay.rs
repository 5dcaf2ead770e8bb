//! Adaptive export cadence
//!
//! The delay between export attempts shrinks while exports succeed and grows
//! while they fail or find nothing to do, always staying within
//! `[min_export_delay, max_export_delay]` so the worker neither busy-spins nor
//! sleeps indefinitely.

use crate::preset::ExportPerformancePreset;
use std::time::Duration;

/// Controller for the pause between export cycles
pub trait Delay: Send {
    /// Pause before the next cycle
    fn current(&self) -> Duration;

    /// Back off after a failure or an idle cycle
    fn increase(&mut self);

    /// Speed up after a successful export
    fn decrease(&mut self);

    /// Return to the steady-state cadence
    fn reset(&mut self);
}

/// Bounded multiplicative [`Delay`]
#[derive(Debug, Clone)]
pub struct DataExportDelay {
    current: Duration,
    default: Duration,
    min: Duration,
    max: Duration,
    change_rate: f64,
}

impl DataExportDelay {
    /// Start at `initial_export_delay`, clamped into the configured bounds
    pub fn new(performance: &ExportPerformancePreset) -> Self {
        let min = performance.min_export_delay;
        let max = performance.max_export_delay.max(min);
        let rate = performance.export_delay_change_rate;
        DataExportDelay {
            current: performance.initial_export_delay.clamp(min, max),
            default: performance.default_export_delay.clamp(min, max),
            min,
            max,
            change_rate: if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) },
        }
    }
}

impl Delay for DataExportDelay {
    fn current(&self) -> Duration {
        self.current
    }

    fn increase(&mut self) {
        // Saturates at `max` instead of overflowing near Duration::MAX
        self.current = Duration::try_from_secs_f64(
            self.current.as_secs_f64() * (1.0 + self.change_rate),
        )
        .map_or(self.max, |next| next.min(self.max));
    }

    fn decrease(&mut self) {
        self.current = self
            .current
            .mul_f64(1.0 - self.change_rate)
            .max(self.min);
    }

    fn reset(&mut self) {
        self.current = self.default;
    }
}
