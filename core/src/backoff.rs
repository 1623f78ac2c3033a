//! Capped exponential sleep schedule used by the poll loop.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Produces successive sleep intervals: `base`, `base * growth`, ... up to the
/// configured ceiling, each optionally shortened by a random jitter fraction.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    current_micros: f64,
}

impl Backoff {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        let current_micros = config.base_micros as f64;
        Self {
            config,
            current_micros,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let ceiling = self.config.ceiling_micros as f64;
        let delay = self.current_micros.min(ceiling);
        self.current_micros = (self.current_micros * self.config.growth).min(ceiling);

        let delay = if self.config.jitter > 0.0 {
            delay * (1.0 - self.config.jitter * fastrand::f64())
        } else {
            delay
        };
        Duration::from_nanos((delay * 1_000.0).round() as u64)
    }

    pub(crate) fn sleep(&mut self) {
        std::thread::sleep(self.next_delay());
    }

    pub(crate) fn reset(&mut self) {
        self.current_micros = self.config.base_micros as f64;
    }
}
