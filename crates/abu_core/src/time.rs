//! Interval-gated tick clock.
//!
//! The host calls [`TickClock::poll`] once per frame callback with the current
//! wall-clock time in milliseconds. A logical tick is due when more than one
//! interval has passed since the last tick; the clock is then rebased to the
//! most recent interval boundary (`now - delta % interval`) rather than to
//! `now`, so a slow frame does not push every later tick forward.

use crate::config::{validate_tick_rate, ConfigError};

const RATE_SAMPLE_COUNT: usize = 60;

#[derive(Debug, Clone)]
pub struct TickClock {
    interval_ms: f64,
    last_tick_ms: Option<f64>,
    last_frame_ms: Option<f64>,
    pub last_delta_ms: f64,
    pub tick_count: u64,
    pub frame_count: u64,

    rate_samples: [f64; RATE_SAMPLE_COUNT],
    rate_sample_index: usize,
    rate_sample_len: usize,
    /// Frame callbacks per second, averaged over the last samples.
    pub smoothed_frame_rate: f64,
}

impl TickClock {
    pub fn new(tick_rate: f64) -> Result<Self, ConfigError> {
        validate_tick_rate(tick_rate)?;
        Ok(Self {
            interval_ms: 1000.0 / tick_rate,
            last_tick_ms: None,
            last_frame_ms: None,
            last_delta_ms: 0.0,
            tick_count: 0,
            frame_count: 0,
            rate_samples: [0.0; RATE_SAMPLE_COUNT],
            rate_sample_index: 0,
            rate_sample_len: 0,
            smoothed_frame_rate: 0.0,
        })
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn last_tick_ms(&self) -> Option<f64> {
        self.last_tick_ms
    }

    /// Start counting from `now_ms`; the first tick is due one interval later.
    pub fn reset(&mut self, now_ms: f64) {
        self.last_tick_ms = Some(now_ms);
        self.last_delta_ms = 0.0;
    }

    /// Record one frame callback at `now_ms` and report whether a logical tick
    /// is due. When it is, the clock has already been rebased.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        self.frame_count += 1;
        self.sample_frame_rate(now_ms);

        let Some(last_tick) = self.last_tick_ms else {
            self.reset(now_ms);
            return false;
        };

        let delta = now_ms - last_tick;
        self.last_delta_ms = delta;
        if delta < 0.0 {
            log::warn!(
                "Clock went backwards by {:.1}ms; restarting tick interval",
                -delta
            );
            self.reset(now_ms);
            return false;
        }
        if delta <= self.interval_ms {
            return false;
        }

        self.last_tick_ms = Some(now_ms - delta % self.interval_ms);
        self.tick_count += 1;
        true
    }

    fn sample_frame_rate(&mut self, now_ms: f64) {
        let previous = self.last_frame_ms.replace(now_ms);
        let Some(previous) = previous else {
            return;
        };
        let frame_ms = now_ms - previous;
        if frame_ms <= 0.0 {
            return;
        }

        self.rate_samples[self.rate_sample_index] = frame_ms;
        self.rate_sample_index = (self.rate_sample_index + 1) % RATE_SAMPLE_COUNT;
        self.rate_sample_len = (self.rate_sample_len + 1).min(RATE_SAMPLE_COUNT);
        let avg_ms: f64 =
            self.rate_samples[..self.rate_sample_len].iter().sum::<f64>() / self.rate_sample_len as f64;
        self.smoothed_frame_rate = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
    }
}
