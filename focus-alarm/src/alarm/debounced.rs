use std::sync::Arc;

use tokio::time::Instant;

use super::latch::Latch;
use super::{AlarmPolicy, AlarmStatus, PolicyKind, window_status};
use crate::buffer::SampleBuffer;
use crate::config::AlarmConfig;
use crate::error::Result;
use crate::tracing::prelude::*;

/// Window average with hysteresis and a minimum dwell time.
///
/// A switch in either direction is accepted only once
/// `min_dwell_time` has passed since the previous switch (or since
/// construction, for the first one). Attempts blocked by the gate are
/// simply dropped; the state persists until a later call finds the
/// estimate still past its threshold and the gate open.
#[derive(Debug)]
pub struct DebouncedAlarm {
    buffer: Arc<SampleBuffer>,
    latch: Latch,
}

impl DebouncedAlarm {
    pub fn new(config: AlarmConfig) -> Result<Self> {
        config.ensure_window()?;
        Ok(Self {
            buffer: Arc::new(SampleBuffer::new(config.window_size)?),
            latch: Latch::gated(&config, Instant::now()),
        })
    }

    /// Shared handle to the window, for telemetry readers.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    fn decide(&mut self, now: Instant) -> bool {
        let average = self.buffer.average();
        let dwell = self.latch.time_since_switch(now);

        if let Some(transition) = self.latch.evaluate(average, now) {
            info!(
                policy = %PolicyKind::Debounced,
                distraction = average,
                dwell_s = dwell.as_secs_f64(),
                "Alarm {transition}"
            );
        }

        self.latch.is_on()
    }
}

impl AlarmPolicy for DebouncedAlarm {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Debounced
    }

    fn update_at(&mut self, sample: f64, now: Instant) -> bool {
        self.buffer.append(sample);
        self.decide(now)
    }

    fn evaluate_at(&mut self, now: Instant) -> bool {
        if self.buffer.is_empty() {
            return self.latch.is_on();
        }
        self.decide(now)
    }

    fn status_at(&self, now: Instant) -> AlarmStatus {
        let (window_average, window_focus, window_occupancy) = window_status(&self.buffer);
        AlarmStatus {
            policy: PolicyKind::Debounced,
            alarm_on: self.latch.is_on(),
            estimate: window_average.unwrap_or_default(),
            ema_score: None,
            window_average,
            window_focus,
            window_occupancy,
            time_since_switch: self.latch.time_since_switch(now),
            threshold: self.latch.threshold(),
            release_threshold: self.latch.release_threshold(),
        }
    }

    fn is_on(&self) -> bool {
        self.latch.is_on()
    }
}
