use std::sync::Arc;

use tokio::time::Instant;

use super::latch::Latch;
use super::{AlarmPolicy, AlarmStatus, PolicyKind, window_status};
use crate::buffer::SampleBuffer;
use crate::config::AlarmConfig;
use crate::error::Result;
use crate::tracing::prelude::*;

/// Window average with hysteresis and no dwell gate.
///
/// Reacts as fast as the window allows: the alarm can flip on
/// consecutive calls if the average crosses both thresholds.
#[derive(Debug)]
pub struct SlidingWindowAlarm {
    buffer: Arc<SampleBuffer>,
    latch: Latch,
}

impl SlidingWindowAlarm {
    pub fn new(config: AlarmConfig) -> Result<Self> {
        config.ensure_window()?;
        Ok(Self {
            buffer: Arc::new(SampleBuffer::new(config.window_size)?),
            latch: Latch::ungated(&config, Instant::now()),
        })
    }

    /// Shared handle to the window, for telemetry readers.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    /// Share of focused samples in the window (`1 - average`).
    pub fn focus_level(&self) -> f64 {
        1.0 - self.buffer.average()
    }

    fn decide(&mut self, now: Instant) -> bool {
        let average = self.buffer.average();

        if let Some(transition) = self.latch.evaluate(average, now) {
            info!(
                policy = %PolicyKind::SlidingWindow,
                distraction = average,
                threshold = self.latch.threshold(),
                release_threshold = self.latch.release_threshold(),
                "Alarm {transition}"
            );
        }

        self.latch.is_on()
    }
}

impl AlarmPolicy for SlidingWindowAlarm {
    fn kind(&self) -> PolicyKind {
        PolicyKind::SlidingWindow
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
            policy: PolicyKind::SlidingWindow,
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scenario_config() -> AlarmConfig {
        AlarmConfig {
            window_size: 5,
            threshold: 0.4,
            min_dwell_time: Duration::ZERO,
            ema_alpha: 1.0,
            hysteresis_margin: 0.1,
        }
    }

    fn feed(alarm: &mut SlidingWindowAlarm, samples: &[f64]) -> Vec<bool> {
        samples.iter().map(|&s| alarm.update(s)).collect()
    }

    #[test]
    fn should_follow_window_scenario() {
        let mut alarm = SlidingWindowAlarm::new(scenario_config()).unwrap();

        assert!(feed(&mut alarm, &[0.0; 5]).iter().all(|&on| !on));
        assert_eq!(alarm.status().estimate, 0.0);

        feed(&mut alarm, &[1.0; 5]);
        assert!(alarm.is_on());
        assert_eq!(alarm.status().estimate, 1.0);

        feed(&mut alarm, &[0.0; 5]);
        assert!(!alarm.is_on());
        assert_eq!(alarm.status().estimate, 0.0);
    }

    #[test]
    fn should_turn_on_once_average_exceeds_threshold() {
        let mut alarm = SlidingWindowAlarm::new(scenario_config()).unwrap();
        feed(&mut alarm, &[0.0; 5]);

        // Averages: 0.2, 0.4 (at threshold, holds), 0.6
        assert!(!alarm.update(1.0));
        assert!(!alarm.update(1.0));
        assert!(alarm.update(1.0));
    }

    #[test]
    fn should_hold_inside_hysteresis_band() {
        let mut alarm = SlidingWindowAlarm::new(scenario_config()).unwrap();
        feed(&mut alarm, &[1.0; 5]);
        assert!(alarm.is_on());

        // Window drains to [1,1,0,0,0]: average 0.4
        feed(&mut alarm, &[0.0, 0.0, 0.0]);
        assert!(alarm.is_on(), "average 0.4 is inside the band");

        // [1,0,0,0,0] averages 0.2 < 0.3
        assert!(!alarm.update(0.0));
    }

    #[test]
    fn should_flip_without_dwell_gate() {
        let config = AlarmConfig {
            window_size: 1,
            ..scenario_config()
        };
        let mut alarm = SlidingWindowAlarm::new(config).unwrap();

        assert_eq!(feed(&mut alarm, &[1.0, 0.0, 1.0, 0.0]), [true, false, true, false]);
    }

    #[test]
    fn should_report_window_diagnostics() {
        let mut alarm = SlidingWindowAlarm::new(scenario_config()).unwrap();
        feed(&mut alarm, &[1.0, 0.0, 0.0, 0.0]);

        let status = alarm.status();

        assert_eq!(status.window_occupancy, 4);
        assert_eq!(status.window_average, Some(0.25));
        assert_eq!(status.window_focus, Some(0.75));
        assert_eq!(status.ema_score, None);
        assert!((alarm.focus_level() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn should_stay_off_when_evaluated_before_any_sample() {
        let mut alarm = SlidingWindowAlarm::new(scenario_config()).unwrap();

        assert!(!alarm.evaluate());
        assert_eq!(alarm.buffer().len(), 0);
    }
}
