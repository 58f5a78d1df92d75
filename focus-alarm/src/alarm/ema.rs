use tokio::time::Instant;

use super::latch::Latch;
use super::{AlarmPolicy, AlarmStatus, PolicyKind};
use crate::config::AlarmConfig;
use crate::error::Result;
use crate::smoothing::Ema;
use crate::tracing::prelude::*;

/// Exponential moving average with hysteresis and no dwell gate.
///
/// Keeps no window: memory is the single EMA scalar, so
/// `window_size` only has to be valid, not meaningful.
#[derive(Debug)]
pub struct EmaAlarm {
    ema: Ema,
    latch: Latch,
}

impl EmaAlarm {
    pub fn new(config: AlarmConfig) -> Result<Self> {
        config.ensure_window()?;
        Ok(Self {
            ema: Ema::new(config.ema_alpha),
            latch: Latch::ungated(&config, Instant::now()),
        })
    }

    pub fn ema_score(&self) -> f64 {
        self.ema.value()
    }

    fn decide(&mut self, score: f64, now: Instant) -> bool {
        if let Some(transition) = self.latch.evaluate(score, now) {
            info!(
                policy = %PolicyKind::Ema,
                score,
                threshold = self.latch.threshold(),
                release_threshold = self.latch.release_threshold(),
                "Alarm {transition}"
            );
        }

        self.latch.is_on()
    }
}

impl AlarmPolicy for EmaAlarm {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Ema
    }

    fn update_at(&mut self, sample: f64, now: Instant) -> bool {
        let score = self.ema.update(sample);
        self.decide(score, now)
    }

    fn evaluate_at(&mut self, now: Instant) -> bool {
        // The neutral seed is not an observation.
        if !self.ema.is_initialized() {
            return self.latch.is_on();
        }
        self.decide(self.ema.value(), now)
    }

    fn status_at(&self, now: Instant) -> AlarmStatus {
        AlarmStatus {
            policy: PolicyKind::Ema,
            alarm_on: self.latch.is_on(),
            estimate: self.ema.value(),
            ema_score: Some(self.ema.value()),
            window_average: None,
            window_focus: None,
            window_occupancy: 0,
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
    use crate::smoothing::NEUTRAL_SCORE;

    fn config(alpha: f64) -> AlarmConfig {
        AlarmConfig {
            window_size: 5,
            threshold: 0.4,
            min_dwell_time: Duration::from_secs(60),
            ema_alpha: alpha,
            hysteresis_margin: 0.1,
        }
    }

    #[test]
    fn should_trigger_on_first_distracted_sample() {
        let mut alarm = EmaAlarm::new(config(0.1)).unwrap();

        // First sample seeds the EMA directly, so no warm-up from 0.5.
        assert!(alarm.update(1.0));
        assert_eq!(alarm.ema_score(), 1.0);
    }

    #[test]
    fn should_ignore_dwell_time() {
        let mut alarm = EmaAlarm::new(config(1.0)).unwrap();

        assert!(alarm.update(1.0));
        assert!(!alarm.update(0.0));
        assert!(alarm.update(1.0));
    }

    #[test]
    fn should_release_after_score_decays_below_release_threshold() {
        let mut alarm = EmaAlarm::new(config(0.5)).unwrap();
        alarm.update(1.0);

        // 0.5, 0.25: the first stays inside the band
        assert!(alarm.update(0.0));
        assert!(!alarm.update(0.0));
        assert!((alarm.ema_score() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn should_smooth_single_glitch() {
        let mut alarm = EmaAlarm::new(config(0.1)).unwrap();
        for _ in 0..10 {
            alarm.update(0.0);
        }

        // One distracted sample only lifts the score to 0.1.
        assert!(!alarm.update(1.0));
        assert!(!alarm.update(0.0));
    }

    #[test]
    fn should_not_decide_on_neutral_seed() {
        let mut alarm = EmaAlarm::new(config(0.1)).unwrap();

        assert!(!alarm.evaluate());
        assert_eq!(alarm.status().estimate, NEUTRAL_SCORE);
    }

    #[test]
    fn should_report_no_window() {
        let mut alarm = EmaAlarm::new(config(0.1)).unwrap();
        alarm.update(0.0);

        let status = alarm.status();

        assert_eq!(status.window_occupancy, 0);
        assert_eq!(status.window_average, None);
        assert_eq!(status.ema_score, Some(0.0));
    }
}
