use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::time::Instant;

use super::latch::{Latch, Transition};
use super::{AlarmPolicy, AlarmStatus, PolicyKind, TransitionCallback, window_status};
use crate::buffer::SampleBuffer;
use crate::config::AlarmConfig;
use crate::error::Result;
use crate::smoothing::Ema;
use crate::tracing::prelude::*;

/// Hybrid policy: EMA smoothing, hysteresis and a dwell gate.
///
/// This is the policy for live sessions. The EMA drives decisions; the
/// sliding window is kept only so telemetry can show the raw recent
/// mix of samples. An optional callback is told about every switch
/// before [`update`](AlarmPolicy::update) returns.
pub struct SmartAlarm {
    buffer: Arc<SampleBuffer>,
    ema: Ema,
    latch: Latch,
    callback: Option<TransitionCallback>,
}

impl SmartAlarm {
    pub fn new(config: AlarmConfig) -> Result<Self> {
        config.ensure_window()?;
        Ok(Self {
            buffer: Arc::new(SampleBuffer::new(config.window_size)?),
            ema: Ema::new(config.ema_alpha),
            latch: Latch::gated(&config, Instant::now()),
            callback: None,
        })
    }

    /// Attach a transition callback, replacing any previous one.
    pub fn with_callback(mut self, callback: TransitionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Shared handle to the diagnostic window.
    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn ema_score(&self) -> f64 {
        self.ema.value()
    }

    fn decide(&mut self, score: f64, now: Instant) -> bool {
        let dwell = self.latch.time_since_switch(now);

        if let Some(transition) = self.latch.evaluate(score, now) {
            info!(
                policy = %PolicyKind::Smart,
                score,
                dwell_s = dwell.as_secs_f64(),
                "Alarm {transition}"
            );
            self.notify(transition);
        }

        self.latch.is_on()
    }

    /// Runs the callback after the switch is committed. A panicking
    /// callback is logged and otherwise ignored.
    fn notify(&mut self, transition: Transition) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let alarm_on = transition.alarm_on();
        if panic::catch_unwind(AssertUnwindSafe(|| callback(alarm_on))).is_err() {
            error!(
                policy = %PolicyKind::Smart,
                alarm_on,
                "Transition callback panicked"
            );
        }
    }
}

impl std::fmt::Debug for SmartAlarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartAlarm")
            .field("buffer", &self.buffer)
            .field("ema", &self.ema)
            .field("latch", &self.latch)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl AlarmPolicy for SmartAlarm {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Smart
    }

    fn update_at(&mut self, sample: f64, now: Instant) -> bool {
        self.buffer.append(sample);
        let score = self.ema.update(sample);
        self.decide(score, now)
    }

    fn evaluate_at(&mut self, now: Instant) -> bool {
        if !self.ema.is_initialized() {
            return self.latch.is_on();
        }
        self.decide(self.ema.value(), now)
    }

    fn status_at(&self, now: Instant) -> AlarmStatus {
        let (window_average, window_focus, window_occupancy) = window_status(&self.buffer);
        AlarmStatus {
            policy: PolicyKind::Smart,
            alarm_on: self.latch.is_on(),
            estimate: self.ema.value(),
            ema_score: Some(self.ema.value()),
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
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::time;

    use super::*;

    fn config() -> AlarmConfig {
        AlarmConfig {
            window_size: 10,
            threshold: 0.4,
            min_dwell_time: Duration::from_secs(3),
            ema_alpha: 0.5,
            hysteresis_margin: 0.1,
        }
    }

    fn recording_alarm() -> (SmartAlarm, Arc<Mutex<Vec<bool>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let alarm = SmartAlarm::new(config())
            .unwrap()
            .with_callback(Box::new(move |on: bool| sink.lock().unwrap().push(on)));
        (alarm, calls)
    }

    /// Feed `count` samples one second apart, returning the alarm states.
    async fn feed(alarm: &mut SmartAlarm, sample: f64, count: usize) -> Vec<bool> {
        let mut states = Vec::with_capacity(count);
        for _ in 0..count {
            time::advance(Duration::from_secs(1)).await;
            states.push(alarm.update(sample));
        }
        states
    }

    #[tokio::test(start_paused = true)]
    async fn callback_fires_once_per_switch_over_two_cycles() {
        let (mut alarm, calls) = recording_alarm();
        let mut switches = Vec::new();
        let mut previous = false;

        for (sample, count) in [(0.0, 5), (1.0, 6), (0.0, 6), (1.0, 6), (0.0, 6)] {
            for on in feed(&mut alarm, sample, count).await {
                if on != previous {
                    switches.push(on);
                    previous = on;
                }
            }
        }

        // Two ON/OFF cycles, and the callback saw the same edges.
        assert_eq!(switches, vec![true, false, true, false]);
        let calls = calls.lock().unwrap();
        assert_eq!(*calls, switches);
        assert_eq!(calls.iter().filter(|&&on| on).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_value_matches_update_result() {
        let (mut alarm, calls) = recording_alarm();
        time::advance(Duration::from_secs(3)).await;

        let on = alarm.update(1.0);

        assert!(on);
        assert_eq!(*calls.lock().unwrap(), vec![on]);
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_gate_blocks_early_switch() {
        let (mut alarm, calls) = recording_alarm();

        let states = feed(&mut alarm, 1.0, 2).await;

        assert_eq!(states, vec![false, false]);
        assert!(calls.lock().unwrap().is_empty());

        assert!(feed(&mut alarm, 1.0, 1).await[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_undo_switch() {
        let mut alarm = SmartAlarm::new(config())
            .unwrap()
            .with_callback(Box::new(|_: bool| panic!("speaker unplugged")));
        time::advance(Duration::from_secs(3)).await;

        assert!(alarm.update(1.0));
        assert!(alarm.is_on());

        // Still usable afterwards: 0.5 keeps it on, 0.25 clears.
        time::advance(Duration::from_secs(3)).await;
        assert!(alarm.update(0.0));
        assert!(!alarm.update(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_diagnostic_only() {
        let (mut alarm, _calls) = recording_alarm();
        time::advance(Duration::from_secs(3)).await;

        alarm.update(0.0);
        alarm.update(0.0);
        alarm.update(1.0);

        let status = alarm.status();
        assert_eq!(status.window_occupancy, 3);
        assert!((status.window_average.unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(status.estimate, 0.5);
        assert_eq!(status.ema_score, Some(0.5));
        assert!(status.alarm_on);
    }

    #[tokio::test(start_paused = true)]
    async fn works_without_callback() {
        let mut alarm = SmartAlarm::new(config()).unwrap();
        time::advance(Duration::from_secs(3)).await;

        assert!(alarm.update(1.0));
    }
}
