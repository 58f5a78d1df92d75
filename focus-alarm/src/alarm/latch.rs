use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::AlarmConfig;

/// Edge reported by [`Latch::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    On,
    Off,
}

impl Transition {
    pub fn alarm_on(self) -> bool {
        matches!(self, Transition::On)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::On => write!(f, "ON"),
            Transition::Off => write!(f, "OFF"),
        }
    }
}

/// Two-state hysteresis latch with an optional dwell gate.
///
/// ```text
///            estimate > threshold
///  OFF ──────────────────────────────► ON
///   ▲     (and dwell elapsed, if gated)  │
///   │                                    │
///   └────────────────────────────────────┘
///     estimate < threshold - margin
///     (and dwell elapsed, if gated)
/// ```
///
/// Estimates inside `[threshold - margin, threshold]` never switch the
/// latch. When gated, the dwell clock starts at construction, so the
/// very first switch also waits for `min_dwell_time`.
#[derive(Debug, Clone)]
pub(crate) struct Latch {
    threshold: f64,
    release_threshold: f64,
    min_dwell: Option<Duration>,
    alarm_on: bool,
    last_switch: Instant,
}

impl Latch {
    /// Latch that may switch on any call.
    pub fn ungated(config: &AlarmConfig, now: Instant) -> Self {
        Self::new(config, None, now)
    }

    /// Latch that holds each state for at least `config.min_dwell_time`.
    pub fn gated(config: &AlarmConfig, now: Instant) -> Self {
        Self::new(config, Some(config.min_dwell_time), now)
    }

    fn new(config: &AlarmConfig, min_dwell: Option<Duration>, now: Instant) -> Self {
        Self {
            threshold: config.threshold,
            release_threshold: config.release_threshold(),
            min_dwell,
            alarm_on: false,
            last_switch: now,
        }
    }

    /// Feed the current estimate; returns the edge if the latch switched.
    pub fn evaluate(&mut self, estimate: f64, now: Instant) -> Option<Transition> {
        let wants = if !self.alarm_on && estimate > self.threshold {
            Transition::On
        } else if self.alarm_on && estimate < self.release_threshold {
            Transition::Off
        } else {
            return None;
        };

        if let Some(min_dwell) = self.min_dwell {
            if self.time_since_switch(now) < min_dwell {
                return None;
            }
        }

        self.alarm_on = wants.alarm_on();
        self.last_switch = now;
        Some(wants)
    }

    pub fn is_on(&self) -> bool {
        self.alarm_on
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn release_threshold(&self) -> f64 {
        self.release_threshold
    }

    /// Time since construction or the last accepted switch.
    pub fn time_since_switch(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_switch)
    }
}
