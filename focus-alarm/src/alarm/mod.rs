//! Alarm policies over the distraction estimate.
//!
//! Every policy turns one attention sample per call into a stable
//! boolean alarm. They differ in how the estimate is smoothed and
//! whether a switch must wait out a dwell time:
//!
//! | Policy | Estimate | Hysteresis | Dwell gate | Callback |
//! |--------|----------|------------|------------|----------|
//! | [`SlidingWindowAlarm`] | window average | yes | no | no |
//! | [`DebouncedAlarm`] | window average | yes | yes | no |
//! | [`EmaAlarm`] | EMA | yes | no | no |
//! | [`SmartAlarm`] | EMA | yes | yes | yes |
//!
//! Policies take `&mut self` for every decision, so a single decision
//! loop owns each instance. Only the [`SampleBuffer`] inside a policy is
//! shared, and only for read-side telemetry.

mod debounced;
mod ema;
mod latch;
mod sliding_window;
mod smart;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::buffer::SampleBuffer;
use crate::config::AlarmConfig;
use crate::error::Result;

pub use debounced::DebouncedAlarm;
pub use ema::EmaAlarm;
pub use latch::Transition;
pub use sliding_window::SlidingWindowAlarm;
pub use smart::SmartAlarm;

/// Notification invoked synchronously when a policy switches state.
///
/// Receives the new alarm state. Must not block; a panic is caught and
/// logged by the policy and does not undo the switch.
pub type TransitionCallback = Box<dyn FnMut(bool) + Send>;

/// Selects one of the alarm policies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PolicyKind {
    SlidingWindow,
    Debounced,
    Ema,
    #[default]
    Smart,
}

/// Diagnostic snapshot of a policy.
///
/// Produced by [`AlarmPolicy::status`] without touching decision state;
/// intended for telemetry export, not for driving decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmStatus {
    pub policy: PolicyKind,
    pub alarm_on: bool,

    /// Distraction estimate the policy decides on.
    pub estimate: f64,

    /// EMA score, for EMA-based policies.
    pub ema_score: Option<f64>,

    /// Mean distraction over the sliding window, if the policy keeps one.
    pub window_average: Option<f64>,

    /// `1 - window_average`: the share of focused samples in the window.
    pub window_focus: Option<f64>,

    pub window_occupancy: usize,

    #[serde(rename = "time_since_switch_secs", with = "crate::config::duration_secs")]
    pub time_since_switch: Duration,

    pub threshold: f64,
    pub release_threshold: f64,
}

/// The capability shared by all alarm policies.
pub trait AlarmPolicy: Send {
    fn kind(&self) -> PolicyKind;

    /// Record `sample` (0.0 focused, 1.0 distracted) observed at `now`
    /// and return the alarm state afterwards.
    fn update_at(&mut self, sample: f64, now: Instant) -> bool;

    /// Re-run the decision on the current estimate without a new
    /// sample. Lets a dwell gate that expired between samples take
    /// effect. A policy that has seen no samples stays off.
    fn evaluate_at(&mut self, now: Instant) -> bool;

    fn status_at(&self, now: Instant) -> AlarmStatus;

    fn is_on(&self) -> bool;

    /// [`update_at`](Self::update_at) with the current time.
    fn update(&mut self, sample: f64) -> bool {
        self.update_at(sample, Instant::now())
    }

    fn evaluate(&mut self) -> bool {
        self.evaluate_at(Instant::now())
    }

    fn status(&self) -> AlarmStatus {
        self.status_at(Instant::now())
    }
}

/// Build the policy selected by `kind`.
///
/// `callback` is attached to policies that support transition
/// notifications ([`SmartAlarm`]) and dropped otherwise.
pub fn build_policy(
    kind: PolicyKind,
    config: AlarmConfig,
    callback: Option<TransitionCallback>,
) -> Result<Box<dyn AlarmPolicy>> {
    let policy: Box<dyn AlarmPolicy> = match kind {
        PolicyKind::SlidingWindow => Box::new(SlidingWindowAlarm::new(config)?),
        PolicyKind::Debounced => Box::new(DebouncedAlarm::new(config)?),
        PolicyKind::Ema => Box::new(EmaAlarm::new(config)?),
        PolicyKind::Smart => {
            let mut alarm = SmartAlarm::new(config)?;
            if let Some(callback) = callback {
                alarm = alarm.with_callback(callback);
            }
            Box::new(alarm)
        }
    };
    Ok(policy)
}

fn window_status(buffer: &Arc<SampleBuffer>) -> (Option<f64>, Option<f64>, usize) {
    // One snapshot so average and occupancy agree.
    let samples = buffer.snapshot();
    if samples.is_empty() {
        return (Some(0.0), Some(1.0), 0);
    }
    let average = samples.iter().sum::<f64>() / samples.len() as f64;
    (Some(average), Some(1.0 - average), samples.len())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;
    use test_case::test_case;

    use super::*;

    #[test_case("sliding-window", PolicyKind::SlidingWindow)]
    #[test_case("debounced", PolicyKind::Debounced)]
    #[test_case("ema", PolicyKind::Ema)]
    #[test_case("smart", PolicyKind::Smart)]
    fn should_parse_policy_names(name: &str, kind: PolicyKind) {
        assert_eq!(PolicyKind::from_str(name).unwrap(), kind);
        assert_eq!(kind.to_string(), name);
    }

    #[test]
    fn should_reject_unknown_policy_name() {
        assert!(PolicyKind::from_str("majority-vote").is_err());
    }

    #[test]
    fn should_build_every_policy_kind() {
        for kind in PolicyKind::iter() {
            let policy = build_policy(kind, AlarmConfig::default(), None).unwrap();
            assert_eq!(policy.kind(), kind);
            assert!(!policy.is_on());
        }
    }

    #[test]
    fn should_fail_to_build_with_zero_window() {
        let config = AlarmConfig {
            window_size: 0,
            ..AlarmConfig::default()
        };
        for kind in PolicyKind::iter() {
            assert!(build_policy(kind, config.clone(), None).is_err());
        }
    }

    #[test]
    fn should_serialize_status_for_telemetry() {
        let policy = build_policy(PolicyKind::SlidingWindow, AlarmConfig::default(), None).unwrap();
        let json = serde_json::to_value(policy.status()).unwrap();

        assert_eq!(json["policy"], "sliding-window");
        assert_eq!(json["alarm_on"], false);
        assert_eq!(json["window_occupancy"], 0);
        assert!(json["time_since_switch_secs"].is_number());
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_status_idempotent_between_updates() {
        for kind in PolicyKind::iter() {
            let config = AlarmConfig {
                min_dwell_time: Duration::ZERO,
                ..AlarmConfig::default()
            };
            let mut policy = build_policy(kind, config, None).unwrap();
            policy.update(1.0);

            let first = policy.status();
            let second = policy.status();
            let third = policy.status();

            assert_eq!(first, second, "{kind}");
            assert_eq!(second, third, "{kind}");
            assert_eq!(policy.is_on(), first.alarm_on, "{kind}");
        }
    }
}
